//! Target allow-list.
//!
//! Runs between target resolution and the upstream fetch. Off by default:
//! without it any host reachable from the relay, internal addresses
//! included, can be fetched.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use url::{Host, Url};

use crate::config::SecurityConfig;

/// Why a target was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("scheme `{0}` is not allowed")]
    Scheme(String),
    #[error("host `{0}` is not allowed")]
    Host(String),
    #[error("address `{0}` is private")]
    PrivateAddress(IpAddr),
}

/// Compiled form of [`SecurityConfig`].
#[derive(Debug, Clone, Default)]
pub struct TargetPolicy {
    enabled: bool,
    schemes: Vec<String>,
    exact_hosts: Vec<String>,
    suffix_hosts: Vec<String>,
    deny_private: bool,
}

impl TargetPolicy {
    pub fn from_config(config: &SecurityConfig) -> Self {
        let mut exact_hosts = Vec::new();
        let mut suffix_hosts = Vec::new();
        for host in &config.allowed_hosts {
            let host = host.trim().to_ascii_lowercase();
            match host.strip_prefix("*.") {
                Some(domain) => suffix_hosts.push(format!(".{domain}")),
                None => exact_hosts.push(host),
            }
        }

        Self {
            enabled: config.enabled,
            schemes: config
                .allowed_schemes
                .iter()
                .map(|s| s.to_ascii_lowercase())
                .collect(),
            exact_hosts,
            suffix_hosts,
            deny_private: config.deny_private_addresses,
        }
    }

    pub fn check(&self, url: &Url) -> Result<(), Denial> {
        if !self.enabled {
            return Ok(());
        }

        if !self.schemes.iter().any(|s| s == url.scheme()) {
            return Err(Denial::Scheme(url.scheme().to_owned()));
        }

        let host = url.host_str().unwrap_or_default();

        if self.deny_private {
            let ip = match url.host() {
                Some(Host::Ipv4(v4)) => Some(IpAddr::V4(v4)),
                Some(Host::Ipv6(v6)) => Some(IpAddr::V6(v6)),
                _ => None,
            };
            if let Some(ip) = ip.filter(is_private) {
                return Err(Denial::PrivateAddress(ip));
            }
            if host.eq_ignore_ascii_case("localhost") || host.ends_with(".localhost") {
                return Err(Denial::Host(host.to_owned()));
            }
        }

        if self.exact_hosts.is_empty() && self.suffix_hosts.is_empty() {
            return Ok(());
        }
        let allowed = self.exact_hosts.iter().any(|h| h == host)
            || self.suffix_hosts.iter().any(|suffix| host.ends_with(suffix.as_str()));
        if allowed {
            Ok(())
        } else {
            Err(Denial::Host(host.to_owned()))
        }
    }
}

fn is_private(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(&v4),
            None => is_private_v6(v6),
        },
    }
}

fn is_private_v4(ip: &Ipv4Addr) -> bool {
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // carrier-grade NAT, 100.64.0.0/10
        || (ip.octets()[0] == 100 && (ip.octets()[1] & 0xc0) == 64)
}

fn is_private_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00 // unique local
        || (first & 0xffc0) == 0xfe80 // link local
}
