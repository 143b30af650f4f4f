//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::Deserialize;

/// Root configuration for the relay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (host, port).
    pub listener: ListenerConfig,

    /// Path prefixes that carry an embedded target URL.
    pub routes: Vec<RouteConfig>,

    /// Upstream fetch settings.
    pub upstream: UpstreamConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Target allow-list settings.
    pub security: SecurityConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            routes: RouteConfig::defaults(),
            upstream: UpstreamConfig::default(),
            observability: ObservabilityConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind (all interfaces by default).
    pub host: String,

    /// Port to listen on, kept as a string the way it arrives from the CLI.
    pub port: String,
}

impl ListenerConfig {
    /// Join host and port into something `TcpListener::bind` accepts.
    pub fn bind_address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: "8080".to_string(),
        }
    }
}

/// A path prefix under which the remainder of the path is the target URL.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Fixed prefix, e.g. `/proxy/`. Must start and end with `/`.
    pub prefix: String,

    /// Append the inbound raw query string to the target.
    #[serde(default)]
    pub append_query: bool,

    /// Percent-decode the parsed target once more and re-parse it.
    #[serde(default)]
    pub decode_target: bool,
}

impl RouteConfig {
    pub fn new(prefix: impl Into<String>, append_query: bool, decode_target: bool) -> Self {
        Self {
            prefix: prefix.into(),
            append_query,
            decode_target,
        }
    }

    /// The two routes served out of the box.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("/proxy/", true, true),
            Self::new("/img-proxy/", false, false),
        ]
    }
}

/// Settings for the outbound HTTP client.
///
/// Everything defaults to the client library's own behavior except
/// redirects, which are relayed rather than followed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Follow 3xx responses instead of relaying them.
    pub follow_redirects: bool,

    /// Redirect hop limit when `follow_redirects` is on.
    pub max_redirects: usize,

    /// Connection establishment timeout in seconds.
    pub connect_timeout_secs: Option<u64>,

    /// Total request timeout in seconds, body included.
    pub request_timeout_secs: Option<u64>,

    /// User-Agent sent to origins.
    pub user_agent: Option<String>,

    /// Honor `HTTP_PROXY`/`HTTPS_PROXY`/`NO_PROXY` for outbound fetches.
    pub system_proxy: bool,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            follow_redirects: false,
            max_redirects: 10,
            connect_timeout_secs: None,
            request_timeout_secs: None,
            user_agent: None,
            system_proxy: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Target allow-list configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Enforce the policy below. When off every parsed target is fetched.
    pub enabled: bool,

    /// Accepted target schemes.
    pub allowed_schemes: Vec<String>,

    /// Accepted hosts; `*.example.com` also matches subdomains. Empty means any.
    pub allowed_hosts: Vec<String>,

    /// Reject literal loopback, private and link-local addresses.
    pub deny_private_addresses: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_schemes: vec!["http".to_string(), "https".to_string()],
            allowed_hosts: Vec::new(),
            deny_private_addresses: false,
        }
    }
}
