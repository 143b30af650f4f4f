//! Configuration validation.
//!
//! Serde handles the syntax; this pass checks values. Every problem is
//! collected so a bad file is reported in one go.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.port `{0}` is not a valid port")]
    InvalidPort(String),
    #[error("listener.host must not be empty")]
    EmptyHost,
    #[error("no routes configured")]
    NoRoutes,
    #[error("route prefix `{0}` must start and end with `/` and name a segment")]
    InvalidPrefix(String),
    #[error("route prefix `{0}` is configured more than once")]
    DuplicatePrefix(String),
    #[error("upstream.max_redirects must be greater than zero when following redirects")]
    ZeroRedirects,
    #[error("upstream.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
    #[error("observability.metrics_address `{0}` is not a socket address")]
    InvalidMetricsAddress(String),
    #[error("security.allowed_schemes must not be empty when the policy is enabled")]
    NoAllowedSchemes,
}

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match config.listener.port.parse::<u16>() {
        Ok(0) | Err(_) => errors.push(ValidationError::InvalidPort(config.listener.port.clone())),
        Ok(_) => {}
    }
    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError::EmptyHost);
    }

    if config.routes.is_empty() {
        errors.push(ValidationError::NoRoutes);
    }
    let mut seen = HashSet::new();
    for route in &config.routes {
        let prefix = route.prefix.as_str();
        if prefix.len() < 3 || !prefix.starts_with('/') || !prefix.ends_with('/') || prefix.contains('{') {
            errors.push(ValidationError::InvalidPrefix(route.prefix.clone()));
        }
        if !seen.insert(prefix) {
            errors.push(ValidationError::DuplicatePrefix(route.prefix.clone()));
        }
    }

    let upstream = &config.upstream;
    if upstream.follow_redirects && upstream.max_redirects == 0 {
        errors.push(ValidationError::ZeroRedirects);
    }
    if upstream.connect_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroTimeout("connect_timeout_secs"));
    }
    if upstream.request_timeout_secs == Some(0) {
        errors.push(ValidationError::ZeroTimeout("request_timeout_secs"));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if config.security.enabled && config.security.allowed_schemes.is_empty() {
        errors.push(ValidationError::NoAllowedSchemes);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::RouteConfig;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ProxyConfig::default();
        config.listener.port = "http".into();
        config.routes.push(RouteConfig::new("/proxy/", false, false));
        config.routes.push(RouteConfig::new("nope", false, false));
        config.upstream.request_timeout_secs = Some(0);

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidPort("http".into()),
                ValidationError::DuplicatePrefix("/proxy/".into()),
                ValidationError::InvalidPrefix("nope".into()),
                ValidationError::ZeroTimeout("request_timeout_secs"),
            ]
        );
    }

    #[test]
    fn root_prefix_is_rejected() {
        let mut config = ProxyConfig::default();
        config.routes = vec![RouteConfig::new("/", true, false)];
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidPrefix("/".into())])
        );
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ProxyConfig::default();
        config.observability.metrics_address = "not an address".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidMetricsAddress("not an address".into())])
        );
    }
}
