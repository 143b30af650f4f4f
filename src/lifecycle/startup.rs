//! Startup orchestration.
//!
//! Resolves the effective configuration from file, CLI and defaults, then
//! binds the listener. Any error here is fatal.

use std::path::Path;

use tokio::net::TcpListener;

use crate::config::{load_or_default, validate_config, ConfigError, ListenerConfig, ProxyConfig};

/// Values given on the command line, applied on top of the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub port: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Load the config file (if any), apply overrides, validate the result.
pub fn resolve_config(path: Option<&Path>, overrides: &Overrides) -> Result<ProxyConfig, StartupError> {
    let mut config = load_or_default(path)?;

    if let Some(port) = &overrides.port {
        config.listener.port = port.clone();
    }
    if let Some(level) = &overrides.log_level {
        config.observability.log_level = level.clone();
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Bind the listening socket.
pub async fn bind(listener: &ListenerConfig) -> Result<TcpListener, StartupError> {
    let address = listener.bind_address();
    TcpListener::bind(&address)
        .await
        .map_err(|source| StartupError::Bind { address, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationError;

    #[test]
    fn cli_port_overrides_default() {
        let overrides = Overrides {
            port: Some("9191".into()),
            log_level: Some("debug".into()),
        };
        let config = resolve_config(None, &overrides).unwrap();
        assert_eq!(config.listener.port, "9191");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn bad_cli_port_is_rejected() {
        let overrides = Overrides {
            port: Some("eighty".into()),
            ..Overrides::default()
        };
        match resolve_config(None, &overrides) {
            Err(StartupError::Config(ConfigError::Validation(errors))) => {
                assert_eq!(errors, vec![ValidationError::InvalidPort("eighty".into())]);
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port().to_string();

        let listener = ListenerConfig {
            host: "127.0.0.1".into(),
            port,
        };
        let err = bind(&listener).await.unwrap_err();
        assert!(matches!(err, StartupError::Bind { .. }));
    }
}
