//! Upstream fetch and response relay.
//!
//! # Responsibilities
//! - Issue exactly one GET per request to the resolved target
//! - Copy the origin status and every header value, in order
//! - Stream the origin body through without buffering it
//!
//! # Design Decisions
//! - 3xx responses are relayed, not followed, unless configured otherwise
//! - When redirects are followed, each hop goes through the target policy
//! - `Transfer-Encoding` belongs to the serving connection's framing and is
//!   the only header not copied
//! - The upstream body is owned by the outgoing body stream, so it is
//!   released whenever that stream ends, fails, or is dropped because the
//!   caller went away

use std::error::Error as _;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::header::TRANSFER_ENCODING,
    response::Response,
};
use futures_util::TryStreamExt;
use reqwest::redirect::Policy;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::error::ProxyError;
use crate::observability::metrics;
use crate::security::{Denial, TargetPolicy};

/// Outbound HTTP client shared by all requests.
///
/// Cheap to clone; clones share one connection pool.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: reqwest::Client,
}

impl Upstream {
    /// Build the client. Every redirect hop is checked against `policy`
    /// before it is followed.
    pub fn from_config(
        config: &UpstreamConfig,
        policy: Arc<TargetPolicy>,
    ) -> Result<Self, reqwest::Error> {
        let redirect = if config.follow_redirects {
            redirect_policy(config.max_redirects, policy)
        } else {
            Policy::none()
        };

        let mut builder = reqwest::Client::builder().redirect(redirect);
        if let Some(secs) = config.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if !config.system_proxy {
            builder = builder.no_proxy();
        }

        Ok(Self {
            client: builder.build()?,
        })
    }

    /// Send a single GET. Transport failures and redirect hops the target
    /// policy denies are errors; any status the origin answers with is a
    /// successful fetch.
    pub async fn fetch(&self, target: Url) -> Result<reqwest::Response, ProxyError> {
        self.client.get(target).send().await.map_err(|e| {
            let denial = e.source().and_then(|s| s.downcast_ref::<Denial>()).cloned();
            match denial {
                Some(denial) if e.is_redirect() => ProxyError::TargetDenied(denial),
                _ => ProxyError::UpstreamFetch(e),
            }
        })
    }
}

/// Follow at most `max` hops, refusing any hop the target policy denies.
fn redirect_policy(max: usize, policy: Arc<TargetPolicy>) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > max {
            return attempt.error("too many redirects");
        }
        match policy.check(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(denial) => attempt.error(denial),
        }
    })
}

/// Turn an origin response into the response for the caller.
///
/// `route` and `request_id` only label the log line and metric emitted if
/// the body breaks after the headers have gone out.
pub fn relay(upstream: reqwest::Response, route: &str, request_id: &str) -> Response {
    let status = upstream.status();
    let headers = upstream.headers().clone();

    let route = route.to_owned();
    let request_id = request_id.to_owned();
    let stream = upstream.bytes_stream().inspect_err(move |e| {
        tracing::warn!(
            request_id = %request_id,
            route = %route,
            error = %e,
            "Upstream body failed mid-stream"
        );
        metrics::record_upstream_error(&route, "relay");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;

    let out = response.headers_mut();
    for (name, value) in headers.iter() {
        if *name == TRANSFER_ENCODING {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_every_option() {
        let config = UpstreamConfig {
            follow_redirects: true,
            max_redirects: 3,
            connect_timeout_secs: Some(2),
            request_timeout_secs: Some(10),
            user_agent: Some("img-relay-test".into()),
            system_proxy: false,
        };
        assert!(Upstream::from_config(&config, Arc::default()).is_ok());
    }

    #[tokio::test]
    async fn connection_refused_is_fetch_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = UpstreamConfig {
            system_proxy: false,
            ..UpstreamConfig::default()
        };
        let upstream = Upstream::from_config(&config, Arc::default()).unwrap();
        let target = Url::parse(&format!("http://{addr}/gone.png")).unwrap();
        let err = upstream.fetch(target).await.unwrap_err();
        assert!(matches!(err, ProxyError::UpstreamFetch(_)));
        assert_eq!(err.status(), axum::http::StatusCode::INTERNAL_SERVER_ERROR);
    }
}
