//! HTTP server setup and the proxy handler.
//!
//! # Responsibilities
//! - Build one Axum route pair per configured prefix
//! - Wire up middleware (request ID, tracing)
//! - Interpret each request into a target, check it, fetch it, relay it
//! - Serve until the shutdown signal fires
//!
//! The router is an explicit value owned by [`HttpServer`]; nothing is
//! registered globally, so several servers can run in one process.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::{request_id::SetRequestIdLayer, trace::TraceLayer};

use crate::config::ProxyConfig;
use crate::http::error::ProxyError;
use crate::http::relay::{relay, Upstream};
use crate::http::request::{InboundRequest, MakeRequestUuidV4, X_REQUEST_ID};
use crate::http::target::TargetRule;
use crate::lifecycle::ShutdownSignal;
use crate::observability::metrics;
use crate::security::TargetPolicy;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Upstream,
    pub policy: Arc<TargetPolicy>,
}

/// HTTP server for the relay.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    ///
    /// Fails only if the upstream HTTP client cannot be built.
    pub fn new(config: ProxyConfig) -> Result<Self, reqwest::Error> {
        let policy = Arc::new(TargetPolicy::from_config(&config.security));
        let state = AppState {
            upstream: Upstream::from_config(&config.upstream, Arc::clone(&policy))?,
            policy,
        };

        let router = Self::build_router(&config, state);
        Ok(Self { router, config })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        let mut router = Router::new();

        for route in &config.routes {
            let rule = Arc::new(TargetRule::from(route));
            let prefix = route.prefix.clone();

            let handler = move |State(state): State<AppState>, request: Request<Body>| {
                let rule = Arc::clone(&rule);
                async move { proxy_handler(state, &rule, request).await }
            };

            router = router
                .route(&prefix, get(handler.clone()))
                .route(&format!("{prefix}{{*target}}"), get(handler));
        }

        router
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID.clone(), MakeRequestUuidV4))
    }

    /// The fully layered router, for driving requests without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: ShutdownSignal) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = ?self.config.routes.iter().map(|r| r.prefix.as_str()).collect::<Vec<_>>(),
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.wait().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
/// Resolves the embedded target, fetches it and relays the origin response.
async fn proxy_handler(state: AppState, rule: &TargetRule, request: Request<Body>) -> Response {
    let start = Instant::now();
    let route = rule.prefix();
    let (parts, _body) = request.into_parts();

    let inbound = match InboundRequest::from_parts(&parts) {
        Ok(inbound) => inbound,
        Err(e) => return reject(route, "unknown", None, e, start),
    };
    let request_id = inbound.request_id().to_owned();
    let client = inbound.client_identity();

    let target = match rule.resolve(&inbound.path, inbound.raw_query.as_deref()) {
        Ok(target) => target,
        Err(e) => return reject(route, &request_id, Some(client.as_str()), e, start),
    };

    tracing::info!(
        request_id = %request_id,
        client_ip = %client,
        target = %target,
        "Proxy request"
    );

    if let Err(denial) = state.policy.check(&target) {
        tracing::warn!(request_id = %request_id, target = %target, reason = %denial, "Target denied");
        return reject(route, &request_id, Some(client.as_str()), denial.into(), start);
    }

    let upstream = match state.upstream.fetch(target).await {
        Ok(upstream) => upstream,
        Err(e @ ProxyError::TargetDenied(_)) => {
            tracing::warn!(request_id = %request_id, error = ?e, "Redirect target denied");
            return reject(route, &request_id, Some(client.as_str()), e, start);
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = ?e, "Upstream fetch failed");
            metrics::record_upstream_error(route, "fetch");
            metrics::record_request(route, e.status().as_u16(), start);
            return e.into_response();
        }
    };

    let response = relay(upstream, route, &request_id);
    tracing::debug!(
        request_id = %request_id,
        status = response.status().as_u16(),
        "Relaying upstream response"
    );
    metrics::record_request(route, response.status().as_u16(), start);
    response
}

/// Answer a request that never reached the upstream.
fn reject(
    route: &str,
    request_id: &str,
    client: Option<&str>,
    error: ProxyError,
    start: Instant,
) -> Response {
    tracing::warn!(
        request_id = %request_id,
        client_ip = client.unwrap_or("unknown"),
        route = %route,
        error = %error,
        "Rejected proxy request"
    );
    metrics::record_rejected(route, error.reason());
    metrics::record_request(route, error.status().as_u16(), start);
    error.into_response()
}
