//! HTTP handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → request.rs (inbound view, client identity)
//!     → target.rs (strip prefix, repair scheme, append query, parse, decode)
//!     → [security::TargetPolicy check]
//!     → relay.rs (single upstream GET, stream status/headers/body back)
//!     → Send to client
//! ```
//!
//! Failures before the upstream answers become [`ProxyError`] responses.

pub mod error;
pub mod relay;
pub mod request;
pub mod server;
pub mod target;

pub use error::ProxyError;
pub use relay::{relay, Upstream};
pub use request::{ClientIdentity, InboundRequest, MakeRequestUuidV4, X_REQUEST_ID};
pub use server::HttpServer;
pub use target::TargetRule;
