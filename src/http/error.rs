//! Client-facing failures of a single relay request.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Everything that can end a request before origin bytes reach the caller.
///
/// Each variant maps to one status code and a fixed plain-text body.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Missing URL to proxy")]
    MissingUrl,

    #[error("Invalid URL")]
    InvalidUrl,

    #[error("Failed to decode the URL")]
    DecodeFailed,

    #[error("Invalid decoded URL")]
    InvalidDecodedUrl,

    #[error("Target not allowed")]
    TargetDenied(#[from] crate::security::Denial),

    #[error("Failed to fetch the resource")]
    UpstreamFetch(#[source] reqwest::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::MissingUrl
            | ProxyError::InvalidUrl
            | ProxyError::DecodeFailed
            | ProxyError::InvalidDecodedUrl => StatusCode::BAD_REQUEST,
            ProxyError::TargetDenied(_) => StatusCode::FORBIDDEN,
            ProxyError::UpstreamFetch(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label used for metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            ProxyError::MissingUrl => "missing_url",
            ProxyError::InvalidUrl => "invalid_url",
            ProxyError::DecodeFailed => "decode_failed",
            ProxyError::InvalidDecodedUrl => "invalid_decoded_url",
            ProxyError::TargetDenied(_) => "target_denied",
            ProxyError::UpstreamFetch(_) => "upstream_fetch",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
