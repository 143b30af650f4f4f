//! Inbound request model and caller identification.
//!
//! # Responsibilities
//! - Capture the parts of an inbound request the interpreter needs
//! - Derive a best-effort client identity for the access log
//! - Generate a request ID for every request
//!
//! # Design Decisions
//! - Identity is observational only and never influences routing
//! - Peer addresses are split with an IPv6-aware host/port routine

use std::fmt;
use std::net::SocketAddr;

use axum::extract::ConnectInfo;
use axum::http::{request::Parts, HeaderMap, HeaderName, HeaderValue, Request};
use percent_encoding::percent_decode_str;
use tower_http::request_id::{MakeRequestId, RequestId};

use crate::http::error::ProxyError;

/// Header carrying the per-request correlation ID.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

const X_REAL_IP: &str = "x-real-ip";
const X_FORWARDED_FOR: &str = "x-forwarded-for";

/// The slice of an inbound request the interpreter works on.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Percent-decoded request path, prefix included.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub raw_query: Option<String>,
    pub headers: HeaderMap,
    /// Peer address as `host:port`, when the transport knows it.
    pub peer: Option<String>,
}

impl InboundRequest {
    /// Build from request parts.
    ///
    /// The path is decoded once the way an HTTP server presents it to
    /// handlers, so an encoded `%3A%2F%2F` reaches the interpreter as `://`.
    pub fn from_parts(parts: &Parts) -> Result<Self, ProxyError> {
        let path = percent_decode_str(parts.uri.path())
            .decode_utf8()
            .map_err(|_| ProxyError::DecodeFailed)?
            .into_owned();
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string());

        Ok(Self {
            path,
            raw_query: parts.uri.query().map(str::to_owned),
            headers: parts.headers.clone(),
            peer,
        })
    }

    /// The request ID assigned by the request-id layer, if any.
    pub fn request_id(&self) -> &str {
        self.headers
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
    }

    pub fn client_identity(&self) -> ClientIdentity {
        ClientIdentity::from_request(&self.headers, self.peer.as_deref())
    }
}

/// A best-effort, non-authoritative description of who sent a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// `X-Real-IP`, then `X-Forwarded-For`, then the peer address without
    /// its port.
    pub fn from_request(headers: &HeaderMap, peer: Option<&str>) -> Self {
        if let Some(ip) = non_empty_header(headers, X_REAL_IP) {
            return Self(ip.to_owned());
        }
        if let Some(ip) = non_empty_header(headers, X_FORWARDED_FOR) {
            return Self(ip.to_owned());
        }
        match peer {
            Some(addr) if !addr.is_empty() => Self(strip_port(addr).to_owned()),
            _ => Self("unknown".to_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn non_empty_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Split `host:port` into its parts.
///
/// Bracketed IPv6 literals (`[::1]:80`) are unwrapped. Returns `None` when
/// there is no well-formed trailing port, which includes bare IPv6
/// addresses such as `2001:db8::1`.
pub fn split_host_port(addr: &str) -> Option<(&str, &str)> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        (host, after.strip_prefix(':')?)
    } else {
        let (host, port) = addr.rsplit_once(':')?;
        if host.contains(':') {
            // more than one colon without brackets: an IPv6 address, not host:port
            return None;
        }
        (host, port)
    };

    port.parse::<u16>().ok()?;
    Some((host, port))
}

/// The host part of `addr`, or `addr` itself when it carries no port.
pub fn strip_port(addr: &str) -> &str {
    match split_host_port(addr) {
        Some((host, _)) => host,
        None => addr
            .strip_prefix('[')
            .and_then(|a| a.strip_suffix(']'))
            .unwrap_or(addr),
    }
}

/// Generates a UUID v4 request ID for requests that arrive without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuidV4;

impl MakeRequestId for MakeRequestUuidV4 {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = uuid::Uuid::new_v4().to_string();
        HeaderValue::from_str(&id).ok().map(RequestId::new)
    }
}
