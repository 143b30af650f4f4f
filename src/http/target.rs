//! Target URL extraction and repair.
//!
//! Turns the path of an inbound request into the URL that will be fetched:
//!
//! ```text
//! /proxy/https:/cdn.example.com/pic.png  (+ raw query "w=100")
//!     → strip route prefix          "https:/cdn.example.com/pic.png"
//!     → repair collapsed scheme     "https://cdn.example.com/pic.png"
//!     → append raw query            "https://cdn.example.com/pic.png?w=100"
//!     → parse                       Url
//!     → decode once + re-parse      Url          (decode_target routes only)
//!     → require scheme and host
//! ```
//!
//! Everything here is pure and synchronous.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::RouteConfig;
use crate::http::error::ProxyError;

/// How a route turns its path remainder into a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRule {
    prefix: String,
    append_query: bool,
    decode_target: bool,
}

impl TargetRule {
    pub fn new(prefix: impl Into<String>, append_query: bool, decode_target: bool) -> Self {
        Self {
            prefix: prefix.into(),
            append_query,
            decode_target,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve the target for a decoded request path and its raw query.
    pub fn resolve(&self, path: &str, raw_query: Option<&str>) -> Result<Url, ProxyError> {
        let remainder = path.strip_prefix(self.prefix.as_str()).unwrap_or_default();
        if remainder.is_empty() {
            return Err(ProxyError::MissingUrl);
        }

        let mut target = repair_scheme(remainder).into_owned();
        if self.append_query {
            if let Some(query) = raw_query.filter(|q| !q.is_empty()) {
                target.push('?');
                target.push_str(query);
            }
        }

        let mut url = Url::parse(&target).map_err(|_| ProxyError::InvalidUrl)?;

        if self.decode_target {
            let decoded = decode_once(url.as_str())?;
            url = Url::parse(&decoded).map_err(|_| ProxyError::InvalidDecodedUrl)?;
        }

        if url.scheme().is_empty() || url.host_str().map_or(true, str::is_empty) {
            return Err(if self.decode_target {
                ProxyError::InvalidDecodedUrl
            } else {
                ProxyError::InvalidUrl
            });
        }

        Ok(url)
    }
}

impl From<&RouteConfig> for TargetRule {
    fn from(route: &RouteConfig) -> Self {
        Self::new(route.prefix.clone(), route.append_query, route.decode_target)
    }
}

/// Reinsert the slash that path normalization drops from `http://` and
/// `https://`. Targets that already have both slashes are left alone.
pub fn repair_scheme(target: &str) -> Cow<'_, str> {
    for scheme in ["http:/", "https:/"] {
        if let Some(rest) = target.strip_prefix(scheme) {
            if rest.starts_with('/') {
                return Cow::Borrowed(target);
            }
            return Cow::Owned(format!("{scheme}/{rest}"));
        }
    }
    Cow::Borrowed(target)
}

/// Percent-decode `input` exactly once.
///
/// Unlike form decoding, `+` stays a `+`. A `%` that is not followed by two
/// hex digits, or a result that is not UTF-8, is an error.
pub fn decode_once(input: &str) -> Result<String, ProxyError> {
    let bytes = input.as_bytes();
    let mut i = 0;
    while let Some(offset) = bytes[i..].iter().position(|b| *b == b'%') {
        let at = i + offset;
        match bytes.get(at + 1..at + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => i = at + 3,
            _ => return Err(ProxyError::DecodeFailed),
        }
    }

    percent_decode_str(input)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| ProxyError::DecodeFailed)
}
