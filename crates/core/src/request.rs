//! Request identity for cache lookups.
//!
//! A [`RequestKey`] is the normalized identity of an outbound request:
//! HTTP method plus canonical absolute URL. Two reformulations of an
//! equivalent request (different host casing, trailing fragment, untrimmed
//! whitespace) collapse to the same key, so cache lookups stay stable.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// HTTP method of an intercepted request.
///
/// Only GET requests are eligible for any cache tier; everything else
/// bypasses the cache subsystem entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Other(String),
}

impl Method {
    /// Parse a method name case-insensitively.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "PATCH" => Method::Patch,
            other => Method::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonicalize a URL string for stable cache identity.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to `https://` if missing
/// 3. Lowercase the host
/// 4. Remove fragment (#...)
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<Url, Error> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(Error::InvalidUrl("empty URL".to_string()));
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = Url::parse(&url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(Error::InvalidUrl(format!("unsupported scheme: {scheme}"))),
    }

    if let Some(mut host) = parsed.host_str() {
        let h = host.to_lowercase();
        host = h.as_str();
        parsed
            .set_host(Some(host))
            .map_err(|e| Error::InvalidUrl(e.to_string()))?;
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Normalized identity of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    method: Method,
    url: Url,
}

impl RequestKey {
    /// Build a key from a method and a URL string, canonicalizing the URL.
    pub fn new(method: Method, url: &str) -> Result<Self, Error> {
        Ok(Self { method, url: canonicalize(url)? })
    }

    /// Shorthand for the common GET case.
    pub fn get(url: &str) -> Result<Self, Error> {
        Self::new(Method::Get, url)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether this request may touch any cache partition.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::Get
    }

    /// Stable storage key for partition rows.
    pub fn digest(&self) -> String {
        crate::cache::hash::request_digest(self.method.as_str(), self.url.as_str())
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
