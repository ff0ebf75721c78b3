//! Incoming HTTP request type.

use std::net::SocketAddr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::request::Parts;
use http::{Extensions, HeaderMap, Method, Uri};

use crate::body::Body;

/// An incoming HTTP request, as seen by middleware and handlers.
pub struct Request {
    head: Parts,
    body: Body,
    params: Vec<(String, String)>,
    route: Option<Arc<str>>,
    remote_addr: SocketAddr,
}

impl Request {
    pub(crate) fn new(
        req: http::Request<Body>,
        remote_addr: SocketAddr,
        route: Option<Arc<str>>,
        params: Vec<(String, String)>,
    ) -> Self {
        let (head, body) = req.into_parts();
        Self { head, body, params, route, remote_addr }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.head.headers }
    pub fn extensions(&self) -> &Extensions { &self.head.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.head.extensions }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }

    /// Case-insensitive header lookup. Returns the first value, if it is
    /// valid visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Path parameters in the order they appear in the route template.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The template of the matched route, e.g. `/users/{id}`.
    ///
    /// `None` when no route matched and the request is headed for a 404.
    pub fn route(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// Path and query exactly as requested, e.g. `/users/42?full=1`.
    pub fn request_uri(&self) -> &str {
        self.head.uri.path_and_query().map_or("/", |pq| pq.as_str())
    }

    /// Best-effort client address.
    ///
    /// Takes the first `X-Forwarded-For` entry, then `X-Real-IP`, then the
    /// peer address. Blank header values are skipped and IPv6 brackets are
    /// stripped.
    pub fn real_ip(&self) -> String {
        let forwarded = self
            .header("x-forwarded-for")
            .and_then(|xff| xff.split(',').next());
        let real = self.header("x-real-ip");

        [forwarded, real]
            .into_iter()
            .flatten()
            .map(|ip| strip_brackets(ip.trim()))
            .find(|ip| !ip.is_empty())
            .map_or_else(|| self.remote_addr.ip().to_string(), str::to_owned)
    }

    /// Username and password from an `Authorization: Basic` header.
    ///
    /// `None` if the header is missing, not `Basic`, not valid base64, or the
    /// decoded credentials lack a `:` separator.
    pub fn basic_auth(&self) -> Option<(String, String)> {
        let value = self.header("authorization")?;
        let (scheme, encoded) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("basic") {
            return None;
        }
        let decoded = STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_owned(), password.to_owned()))
    }

    pub fn body_mut(&mut self) -> &mut Body { &mut self.body }

    /// Takes the body out, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::take(&mut self.body)
    }

    pub fn set_body(&mut self, body: Body) {
        self.body = body;
    }

    pub fn into_body(self) -> Body { self.body }
}

fn strip_brackets(ip: &str) -> &str {
    ip.strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(ip)
}

#[cfg(test)]
pub(crate) fn test_request(req: http::Request<Body>) -> Request {
    Request::new(req, SocketAddr::from(([192, 0, 2, 1], 1234)), None, Vec::new())
}
