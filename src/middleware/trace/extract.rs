//! Identity and header tags read from the in-flight request and response.

use http::HeaderMap;
use uuid::Uuid;

use super::span::Span;
use crate::request::Request;

/// Header carrying the caller's request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Tags identifying who asked for what: client and peer address, URI, route
/// template, basic-auth user and one `path.{name}` tag per path parameter.
pub(crate) fn tag_identity(span: &Span, req: &Request) {
    span.set_tag("client_ip", req.real_ip());
    span.set_tag("remote_addr", req.remote_addr().to_string());
    span.set_tag("request_uri", req.request_uri());
    span.set_tag("path", req.route().unwrap_or_default());

    if let Some((user, _)) = req.basic_auth() {
        span.set_tag("user", user);
    }

    for (name, value) in req.params() {
        span.set_tag(format!("path.{name}"), value);
    }
}

/// One `{prefix}{Canonical-Name}` tag per header name, holding its first value.
pub(crate) fn tag_headers(span: &Span, prefix: &str, headers: &HeaderMap) {
    for name in headers.keys() {
        if let Some(value) = headers.get(name) {
            let key = format!("{prefix}{}", canonical_header_key(name.as_str()));
            span.set_tag(key, String::from_utf8_lossy(value.as_bytes()));
        }
    }
}

/// The request id: from the request header, else from the response header,
/// else a fresh 32-character hex id.
pub(crate) fn request_id(from_request: Option<String>, response_headers: &HeaderMap) -> String {
    from_request
        .filter(|id| !id.is_empty())
        .or_else(|| {
            response_headers
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .filter(|id| !id.is_empty())
                .map(str::to_owned)
        })
        .unwrap_or_else(|| Uuid::new_v4().simple().to_string())
}

/// `content-type` → `Content-Type`, `testheader` → `Testheader`.
pub fn canonical_header_key(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Arc;

    use super::*;
    use crate::body::Body;
    use crate::middleware::trace::{InMemoryExporter, Span};

    fn span() -> Span {
        Span::start(None, "op", "txn", Arc::new(InMemoryExporter::new()))
    }

    #[test]
    fn canonical_keys() {
        assert_eq!(canonical_header_key("content-type"), "Content-Type");
        assert_eq!(canonical_header_key("testheader"), "Testheader");
        assert_eq!(canonical_header_key("x-request-id"), "X-Request-Id");
    }

    #[test]
    fn identity_tags() {
        let req = http::Request::get("/user/123?x=1")
            .header("authorization", "Basic YWxpY2U6c2VjcmV0")
            .body(Body::empty())
            .unwrap();
        let req = Request::new(
            req,
            SocketAddr::from(([10, 1, 2, 3], 5555)),
            Some(Arc::from("/user/{id}")),
            vec![("id".to_owned(), "123".to_owned())],
        );
        let span = span();
        tag_identity(&span, &req);

        assert_eq!(span.tag("client_ip").as_deref(), Some("10.1.2.3"));
        assert_eq!(span.tag("remote_addr").as_deref(), Some("10.1.2.3:5555"));
        assert_eq!(span.tag("request_uri").as_deref(), Some("/user/123?x=1"));
        assert_eq!(span.tag("path").as_deref(), Some("/user/{id}"));
        assert_eq!(span.tag("user").as_deref(), Some("alice"));
        assert_eq!(span.tag("path.id").as_deref(), Some("123"));
    }

    #[test]
    fn header_tags_take_first_value_and_bound_keys() {
        let mut headers = HeaderMap::new();
        headers.append("accept", "text/html".parse().unwrap());
        headers.append("accept", "application/json".parse().unwrap());
        headers.insert("access-control-allow-credentials", "true".parse().unwrap());

        let span = span();
        tag_headers(&span, "resp.header.", &headers);

        assert_eq!(span.tag("resp.header.Accept").as_deref(), Some("text/html"));
        assert_eq!(span.tag("resp.header.Access-Control-Allow").as_deref(), Some("true"));
    }

    #[test]
    fn request_id_sources() {
        let mut resp = HeaderMap::new();
        assert_eq!(request_id(Some("abc".to_owned()), &resp), "abc");

        resp.insert(REQUEST_ID_HEADER, "from-resp".parse().unwrap());
        assert_eq!(request_id(None, &resp), "from-resp");

        let generated = request_id(None, &HeaderMap::new());
        assert_eq!(generated.len(), 32);
        assert!(generated.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
