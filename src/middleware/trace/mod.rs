//! Per-request tracing spans.
//!
//! [`Trace`] opens one [`Span`] per request, tags it with who asked for what
//! (client address, URI, route template, path parameters, basic-auth user,
//! request id), optionally with request/response headers and bodies, maps the
//! final HTTP status onto a [`SpanStatus`] and finishes it. Finished spans go
//! to an [`Exporter`].
//!
//! ```rust
//! use tsu_trace::middleware::trace::{LogExporter, Trace, TraceConfig};
//! use tsu_trace::{Request, Router};
//!
//! let config = TraceConfig::default()
//!     .dump_body(true)
//!     .body_skipper(|req: &Request| {
//!         let upload = req.route() == Some("/upload");
//!         (upload, false)
//!     });
//!
//! let app = Router::new()
//!     .layer(Trace::with_config(LogExporter, config))
//!     .get("/user/{id}", |req: Request| async move {
//!         req.param("id").unwrap_or_default().to_owned()
//!     });
//! ```
//!
//! Every value and key passes through [`sanitize_value`] and [`truncate_key`]
//! before it reaches the span, and the middleware never fails a request: body
//! read errors become the [`READ_ERROR`] tag, handler errors are tagged and
//! handed to the router's error handler.

use std::sync::Arc;

use tracing::Instrument;

use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

mod capture;
mod export;
mod extract;
mod sanitize;
mod span;
mod status;

pub use capture::{CaptureBody, EXCLUDED, READ_ERROR};
pub use export::{Exporter, FinishedSpan, InMemoryExporter, LogExporter};
pub use extract::{REQUEST_ID_HEADER, canonical_header_key};
pub use sanitize::{MAX_TAG_KEY_LEN, MAX_TAG_VALUE_LEN, TagLimits, sanitize_value, truncate_key};
pub use span::{Span, SpanGuard};
pub use status::SpanStatus;

/// Decides whether a request bypasses the middleware entirely.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync + 'static>;

/// Decides, per request, whether to leave out the request body and the
/// response body: `(skip_request, skip_response)`.
pub type BodySkipper = Arc<dyn Fn(&Request) -> (bool, bool) + Send + Sync + 'static>;

/// Configuration for [`Trace`].
///
/// Built once at startup and shared read-only by every request. Defaults:
/// headers are dumped, bodies are not, nothing is skipped, tag values are
/// capped at [`MAX_TAG_VALUE_LEN`] characters and keys at [`MAX_TAG_KEY_LEN`].
#[derive(Clone)]
pub struct TraceConfig {
    skipper: Option<Skipper>,
    body_skipper: Option<BodySkipper>,
    dump_headers: bool,
    dump_body: bool,
    limits: TagLimits,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            skipper: None,
            body_skipper: None,
            dump_headers: true,
            dump_body: false,
            limits: TagLimits::default(),
        }
    }
}

impl TraceConfig {
    /// Requests for which `f` returns `true` pass through untraced.
    pub fn skipper(mut self, f: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skipper = Some(Arc::new(f));
        self
    }

    /// Per-request body exclusion; only consulted when bodies are dumped.
    pub fn body_skipper(
        mut self,
        f: impl Fn(&Request) -> (bool, bool) + Send + Sync + 'static,
    ) -> Self {
        self.body_skipper = Some(Arc::new(f));
        self
    }

    /// Tag `req.header.*` and `resp.header.*`.
    pub fn dump_headers(mut self, on: bool) -> Self {
        self.dump_headers = on;
        self
    }

    /// Tag `req.body` and `resp.body`.
    pub fn dump_body(mut self, on: bool) -> Self {
        self.dump_body = on;
        self
    }

    pub fn max_tag_value_len(mut self, max: usize) -> Self {
        self.limits.value = max;
        self
    }

    pub fn max_tag_key_len(mut self, max: usize) -> Self {
        self.limits.key = max;
        self
    }

    fn skips(&self, req: &Request) -> bool {
        self.skipper.as_ref().is_some_and(|f| f(req))
    }

    fn skips_body(&self, req: &Request) -> (bool, bool) {
        self.body_skipper.as_ref().map_or((false, false), |f| f(req))
    }
}

impl std::fmt::Debug for TraceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceConfig")
            .field("skipper", &self.skipper.is_some())
            .field("body_skipper", &self.body_skipper.is_some())
            .field("dump_headers", &self.dump_headers)
            .field("dump_body", &self.dump_body)
            .field("limits", &self.limits)
            .finish()
    }
}

/// The tracing middleware. Register it with [`Router::layer`](crate::Router::layer).
#[derive(Clone)]
pub struct Trace {
    config: Arc<TraceConfig>,
    exporter: Arc<dyn Exporter>,
}

impl Trace {
    /// Tracing with the default [`TraceConfig`].
    pub fn new(exporter: impl Exporter) -> Self {
        Self::with_config(exporter, TraceConfig::default())
    }

    pub fn with_config(exporter: impl Exporter, config: TraceConfig) -> Self {
        Self { config: Arc::new(config), exporter: Arc::new(exporter) }
    }
}

impl Middleware for Trace {
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        if self.config.skips(&req) {
            return next.run(req);
        }
        Box::pin(trace_request(Arc::clone(&self.config), Arc::clone(&self.exporter), req, next))
    }
}

async fn trace_request(
    config: Arc<TraceConfig>,
    exporter: Arc<dyn Exporter>,
    mut req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let operation = format!("HTTP {method} {}", req.route().unwrap_or_default());
    let transaction = format!("HTTP {method} {}", req.request_uri());
    let span = Span::start_with_limits(
        req.extensions().get::<Span>(),
        operation.trim_end(),
        transaction,
        config.limits,
        exporter,
    );
    let guard = SpanGuard::new(span.clone());

    extract::tag_identity(&span, &req);
    if config.dump_headers {
        extract::tag_headers(&span, "req.header.", req.headers());
    }

    let mut skip_response_body = true;
    if config.dump_body {
        let (skip_request, skip_response) = config.skips_body(&req);
        skip_response_body = skip_response;
        if skip_request {
            span.set_tag("req.body", EXCLUDED);
        } else {
            let (body, captured) = capture::buffer_request(req.take_body()).await;
            req.set_body(body);
            match captured {
                Some(bytes) => span.set_tag("req.body", String::from_utf8_lossy(&bytes)),
                None => span.set_tag("req.body", READ_ERROR),
            }
        }
    }

    let request_id = req.header(REQUEST_ID_HEADER).map(str::to_owned);
    req.extensions_mut().insert(span.clone());

    let on_error = next.error_handler();
    let mut response = next.run(req).instrument(span.tracing_span().clone()).await;

    if let Some(err) = response.take_error() {
        span.set_tag("handler.error", err.to_string());
        response = on_error(err);
    }

    span.set_tag("request_id", extract::request_id(request_id, response.headers()));
    let status = response.status_code();
    span.set_status(SpanStatus::from_http(status.as_u16()));
    span.set_tag("resp.status", status.as_str());

    if config.dump_headers {
        extract::tag_headers(&span, "resp.header.", response.headers());
    }

    if !config.dump_body {
        return response;
    }
    if skip_response_body {
        span.set_tag("resp.body", EXCLUDED);
        return response;
    }

    response.map_body(|body| crate::body::Body::new(CaptureBody::new(body, guard)))
}

/// Access to the request's span from handlers and inner middleware.
pub trait SpanExt {
    /// The span [`Trace`] opened for this request, if any.
    fn span(&self) -> Option<&Span>;
}

impl SpanExt for Request {
    fn span(&self) -> Option<&Span> {
        self.extensions().get::<Span>()
    }
}
