//! Middleware layer.
//!
//! Middleware intercepts requests and responses and is the right place for
//! cross-cutting concerns. Each middleware receives the [`Request`] and a
//! [`Next`] continuation; calling [`Next::run`] passes the request further
//! down the chain and eventually to the route handler. Not calling it
//! short-circuits the request.
//!
//! Built-in middleware:
//! - [`trace`]: per-request span with request/response metadata, headers
//!   and (optionally) bodies

use std::future::Future;
use std::sync::Arc;

use crate::handler::{BoxFuture, ErrorHandler, SharedEndpoint};
use crate::request::Request;
use crate::response::Response;

pub mod trace;

/// A request interceptor registered with [`Router::layer`](crate::Router::layer).
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, req: Request, next: Next) -> BoxFuture;
}

/// The rest of the middleware chain, ending in the route handler.
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    index: usize,
    endpoint: SharedEndpoint,
    on_error: ErrorHandler,
}

impl Next {
    pub(crate) fn new(
        chain: Arc<[Arc<dyn Middleware>]>,
        endpoint: SharedEndpoint,
        on_error: ErrorHandler,
    ) -> Self {
        Self { chain, index: 0, endpoint, on_error }
    }

    /// Runs the remaining middleware and the handler.
    pub fn run(mut self, req: Request) -> BoxFuture {
        match self.chain.get(self.index).cloned() {
            Some(mw) => {
                self.index += 1;
                mw.handle(req, self)
            }
            None => self.endpoint.call(req),
        }
    }

    /// The router's central error handler.
    ///
    /// Middleware that inspects a failed response's error hands it here so the
    /// client gets the same answer it would have received without middleware.
    pub fn error_handler(&self) -> ErrorHandler {
        Arc::clone(&self.on_error)
    }
}

/// Adapts an async closure into a [`Middleware`].
///
/// ```rust
/// use tsu_trace::middleware::{from_fn, Next};
/// use tsu_trace::{Request, Router};
///
/// let app = Router::new().layer(from_fn(|req: Request, next: Next| async move {
///     let mut res = next.run(req).await;
///     res.headers_mut().insert("x-served-by", "tsu".parse().unwrap());
///     res
/// }));
/// ```
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    FromFn(f)
}

/// Middleware built by [`from_fn`].
pub struct FromFn<F>(F);

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn handle(&self, req: Request, next: Next) -> BoxFuture {
        Box::pin((self.0)(req, next))
    }
}
