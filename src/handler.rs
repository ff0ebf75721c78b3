//! Route handlers, the endpoint they become, and the fallback endpoints.
//!
//! Any `async fn(Request) -> impl IntoResponse` is a [`Handler`]. On
//! registration it is erased into an [`Endpoint`] so routes of different
//! types share one tree; the middleware chain ends by calling one.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;
use tracing::error;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Future returned by endpoints and by [`Middleware::handle`](crate::middleware::Middleware::handle).
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Turns a failed handler's [`Error`] into the response the client receives.
pub type ErrorHandler = Arc<dyn Fn(Error) -> Response + Send + Sync + 'static>;

#[doc(hidden)]
pub trait Endpoint: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type SharedEndpoint = Arc<dyn Endpoint>;

/// A route handler.
///
/// Implemented for every `Fn(Request) -> impl Future<Output = impl IntoResponse>`.
/// A handler fails by returning `Err(e)` with `e: Into<Error>`; middleware
/// sees the error first, then the router's error handler answers it.
pub trait Handler: Send + Sync + 'static {
    #[doc(hidden)]
    fn into_endpoint(self) -> SharedEndpoint;
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_endpoint(self) -> SharedEndpoint {
        Arc::new(FnEndpoint(self))
    }
}

struct FnEndpoint<F>(F);

impl<F, Fut, R> Endpoint for FnEndpoint<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let pending = (self.0)(req);
        Box::pin(async move { pending.await.into_response() })
    }
}

/// Endpoint for requests no route matched.
pub(crate) async fn not_found(_req: Request) -> Response {
    Response::status(StatusCode::NOT_FOUND)
}

/// Error handler used until the application installs its own.
///
/// [`Error::Http`] answers with its own status and message. Anything else is
/// logged and answered with a bare `500`.
pub(crate) fn default_error_handler(err: Error) -> Response {
    match err {
        Error::Http { status, message } => Response::builder().status(status).text(message),
        other => {
            error!(error = %other, "unhandled handler error");
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .text("Internal Server Error")
        }
    }
}
