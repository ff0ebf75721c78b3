//! # tsu-trace
//!
//! A minimal HTTP framework for Rust services behind a reverse proxy, with a
//! tracing middleware that turns every request into one span: who asked,
//! what for, which route answered, with what status, and (when you ask for
//! it) which headers and bodies went back and forth.
//!
//! ## The contract
//!
//! The span is enrichment, never a liability:
//!
//! - every tag key and value is bounded and cleaned before it is recorded
//! - a request body read for capture is handed to the handler byte for byte
//! - the span is finished on every exit path, panics included
//! - nothing the middleware does can fail a request
//!
//! Shipping spans anywhere is the job of an [`Exporter`](middleware::trace::Exporter).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_trace::middleware::trace::{LogExporter, Trace, TraceConfig};
//! use tsu_trace::{Error, Request, Response, Router, Server, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let app = Router::new()
//!         .layer(Trace::with_config(LogExporter, TraceConfig::default().dump_body(true)))
//!         .get("/users/{id}", get_user)
//!         .post("/users", create_user);
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//!
//! async fn get_user(req: Request) -> Response {
//!     let id = req.param("id").unwrap_or("unknown");
//!     Response::json(format!(r#"{{"id":"{id}"}}"#).into_bytes())
//! }
//!
//! async fn create_user(req: Request) -> Result<Response, Error> {
//!     let body = req.into_body().collect_bytes().await?;
//!     if body.is_empty() {
//!         return Err(Error::http(StatusCode::BAD_REQUEST, "empty body"));
//!     }
//!     Ok(Response::builder()
//!         .status(StatusCode::CREATED)
//!         .header("location", "/users/99")
//!         .json(body.to_vec()))
//! }
//! ```

mod body;
mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod middleware;

pub use body::Body;
pub use error::{BoxError, Error};
pub use handler::{BoxFuture, ErrorHandler, Handler};
pub use http::{Method, StatusCode};
pub use request::Request;
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::Router;
pub use server::Server;
