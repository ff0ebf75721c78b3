//! Traced CRUD-style JSON endpoints.
//!
//! Every request produces one span, logged by `LogExporter` when it finishes.
//! Bodies are captured except on `/upload`.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/42 -H 'x-request-id: demo-1'
//!   curl -X POST http://localhost:3000/users \
//!        -u alice:secret \
//!        -H 'content-type: application/json' \
//!        -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users
//!   curl -X DELETE http://localhost:3000/users/42
//!   curl http://localhost:3000/healthz

use tsu_trace::middleware::trace::{LogExporter, SpanExt, Trace, TraceConfig};
use tsu_trace::{Error, Request, Response, Router, Server, StatusCode};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let config = TraceConfig::default()
        .dump_body(true)
        .skipper(|req: &Request| req.uri().path() == "/healthz")
        .body_skipper(|req: &Request| (req.route() == Some("/upload"), false));

    let app = Router::new()
        .layer(Trace::with_config(LogExporter, config))
        .get("/users/{id}",    get_user)
        .post("/users",        create_user)
        .delete("/users/{id}", delete_user)
        .post("/upload",       upload)
        .get("/healthz",       |_req: Request| async { "ok" });

    Server::bind("0.0.0.0:3000")?.serve(app).await
}

async fn get_user(req: Request) -> Response {
    if let Some(span) = req.span() {
        span.set_tag("user.lookup", "cache-miss");
    }
    let id = req.param("id").unwrap_or("unknown");
    Response::json(format!(r#"{{"id":"{id}","name":"alice"}}"#).into_bytes())
}

// The body was already captured for the span; the handler still reads all of it.
async fn create_user(req: Request) -> Result<Response, Error> {
    let body = req.into_body().collect_bytes().await?;
    if body.is_empty() {
        return Err(Error::http(StatusCode::BAD_REQUEST, "empty body"));
    }

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header("location", "/users/99")
        .json(r#"{"id":"99","name":"new_user"}"#.to_owned().into_bytes()))
}

async fn delete_user(_req: Request) -> Response {
    Response::status(StatusCode::NO_CONTENT)
}

async fn upload(req: Request) -> Result<Response, Error> {
    let body = req.into_body().collect_bytes().await?;
    Ok(Response::text(format!("{} bytes", body.len())))
}
