//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every route remembers the
//! template it was registered under, so middleware can name spans and metrics
//! after `/users/{id}` rather than after each concrete URI.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use hyper::body::Body as HttpBody;
use matchit::Router as MatchitRouter;

use crate::body::Body;
use crate::error::{BoxError, Error};
use crate::handler::{self, ErrorHandler, Handler, SharedEndpoint};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::Response;

struct Route {
    template: Arc<str>,
    handler: SharedEndpoint,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Each registration returns `self` so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    not_found: SharedEndpoint,
    on_error: ErrorHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new().into(),
            not_found: handler::not_found.into_endpoint(),
            on_error: Arc::new(handler::default_error_handler),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax; `req.param("name")` retrieves them:
    ///
    /// ```rust
    /// # use tsu_trace::{Method, Request, Response, Router};
    /// # async fn get_user(_: Request) -> Response { Response::text("") }
    /// # async fn create_user(_: Request) -> Response { Response::text("") }
    /// Router::new()
    ///     .on(Method::GET,  "/users/{id}", get_user)
    ///     .on(Method::POST, "/users",      create_user);
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with an existing one.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { template: Arc::from(path), handler: handler.into_endpoint() };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Appends a middleware. The first one registered runs outermost.
    ///
    /// Middleware runs for every request, including those that match no route.
    pub fn layer(mut self, middleware: impl Middleware) -> Self {
        let mut chain = self.middleware.to_vec();
        chain.push(Arc::new(middleware));
        self.middleware = chain.into();
        self
    }

    /// Replaces the central error handler that failed handlers are routed to.
    pub fn error_handler(
        mut self,
        f: impl Fn(Error) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.on_error = Arc::new(f);
        self
    }

    /// Runs one request through the middleware chain and its handler.
    ///
    /// Any handler error still pending once the chain returns is answered by
    /// the error handler.
    pub async fn dispatch<B>(&self, req: http::Request<B>, remote_addr: SocketAddr) -> http::Response<Body>
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let req = req.map(Body::new);
        let (endpoint, template, params) = match self.lookup(req.method(), req.uri().path()) {
            Some((route, params)) => (Arc::clone(&route.handler), Some(Arc::clone(&route.template)), params),
            None => (Arc::clone(&self.not_found), None, Vec::new()),
        };

        let next = Next::new(Arc::clone(&self.middleware), endpoint, Arc::clone(&self.on_error));
        let mut response = next.run(Request::new(req, remote_addr, template, params)).await;

        if let Some(err) = response.take_error() {
            response = (self.on_error)(err);
        }
        response.into_http()
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&Route, Vec<(String, String)>)> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched.params.iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some((matched.value, params))
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use http_body_util::BodyExt;

    use crate::middleware::from_fn;

    fn addr() -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], 40000))
    }

    async fn body_text(res: http::Response<Body>) -> String {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn routes_expose_template_and_params() {
        let app = Router::new().get("/users/{id}", |req: Request| async move {
            format!("{} {}", req.route().unwrap_or("-"), req.param("id").unwrap_or("-"))
        });

        let req = http::Request::get("/users/42").body(Body::empty()).unwrap();
        let res = app.dispatch(req, addr()).await;
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "/users/{id} 42");
    }

    #[tokio::test]
    async fn middleware_runs_in_registration_order_even_for_404() {
        let app = Router::new()
            .layer(from_fn(|req: Request, next: Next| async move {
                let mut res = next.run(req).await;
                res.headers_mut().append("x-order", "outer".parse().unwrap());
                res
            }))
            .layer(from_fn(|req: Request, next: Next| async move {
                let mut res = next.run(req).await;
                res.headers_mut().append("x-order", "inner".parse().unwrap());
                res
            }));

        let req = http::Request::get("/missing").body(Body::empty()).unwrap();
        let res = app.dispatch(req, addr()).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let order: Vec<_> = res.headers().get_all("x-order").iter().collect();
        assert_eq!(order, ["inner", "outer"]);
    }

    #[tokio::test]
    async fn pending_errors_reach_the_error_handler() {
        let app = Router::new()
            .get("/fail", |_req: Request| async {
                Err::<Response, _>(Error::http(StatusCode::CONFLICT, "taken"))
            })
            .error_handler(|err| Response::builder().status(err.status()).text("custom"));

        let req = http::Request::get("/fail").body(Body::empty()).unwrap();
        let res = app.dispatch(req, addr()).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(body_text(res).await, "custom");
    }

    #[tokio::test]
    async fn default_error_handler_hides_internal_errors() {
        let app = Router::new().get("/fail", |_req: Request| async {
            Err::<Response, _>(Error::body(std::io::Error::other("boom")))
        });

        let req = http::Request::get("/fail").body(Body::empty()).unwrap();
        let res = app.dispatch(req, addr()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(res).await, "Internal Server Error");
    }
}
