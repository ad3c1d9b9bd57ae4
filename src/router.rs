//! Radix-tree request router.
//!
//! One tree per HTTP method. O(path-length) lookup. Every request, matched or
//! not, runs through the middleware chain, so 404s and 405s are measured too.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;
use tracing::error;

use crate::error::{HandlerResult, HttpError};
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{Middleware, Next};
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Turns a handler error into the response sent to the client.
pub type ErrorHandler = Arc<dyn Fn(&anyhow::Error) -> Response + Send + Sync>;

#[derive(Clone)]
struct Route {
    handler: BoxedHandler,
    pattern: Arc<str>,
}

/// The application router.
///
/// Build it once at startup; pass it to [`Server::serve`](crate::Server::serve).
/// Every builder method returns `self` so registrations chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    middleware: Arc<[Arc<dyn Middleware>]>,
    error_handler: ErrorHandler,
    not_found: BoxedHandler,
    method_not_allowed: BoxedHandler,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            middleware: Vec::new().into(),
            error_handler: Arc::new(default_error_handler),
            not_found: not_found.into_boxed_handler(),
            method_not_allowed: method_not_allowed.into_boxed_handler(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax — `req.param("name")` retrieves them,
    /// and the pattern itself is available as `req.route()`.
    ///
    /// # Panics
    ///
    /// Panics if `path` is not a valid route or conflicts with one already
    /// registered for `method`.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route { handler: handler.into_boxed_handler(), pattern: Arc::from(path) };
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

    /// Appends a middleware. The first one added is the outermost.
    pub fn middleware(mut self, mw: impl Middleware) -> Self {
        let mut chain = self.middleware.to_vec();
        chain.push(Arc::new(mw));
        self.middleware = chain.into();
        self
    }

    /// Replaces the error handler. It runs after the middleware chain has
    /// unwound, so middleware never sees the response it builds.
    pub fn error_handler(
        mut self,
        handler: impl Fn(&anyhow::Error) -> Response + Send + Sync + 'static,
    ) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Dispatches one request through the middleware chain and returns the
    /// final response, with staged response headers applied.
    pub async fn handle(&self, mut req: Request) -> Response {
        let endpoint = match self.lookup(req.method(), req.path()) {
            Lookup::Found(route, params) => {
                req.params = params;
                req.route = Some(route.pattern);
                route.handler
            }
            Lookup::MethodNotAllowed => Arc::clone(&self.method_not_allowed),
            Lookup::NotFound => Arc::clone(&self.not_found),
        };

        let staged = req.response_headers.clone();
        let mut response = match Next::new(Arc::clone(&self.middleware), endpoint).run(req).await {
            Ok(res) => res,
            Err(err) => (self.error_handler)(&err),
        };
        staged.apply_to(&mut response.headers);
        response
    }

    fn lookup(&self, method: &Method, path: &str) -> Lookup {
        if let Some(matched) = self.routes.get(method).and_then(|tree| tree.at(path).ok()) {
            let params = matched.params.iter()
                .map(|(k, v)| (k.to_owned(), v.to_owned()))
                .collect();
            return Lookup::Found(matched.value.clone(), params);
        }

        let elsewhere = self.routes.iter()
            .any(|(m, tree)| m != method && tree.at(path).is_ok());
        if elsewhere { Lookup::MethodNotAllowed } else { Lookup::NotFound }
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

enum Lookup {
    Found(Route, HashMap<String, String>),
    MethodNotAllowed,
    NotFound,
}

/// `HttpError` → its status and message; anything else → logged, `500`.
pub fn default_error_handler(err: &anyhow::Error) -> Response {
    if let Some(e) = err.downcast_ref::<HttpError>() {
        return Response::builder().status(e.status()).text(e.message());
    }
    let chain = format!("{err:#}");
    error!(error = %chain, "unhandled handler error");
    http::StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

async fn not_found(_req: Request) -> HandlerResult {
    Err(HttpError::not_found().into())
}

async fn method_not_allowed(_req: Request) -> HandlerResult {
    Err(HttpError::method_not_allowed().into())
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;
    use http::header::{HeaderName, HeaderValue};

    use super::*;
    use crate::middleware::from_fn;

    async fn user(req: Request) -> Result<Response, HttpError> {
        Ok(Response::text(format!("{} {}", req.route().unwrap_or("-"), req.param("id").unwrap_or("-"))))
    }

    async fn teapot(_req: Request) -> Result<Response, anyhow::Error> {
        Err(anyhow::anyhow!("kettle"))
    }

    fn request(method: Method, path: &str) -> Request {
        http::Request::builder().method(method).uri(path).body(Bytes::new()).unwrap().into()
    }

    #[tokio::test]
    async fn test_route_params_and_pattern() {
        let router = Router::new().get("/users/{id}", user);
        let res = router.handle(request(Method::GET, "/users/42")).await;
        assert_eq!(res.status_code(), StatusCode::OK);
        assert_eq!(res.body(), b"/users/{id} 42");
    }

    #[tokio::test]
    async fn test_not_found_and_method_not_allowed() {
        let router = Router::new().get("/users/{id}", user);
        let missing = router.handle(request(Method::GET, "/nothing")).await;
        let wrong = router.handle(request(Method::DELETE, "/users/1")).await;
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(wrong.status_code(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_custom_error_handler_runs_after_middleware() {
        let router = Router::new()
            .middleware(from_fn(|req: Request, next: Next| async move {
                let result = next.run(req).await;
                assert!(result.is_err());
                result
            }))
            .error_handler(|_| StatusCode::IM_A_TEAPOT.into_response())
            .get("/tea", teapot);

        let res = router.handle(request(Method::GET, "/tea")).await;
        assert_eq!(res.status_code(), StatusCode::IM_A_TEAPOT);
    }

    #[tokio::test]
    async fn test_middleware_order_is_outermost_first() {
        fn tag(name: &'static str) -> impl Middleware {
            from_fn(move |req: Request, next: Next| async move {
                let mut res = next.run(req).await?;
                res.headers_mut().append("x-order", HeaderValue::from_static(name));
                Ok::<_, anyhow::Error>(res)
            })
        }

        let router = Router::new()
            .middleware(tag("outer"))
            .middleware(tag("inner"))
            .get("/users/{id}", user);

        let res = router.handle(request(Method::GET, "/users/1")).await;
        let order: Vec<_> = res.headers().get_all("x-order").iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(order, ["inner", "outer"]);
    }

    #[tokio::test]
    async fn test_staged_headers_reach_error_responses() {
        let router = Router::new().middleware(from_fn(|req: Request, next: Next| async move {
            req.response_headers()
                .insert(HeaderName::from_static("x-staged"), HeaderValue::from_static("yes"));
            next.run(req).await
        }));

        let res = router.handle(request(Method::GET, "/missing")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.headers()["x-staged"], "yes");
    }
}
