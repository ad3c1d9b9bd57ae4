//! Middleware layer.
//!
//! Middleware intercepts a request on its way to the handler and sees the
//! handler's result on the way back. It is the place for cross-cutting
//! concerns: metrics, request-id injection, auth-header inspection.
//!
//! A middleware receives the request and a [`Next`] that runs the rest of the
//! chain. It must hand back whatever `Next` produced unless it deliberately
//! answers on its own. Errors are not responses yet at this point: the router
//! turns them into responses only after every middleware has unwound.
//!
//! ```rust,no_run
//! use tsu_pack::middleware::{self, Next};
//! use tsu_pack::{Request, Response, Router};
//!
//! # async fn hello(_: Request) -> Result<Response, tsu_pack::HttpError> { Ok(Response::text("hi")) }
//! let app = Router::new()
//!     .middleware(middleware::from_fn(|req: Request, next: Next| async move {
//!         tracing::debug!(path = req.path(), "incoming");
//!         next.run(req).await
//!     }))
//!     .get("/hello", hello);
//! ```
//!
//! Built-in middleware:
//! - [`RequestIdMiddleware`] — propagates or generates a correlation id header
//! - [`Prometheus`](crate::metrics::Prometheus) — request latency histogram

mod request_id;

use std::future::Future;
use std::sync::Arc;

use crate::error::HandlerResult;
use crate::handler::{BoxFuture, BoxedHandler};
use crate::request::Request;

pub use request_id::{Generator, RequestId, RequestIdConfig, RequestIdMiddleware, random_id};

/// A function deciding whether a request bypasses a middleware entirely.
pub type Skipper = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// The skipper used when none is configured: never skip.
pub fn default_skipper() -> Skipper {
    Arc::new(|_: &Request| false)
}

/// A request interceptor.
///
/// Implementations must be cheap to call concurrently; per-request state
/// belongs in the returned future.
pub trait Middleware: Send + Sync + 'static {
    fn call(&self, req: Request, next: Next) -> BoxFuture<HandlerResult>;
}

/// The remainder of the middleware chain, ending at the route handler.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn Middleware>]>,
    endpoint: BoxedHandler,
    position: usize,
}

impl Next {
    pub(crate) fn new(chain: Arc<[Arc<dyn Middleware>]>, endpoint: BoxedHandler) -> Self {
        Self { chain, endpoint, position: 0 }
    }

    /// Runs the next middleware, or the handler once the chain is exhausted.
    pub fn run(self, req: Request) -> BoxFuture<HandlerResult> {
        let Some(mw) = self.chain.get(self.position).cloned() else {
            return self.endpoint.call(req);
        };
        let next = Self { position: self.position + 1, ..self };
        mw.call(req, next)
    }
}

/// Middleware built from an async closure. See [`from_fn`].
pub struct FromFn<F>(F);

/// Adapts `async |req, next| -> HandlerResult` into a [`Middleware`].
pub fn from_fn<F, Fut>(f: F) -> FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FromFn(f)
}

impl<F, Fut> Middleware for FromFn<F>
where
    F: Fn(Request, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        Box::pin((self.0)(req, next))
    }
}
