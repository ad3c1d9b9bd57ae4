//! Request instrumentation.
//!
//! [`Prometheus`] times every request that its skipper lets through and
//! records the elapsed seconds in a histogram labelled by `status` and
//! `path`. [`expose`] serves the registry the histogram lives in.
//!
//! ```rust,no_run
//! use tsu_pack::metrics::{ExposeConfig, MetricsRegistry, Prometheus, PrometheusConfig, expose};
//! use tsu_pack::{Router, Server};
//!
//! # async fn hello(_: tsu_pack::Request) -> Result<tsu_pack::Response, tsu_pack::HttpError> { Ok(tsu_pack::Response::text("hi")) }
//! # async fn run() -> Result<(), tsu_pack::Error> {
//! let registry = MetricsRegistry::new();
//! let app = Router::new()
//!     .middleware(Prometheus::new(PrometheusConfig::default().with_registry(registry.clone()))?)
//!     .get("/hello", hello)
//!     .get("/metrics", expose(ExposeConfig::default().with_registry(registry)));
//! Server::bind(([0, 0, 0, 0], 8080)).serve(app).await
//! # }
//! ```
//!
//! # Status classification
//!
//! Middleware runs before the router's error handler turns an error into a
//! response, so the status of a failed request has to be inferred:
//!
//! 1. a successful result reports the status of the returned response;
//! 2. an error that is (or wraps) an [`HttpError`] reports its status;
//! 3. any other error is recorded as `500`.
//!
//! A custom [`Router::error_handler`](crate::Router::error_handler) that maps
//! some other error type to, say, `404` still shows up as `500` here. Running
//! the error handler from inside the middleware would run it twice.
//!
//! A request whose future is dropped before the handler finishes (client
//! went away) is recorded as `499`. One that unwinds from a panic is
//! recorded as `500`.

mod config;
mod expose;
mod registry;

use std::time::Instant;

use http::StatusCode;

use crate::error::{Error, HandlerResult, HttpError};
use crate::handler::BoxFuture;
use crate::middleware::{Middleware, Next, Skipper};
use crate::request::Request;

pub use config::{
    CounterOptions, DEFAULT_COUNTER_HELP, DEFAULT_COUNTER_NAME, DEFAULT_HISTOGRAM_HELP,
    DEFAULT_HISTOGRAM_NAME, HistogramOptions, PathLabeler, PrometheusConfig, ResolvedConfig,
    default_path_labeler,
};
pub use expose::{ExposeConfig, expose};
pub use registry::{LABELS, MetricsRegistry, RequestMetrics};

/// Status recorded when the request future is dropped before completion.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// The instrumentation middleware.
///
/// Construction registers its collectors, so it fails if the registry already
/// holds a metric of the same name. Build it during startup and abort on error.
pub struct Prometheus {
    metrics: RequestMetrics,
    skipper: Skipper,
    path_labeler: PathLabeler,
}

impl Prometheus {
    pub fn new(config: PrometheusConfig) -> Result<Self, Error> {
        let config = config.resolve();
        let metrics = RequestMetrics::register(&config.registry, config.histogram, config.counter)?;
        Ok(Self { metrics, skipper: config.skipper, path_labeler: config.path_labeler })
    }

    /// Instrumentation with every default, recording into [`MetricsRegistry::global`].
    pub fn with_defaults() -> Result<Self, Error> {
        Self::new(PrometheusConfig::default())
    }

    pub fn metrics(&self) -> &RequestMetrics {
        &self.metrics
    }
}

impl Middleware for Prometheus {
    fn call(&self, req: Request, next: Next) -> BoxFuture<HandlerResult> {
        if (self.skipper)(&req) {
            return next.run(req);
        }

        let observation = Observation {
            metrics: self.metrics.clone(),
            path: (self.path_labeler)(&req),
            start: Instant::now(),
            done: false,
        };

        Box::pin(async move {
            let result = next.run(req).await;
            observation.finish(status_of(&result));
            result
        })
    }
}

/// Best-effort status of a handler result. See the [module docs](self).
pub fn status_of(result: &HandlerResult) -> u16 {
    match result {
        Ok(res) => res.status_code().as_u16(),
        Err(err) => guess_status(err),
    }
}

fn guess_status(err: &anyhow::Error) -> u16 {
    err.downcast_ref::<HttpError>()
        .map_or(StatusCode::INTERNAL_SERVER_ERROR, HttpError::status)
        .as_u16()
}

/// One pending histogram sample. Records on drop if never finished.
struct Observation {
    metrics: RequestMetrics,
    path: String,
    start: Instant,
    done: bool,
}

impl Observation {
    fn finish(mut self, status: u16) {
        self.record(status);
    }

    fn record(&mut self, status: u16) {
        self.done = true;
        self.metrics.observe(status, &self.path, self.start.elapsed());
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        let status = if std::thread::panicking() {
            StatusCode::INTERNAL_SERVER_ERROR.as_u16()
        } else {
            CLIENT_CLOSED_REQUEST
        };
        self.record(status);
    }
}
