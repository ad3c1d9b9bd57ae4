//! # tsu-pack
//!
//! Request instrumentation for services built on the tsu router: a latency
//! histogram per status and route, a pull endpoint for scrapers, and
//! correlation-id propagation.
//!
//! ## What you get
//!
//! - [`metrics::Prometheus`] — times every request and records it in a
//!   Prometheus histogram labelled `status` and `path`. `path` is the matched
//!   route pattern (`/users/{id}`), never the raw URL.
//! - [`metrics::expose`] — serves a registry in the text exposition format.
//!   Mount it on the application router or on a second [`Server`].
//! - [`middleware::RequestIdMiddleware`] — echoes `X-Request-Id` or generates one.
//!
//! Registries are explicit values. [`metrics::MetricsRegistry::global`] is
//! there when you want the process default, but nothing requires it.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use tsu_pack::metrics::{ExposeConfig, MetricsRegistry, Prometheus, PrometheusConfig, expose};
//! use tsu_pack::middleware::RequestIdMiddleware;
//! use tsu_pack::{HttpError, Request, Response, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tsu_pack::Error> {
//!     let registry = MetricsRegistry::new();
//!
//!     // Fails if the histogram is already registered: abort before serving.
//!     let prometheus = Prometheus::new(PrometheusConfig::default().with_registry(registry.clone()))?;
//!
//!     let app = Router::new()
//!         .middleware(RequestIdMiddleware::default())
//!         .middleware(prometheus)
//!         .get("/users/{id}", get_user);
//!
//!     let scrape = Router::new()
//!         .get("/metrics", expose(ExposeConfig::default().with_registry(registry)));
//!
//!     tokio::try_join!(
//!         Server::bind(([0, 0, 0, 0], 3000)).serve(app),
//!         Server::bind(([0, 0, 0, 0], 9090)).serve(scrape),
//!     )?;
//!     Ok(())
//! }
//!
//! async fn get_user(req: Request) -> Result<Response, HttpError> {
//!     match req.param("id") {
//!         Some("0") => Err(HttpError::not_found()),
//!         Some(id) => Ok(Response::json(format!(r#"{{"id":"{id}"}}"#))),
//!         None => Err(HttpError::not_found()),
//!     }
//! }
//! ```

mod error;
mod handler;
mod request;
mod response;
mod router;
mod server;

pub mod metrics;
pub mod middleware;

pub use error::{Error, HandlerResult, HttpError};
pub use handler::{BoxFuture, Handler};
pub use request::{Request, ResponseHeaders};
pub use response::{ContentType, IntoResponse, Response, ResponseBuilder};
pub use router::{ErrorHandler, Router, default_error_handler};
pub use server::Server;
