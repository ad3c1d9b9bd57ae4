//! Two ways to wire request metrics.
//!
//! - `:8080` — simple: global registry, `/metrics` on the same listener.
//! - `:8081` — advanced: own registry plus a custom counter, scraped from
//!   a separate listener on `:9090`.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example metrics
//!
//! Try:
//!   curl http://localhost:8080/hello/alice
//!   curl http://localhost:8080/forbidden
//!   curl http://localhost:8080/metrics
//!   curl http://localhost:8081/tick
//!   curl http://localhost:9090/metrics

use prometheus::IntCounter;
use tracing::{error, info};
use tsu_pack::metrics::{ExposeConfig, MetricsRegistry, Prometheus, PrometheusConfig, expose};
use tsu_pack::middleware::{RequestId, RequestIdMiddleware};
use tsu_pack::{HttpError, Request, Response, Router, Server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let simple = simple()?;
    let (advanced, scrape) = advanced()?;

    tokio::try_join!(
        Server::bind(([0, 0, 0, 0], 8080)).serve(simple),
        Server::bind(([0, 0, 0, 0], 8081)).serve(advanced),
        Server::bind(([0, 0, 0, 0], 9090)).serve(scrape),
    )?;
    Ok(())
}

fn simple() -> anyhow::Result<Router> {
    let app = example_routes(Router::new())
        .middleware(RequestIdMiddleware::default())
        .middleware(Prometheus::with_defaults()?)
        .get("/metrics", expose(ExposeConfig::default()));
    Ok(app)
}

fn advanced() -> anyhow::Result<(Router, Router)> {
    let registry = MetricsRegistry::new();

    let ticks = IntCounter::new("mymetric", "Number of ticks")?;
    registry.register(Box::new(ticks.clone()))?;

    let prometheus = Prometheus::new(
        PrometheusConfig::default()
            .with_registry(registry.clone())
            .with_skipper(|req| req.path() == "/healthz"),
    )?;

    let app = example_routes(Router::new())
        .middleware(prometheus)
        .get("/tick", move |_req: Request| {
            let ticks = ticks.clone();
            async move {
                ticks.inc();
                Ok::<_, HttpError>(Response::text("Incremented metric"))
            }
        });

    let scrape = Router::new()
        .get("/metrics", expose(ExposeConfig::default().with_registry(registry)));

    Ok((app, scrape))
}

fn example_routes(router: Router) -> Router {
    router
        .get("/hello", hello)
        .get("/hello/{handle}", hello_handle)
        .get("/error", fail)
        .get("/forbidden", forbidden)
}

// GET /hello → 204 No Content
async fn hello(req: Request) -> Result<http::StatusCode, HttpError> {
    let id = req.extensions().get::<RequestId>().map(RequestId::as_str).unwrap_or("-");
    info!(request_id = id, "hello world");
    Ok(http::StatusCode::NO_CONTENT)
}

// GET /hello/{handle}
async fn hello_handle(req: Request) -> Result<Response, HttpError> {
    let handle = req.param("handle").unwrap_or_default();
    info!(handle, "hello");
    Ok(Response::text(handle.to_owned()))
}

// GET /error → recorded and answered as 500
async fn fail(_req: Request) -> anyhow::Result<Response> {
    let err = anyhow::anyhow!("failed to handle request");
    error!("failed for some reason: {err}");
    Err(err)
}

// GET /forbidden → recorded and answered as 403
async fn forbidden(_req: Request) -> Result<Response, HttpError> {
    Err(HttpError::forbidden())
}
