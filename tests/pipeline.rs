//! End-to-end behaviour of the instrumentation and request-id middleware
//! stacked on one router.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use tsu_pack::metrics::{
    CounterOptions, ExposeConfig, HistogramOptions, MetricsRegistry, Prometheus, PrometheusConfig,
    expose,
};
use tsu_pack::middleware::{RequestIdConfig, RequestIdMiddleware};
use tsu_pack::{HttpError, Request, Response, Router};

#[derive(Debug, thiserror::Error)]
#[error("no such account")]
struct AccountMissing;

async fn hello(req: Request) -> Result<Response, HttpError> {
    Ok(Response::text(format!("hello {}", req.param("handle").unwrap_or("world"))))
}

async fn forbidden(_req: Request) -> Result<Response, HttpError> {
    Err(HttpError::forbidden())
}

async fn account(_req: Request) -> Result<Response, AccountMissing> {
    Err(AccountMissing)
}

fn get(path: &str) -> Request {
    http::Request::builder().uri(path).body(Bytes::new()).unwrap().into()
}

fn sample_count(registry: &MetricsRegistry, name: &str, status: &str, path: &str) -> u64 {
    registry
        .gather()
        .iter()
        .filter(|f| f.get_name() == name)
        .flat_map(|f| f.get_metric())
        .filter(|m| {
            let labels = m.get_label();
            labels.iter().any(|l| l.get_name() == "status" && l.get_value() == status)
                && labels.iter().any(|l| l.get_name() == "path" && l.get_value() == path)
        })
        .map(|m| m.get_histogram().get_sample_count())
        .sum()
}

fn app(registry: &MetricsRegistry, config: PrometheusConfig) -> Router {
    let prometheus = Prometheus::new(config.with_registry(registry.clone())).unwrap();
    Router::new()
        .middleware(RequestIdMiddleware::default())
        .middleware(prometheus)
        .get("/hello", hello)
        .get("/hello/{handle}", hello)
        .get("/forbidden", forbidden)
        .get("/accounts/{id}", account)
}

#[tokio::test]
async fn test_forbidden_error_is_labelled_403_and_carries_request_id() {
    let registry = MetricsRegistry::new();
    let router = app(&registry, PrometheusConfig::default());

    let res = router.handle(get("/forbidden")).await;

    assert_eq!(res.status_code(), StatusCode::FORBIDDEN);
    assert!(!res.headers()["x-request-id"].is_empty());
    assert_eq!(sample_count(&registry, "requests", "403", "/forbidden"), 1);
    assert_eq!(sample_count(&registry, "requests", "500", "/forbidden"), 0);
}

#[tokio::test]
async fn test_error_handler_mapping_is_not_visible_to_metrics() {
    // Known approximation: the error handler runs after the middleware has
    // recorded, so a mapped 404 is still counted as 500.
    let registry = MetricsRegistry::new();
    let router = app(&registry, PrometheusConfig::default()).error_handler(|err| {
        if err.downcast_ref::<AccountMissing>().is_some() {
            Response::status(StatusCode::NOT_FOUND)
        } else {
            tsu_pack::default_error_handler(err)
        }
    });

    let res = router.handle(get("/accounts/7")).await;
    assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
    assert_eq!(sample_count(&registry, "requests", "500", "/accounts/{id}"), 1);
}

#[tokio::test]
async fn test_skipped_requests_match_the_bare_handler() {
    let registry = MetricsRegistry::new();
    let skipping = Prometheus::new(
        PrometheusConfig::default()
            .with_registry(registry.clone())
            .with_skipper(|_| true),
    )
    .unwrap();
    let instrumented = Router::new().middleware(skipping).get("/hello/{handle}", hello);
    let bare = Router::new().get("/hello/{handle}", hello);

    let a = instrumented.handle(get("/hello/alice")).await;
    let b = bare.handle(get("/hello/alice")).await;

    assert_eq!(a.status_code(), b.status_code());
    assert_eq!(a.headers(), b.headers());
    assert_eq!(a.body(), b.body());
    assert!(registry.gather().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_lose_no_observations() {
    const N: u64 = 1000;

    let registry = MetricsRegistry::new();
    let router = Arc::new(app(&registry, PrometheusConfig::default()));

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..N {
        let router = Arc::clone(&router);
        tasks.spawn(async move { router.handle(get("/hello")).await.status_code() });
    }
    while let Some(status) = tasks.join_next().await {
        assert_eq!(status.unwrap(), StatusCode::OK);
    }

    assert_eq!(sample_count(&registry, "requests", "200", "/hello"), N);
}

#[tokio::test]
async fn test_scrape_from_a_separate_router_sees_application_traffic() {
    let registry = MetricsRegistry::new();
    let config = PrometheusConfig::default()
        .with_histogram(HistogramOptions {
            namespace: Some("shop".to_owned()),
            ..HistogramOptions::default()
        })
        .with_counter(CounterOptions::default());
    let router = app(&registry, config);
    let scrape = Router::new()
        .get("/metrics", expose(ExposeConfig::default().with_registry(registry.clone())));

    router.handle(get("/hello/alice")).await;
    router.handle(get("/hello/bob")).await;
    router.handle(get("/missing")).await;

    let res = scrape.handle(get("/metrics")).await;
    assert_eq!(res.status_code(), StatusCode::OK);
    let body = String::from_utf8(res.body().to_vec()).unwrap();

    assert!(body.contains(r#"shop_requests_count{path="/hello/{handle}",status="200"} 2"#));
    assert!(body.contains(r#"shop_requests_count{path="",status="404"} 1"#));
    assert!(body.contains(r#"shop_requests_total{path="/hello/{handle}",status="200"} 2"#));
    assert!(!body.contains("/hello/alice"));
}

#[tokio::test]
async fn test_request_id_skipper_is_independent_of_metrics_skipper() {
    let registry = MetricsRegistry::new();
    let prometheus = Prometheus::new(
        PrometheusConfig::default()
            .with_registry(registry.clone())
            .with_skipper(|req| req.path() == "/hello"),
    )
    .unwrap();
    let router = Router::new()
        .middleware(RequestIdMiddleware::new(RequestIdConfig::default()))
        .middleware(prometheus)
        .get("/hello", hello);

    let res = tokio::time::timeout(Duration::from_secs(1), router.handle(get("/hello")))
        .await
        .unwrap();

    assert_eq!(res.headers()["x-request-id"].len(), 32);
    assert!(registry.gather().is_empty());
}
