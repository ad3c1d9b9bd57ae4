//! Pull endpoint serving a registry in the Prometheus text format.

use crate::error::HandlerResult;
use crate::handler::Handler;
use crate::request::Request;
use crate::response::{ContentType, Response};

use super::registry::MetricsRegistry;

/// Configuration for [`expose`].
#[derive(Clone, Default)]
pub struct ExposeConfig {
    /// Default [`MetricsRegistry::global`].
    pub registry: Option<MetricsRegistry>,
}

impl ExposeConfig {
    pub fn with_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }
}

/// A handler answering with the current state of the configured registry.
///
/// Mount it on any router, including one served on its own listener:
///
/// ```rust,no_run
/// use tsu_pack::metrics::{ExposeConfig, MetricsRegistry, expose};
/// use tsu_pack::{Router, Server};
///
/// # async fn run() -> Result<(), tsu_pack::Error> {
/// let registry = MetricsRegistry::new();
/// let scrape = Router::new()
///     .get("/metrics", expose(ExposeConfig::default().with_registry(registry)));
/// Server::bind(([0, 0, 0, 0], 9090)).serve(scrape).await
/// # }
/// ```
pub fn expose(config: ExposeConfig) -> impl Handler {
    let registry = config.registry.unwrap_or_else(MetricsRegistry::global);
    move |_req: Request| {
        let registry = registry.clone();
        async move { render(&registry) }
    }
}

fn render(registry: &MetricsRegistry) -> HandlerResult {
    let body = registry.encode_text()?;
    Ok(Response::builder().bytes(ContentType::Prometheus, body))
}
