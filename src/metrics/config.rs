//! Configuration for the instrumentation middleware and its defaults.

use std::collections::HashMap;
use std::sync::Arc;

use prometheus::{HistogramOpts, Opts};

use super::registry::MetricsRegistry;
use crate::middleware::{Skipper, default_skipper};
use crate::request::Request;

pub const DEFAULT_HISTOGRAM_NAME: &str = "requests";
pub const DEFAULT_HISTOGRAM_HELP: &str = "A histogram of request times and status codes";
pub const DEFAULT_COUNTER_NAME: &str = "requests_total";
pub const DEFAULT_COUNTER_HELP: &str = "Number of requests by status code and path";

/// Maps a request to its `path` label.
pub type PathLabeler = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// Labels requests with their matched route pattern, or `""` when no route matched.
pub fn default_path_labeler() -> PathLabeler {
    Arc::new(|req: &Request| req.route().unwrap_or_default().to_owned())
}

/// Duration histogram options. Empty or unset fields take the defaults.
///
/// The variable labels are always `status` and `path`.
#[derive(Clone, Debug, Default)]
pub struct HistogramOptions {
    pub namespace: Option<String>,
    pub subsystem: Option<String>,
    /// Default `requests`.
    pub name: Option<String>,
    pub help: Option<String>,
    /// Upper bounds in seconds. Default [`prometheus::DEFAULT_BUCKETS`].
    pub buckets: Option<Vec<f64>>,
    pub const_labels: HashMap<String, String>,
}

/// Request counter options. The counter shares the histogram's namespace,
/// subsystem and constant labels.
#[derive(Clone, Debug, Default)]
pub struct CounterOptions {
    /// Default `requests_total`.
    pub name: Option<String>,
    pub help: Option<String>,
}

/// Partially specified configuration for [`Prometheus`](super::Prometheus).
///
/// ```rust
/// use tsu_pack::metrics::{MetricsRegistry, PrometheusConfig};
///
/// let registry = MetricsRegistry::new();
/// let config = PrometheusConfig::default()
///     .with_registry(registry.clone())
///     .with_skipper(|req| req.path() == "/healthz")
///     .with_buckets(vec![0.1, 0.5, 1.0]);
/// ```
#[derive(Clone, Default)]
pub struct PrometheusConfig {
    /// Default [`MetricsRegistry::global`].
    pub registry: Option<MetricsRegistry>,
    /// Default never skips.
    pub skipper: Option<Skipper>,
    pub histogram: HistogramOptions,
    /// `None` registers no counter.
    pub counter: Option<CounterOptions>,
    /// Default [`default_path_labeler`].
    pub path_labeler: Option<PathLabeler>,
}

impl PrometheusConfig {
    pub fn with_registry(mut self, registry: MetricsRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_skipper(mut self, skipper: impl Fn(&Request) -> bool + Send + Sync + 'static) -> Self {
        self.skipper = Some(Arc::new(skipper));
        self
    }

    pub fn with_path_labeler(
        mut self,
        labeler: impl Fn(&Request) -> String + Send + Sync + 'static,
    ) -> Self {
        self.path_labeler = Some(Arc::new(labeler));
        self
    }

    pub fn with_histogram(mut self, histogram: HistogramOptions) -> Self {
        self.histogram = histogram;
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.histogram.buckets = Some(buckets);
        self
    }

    pub fn with_counter(mut self, counter: CounterOptions) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Fills every unset field with its default. Never fails; invalid
    /// values are caught when the collectors are registered.
    pub fn resolve(self) -> ResolvedConfig {
        let h = self.histogram;
        let namespace = non_empty(h.namespace).unwrap_or_default();
        let subsystem = non_empty(h.subsystem).unwrap_or_default();

        let histogram = HistogramOpts::new(
            non_empty(h.name).unwrap_or_else(|| DEFAULT_HISTOGRAM_NAME.to_owned()),
            non_empty(h.help).unwrap_or_else(|| DEFAULT_HISTOGRAM_HELP.to_owned()),
        )
        .namespace(namespace.clone())
        .subsystem(subsystem.clone())
        .const_labels(h.const_labels.clone())
        .buckets(h.buckets.filter(|b| !b.is_empty()).unwrap_or_else(|| prometheus::DEFAULT_BUCKETS.to_vec()));

        let counter = self.counter.map(|c| {
            Opts::new(
                non_empty(c.name).unwrap_or_else(|| DEFAULT_COUNTER_NAME.to_owned()),
                non_empty(c.help).unwrap_or_else(|| DEFAULT_COUNTER_HELP.to_owned()),
            )
            .namespace(namespace)
            .subsystem(subsystem)
            .const_labels(h.const_labels)
        });

        ResolvedConfig {
            registry: self.registry.unwrap_or_else(MetricsRegistry::global),
            skipper: self.skipper.unwrap_or_else(default_skipper),
            histogram,
            counter,
            path_labeler: self.path_labeler.unwrap_or_else(default_path_labeler),
        }
    }
}

/// A configuration with every field populated.
#[derive(Clone)]
pub struct ResolvedConfig {
    pub registry: MetricsRegistry,
    pub skipper: Skipper,
    pub histogram: HistogramOpts,
    pub counter: Option<Opts>,
    pub path_labeler: PathLabeler,
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.filter(|s| !s.is_empty())
}
