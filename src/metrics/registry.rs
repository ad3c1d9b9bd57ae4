//! Metrics registry and the request collectors it owns.

use std::time::Duration;

use prometheus::core::Collector;
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use tracing::{debug, warn};

use crate::error::Error;

/// Variable labels of every request collector, in `with_label_values` order.
pub const LABELS: [&str; 2] = ["status", "path"];

/// A set of named collectors, exposed together.
///
/// Cloning is cheap and yields a handle to the same registry, so one registry
/// can be handed to the instrumentation middleware on the application
/// listener and to [`expose`](super::expose) on a metrics listener.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Registry,
}

impl MetricsRegistry {
    /// A fresh, empty registry.
    pub fn new() -> Self {
        Self { inner: Registry::new() }
    }

    /// The process-wide default registry of the `prometheus` crate.
    pub fn global() -> Self {
        Self { inner: prometheus::default_registry().clone() }
    }

    /// Adds `collector`. Fails if a collector with the same fully-qualified
    /// name and label set is already registered here.
    pub fn register(&self, collector: Box<dyn Collector>) -> Result<(), Error> {
        self.inner.register(collector)?;
        Ok(())
    }

    pub fn unregister(&self, collector: Box<dyn Collector>) -> Result<(), Error> {
        self.inner.unregister(collector)?;
        Ok(())
    }

    /// Snapshot of every registered collector. Families without samples are
    /// omitted.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.inner.gather()
    }

    /// Snapshot in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<Vec<u8>, Error> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        Ok(buf)
    }

    pub fn as_prometheus(&self) -> &Registry {
        &self.inner
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Registry> for MetricsRegistry {
    fn from(inner: Registry) -> Self {
        Self { inner }
    }
}

/// The request collectors: a duration histogram and an optional counter,
/// both labelled by [`LABELS`].
#[derive(Clone)]
pub struct RequestMetrics {
    histogram: HistogramVec,
    counter: Option<IntCounterVec>,
}

impl RequestMetrics {
    /// Builds the collectors and registers them on `registry`.
    ///
    /// Either both become active or neither does.
    pub fn register(
        registry: &MetricsRegistry,
        histogram: HistogramOpts,
        counter: Option<Opts>,
    ) -> Result<Self, Error> {
        let name = histogram.common_opts.fq_name();
        check_buckets(&histogram.buckets)?;
        // Buckets are only validated when a labelled child is created, which
        // would be the first request. Probe them now instead.
        Histogram::with_opts(histogram.clone())?;
        let histogram = HistogramVec::new(histogram, &LABELS)?;
        let counter = counter.map(|opts| IntCounterVec::new(opts, &LABELS)).transpose()?;

        registry.register(Box::new(histogram.clone()))?;
        if let Some(counter) = &counter {
            if let Err(e) = registry.register(Box::new(counter.clone())) {
                if let Err(rollback) = registry.unregister(Box::new(histogram.clone())) {
                    warn!(
                        histogram = %name,
                        error = %rollback,
                        "failed to unregister histogram after counter registration failed"
                    );
                }
                return Err(e);
            }
        }

        debug!(histogram = %name, counter = counter.is_some(), "registered request metrics");
        Ok(Self { histogram, counter })
    }

    /// Records one finished request.
    pub fn observe(&self, status: u16, path: &str, elapsed: Duration) {
        let status = status.to_string();
        let labels = [status.as_str(), path];
        self.histogram.with_label_values(&labels).observe(elapsed.as_secs_f64());
        if let Some(counter) = &self.counter {
            counter.with_label_values(&labels).inc();
        }
    }

    pub fn histogram(&self) -> &HistogramVec {
        &self.histogram
    }
}

/// NaN compares false against everything, so `prometheus` lets it through
/// its ordering check. Only a trailing `+Inf` is allowed to be non-finite.
fn check_buckets(buckets: &[f64]) -> Result<(), Error> {
    let last = buckets.len().saturating_sub(1);
    for (i, &b) in buckets.iter().enumerate() {
        if b.is_finite() || (i == last && b == f64::INFINITY) {
            continue;
        }
        let msg = format!("histogram bucket {b} at index {i} is not a finite upper bound");
        return Err(prometheus::Error::Msg(msg).into());
    }
    Ok(())
}
