//! Prometheus metrics for the event-bus layers.
//!
//! All metrics follow the naming convention: `eb_<layer>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., events_emitted_total)
//! - **Histogram**: Distribution of values (e.g., handler_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Histogram, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // HANDLER BUSES (storage, coordination)
    // =========================================================================

    /// Envelopes emitted per bus and event type
    pub static ref EVENTS_EMITTED: CounterVec = CounterVec::new(
        Opts::new("eb_bus_events_emitted_total", "Envelopes emitted onto a bus"),
        &["bus", "event_type"]
    ).expect("metric creation failed");

    /// Handler invocations that returned an error or panicked
    pub static ref HANDLER_FAILURES: CounterVec = CounterVec::new(
        Opts::new("eb_bus_handler_failures_total", "Handler invocations that failed"),
        &["bus", "handler"]
    ).expect("metric creation failed");

    /// Handler execution time
    pub static ref HANDLER_DURATION: HistogramVec = HistogramVec::new(
        prometheus::HistogramOpts::new(
            "eb_bus_handler_duration_seconds",
            "Time spent inside a single handler invocation"
        ).buckets(exponential_buckets(0.0001, 2.0, 15).expect("valid buckets")),
        &["bus"]
    ).expect("metric creation failed");

    /// Envelopes rejected because their id was already emitted on the bus
    pub static ref DUPLICATES_REJECTED: CounterVec = CounterVec::new(
        Opts::new("eb_bus_duplicates_rejected_total", "Envelopes rejected for a repeated id"),
        &["bus"]
    ).expect("metric creation failed");

    // =========================================================================
    // REPLAY BUFFER
    // =========================================================================

    /// Envelopes evicted from replay buffers once full
    pub static ref REPLAY_EVICTIONS: Counter = Counter::new(
        "eb_replay_evictions_total",
        "Envelopes evicted from a replay buffer"
    ).expect("metric creation failed");

    // =========================================================================
    // FAN-OUT BUS
    // =========================================================================

    /// Envelopes enqueued to fan-out subscribers
    pub static ref FANOUT_DELIVERED: Counter = Counter::new(
        "eb_fanout_delivered_total",
        "Envelopes enqueued to fan-out subscriptions"
    ).expect("metric creation failed");

    /// Envelopes dropped because a subscriber's queue was full
    pub static ref FANOUT_OVERFLOW: Counter = Counter::new(
        "eb_fanout_overflow_total",
        "Envelopes dropped for a fan-out subscription with a full queue"
    ).expect("metric creation failed");
}

/// Handle proving that metrics are registered.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    _registry: Arc<Registry>,
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(EVENTS_EMITTED.clone()),
        Box::new(HANDLER_FAILURES.clone()),
        Box::new(HANDLER_DURATION.clone()),
        Box::new(DUPLICATES_REJECTED.clone()),
        Box::new(REPLAY_EVICTIONS.clone()),
        Box::new(FANOUT_DELIVERED.clone()),
        Box::new(FANOUT_OVERFLOW.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        _registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        self.histogram.observe(duration);
    }
}

/// Start timing a handler invocation on `bus`. Observation happens on drop.
pub fn time_handler(bus: &str) -> HistogramTimer {
    HistogramTimer::new(&HANDLER_DURATION.with_label_values(&[bus]))
}
