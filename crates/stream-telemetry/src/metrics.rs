//! Prometheus metrics for the event core.
//!
//! All metrics follow the naming convention: `event_<metric>_<unit>` and are
//! labelled per topic.
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., event_publish_total)
//! - **Gauge**: Value that can go up or down (e.g., event_handlers_in_flight)
//! - **Histogram**: Distribution of values (e.g., event_publish_duration_seconds)

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter,
    IntGaugeVec, Opts, Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // PUBLISH METRICS
    // =========================================================================

    /// Publish attempts by outcome
    pub static ref EVENT_PUBLISH_TOTAL: CounterVec = CounterVec::new(
        Opts::new("event_publish_total", "Publish attempts by topic and outcome"),
        &["topic", "outcome"]  // outcome: success/schema_invalid/transport_error/serialization_error
    ).expect("metric creation failed");

    /// Publish latency, validation included
    pub static ref EVENT_PUBLISH_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "event_publish_duration_seconds",
            "Time spent validating and appending an event"
        ).buckets(exponential_buckets(0.0001, 2.0, 15).expect("valid buckets")),
        &["topic"]
    ).expect("metric creation failed");

    /// Schema validation outcomes
    pub static ref EVENT_SCHEMA_VALIDATIONS: CounterVec = CounterVec::new(
        Opts::new("event_schema_validations_total", "Schema validations by topic and outcome"),
        &["topic", "outcome"]  // outcome: valid/invalid
    ).expect("metric creation failed");

    // =========================================================================
    // CONSUME METRICS
    // =========================================================================

    /// Terminal dispositions per delivery
    pub static ref EVENT_CONSUME_TOTAL: CounterVec = CounterVec::new(
        Opts::new("event_consume_total", "Deliveries by topic and disposition"),
        &["topic", "outcome"]  // outcome: ack/nak/dead_letter/dropped/deferred
    ).expect("metric creation failed");

    /// Deliveries with delivery_count > 1
    pub static ref EVENT_REDELIVERIES: CounterVec = CounterVec::new(
        Opts::new("event_redeliveries_total", "Redelivered messages by topic"),
        &["topic"]
    ).expect("metric creation failed");

    /// Dead-lettered messages
    pub static ref EVENT_DEAD_LETTERS: CounterVec = CounterVec::new(
        Opts::new("event_dead_letters_total", "Dead-lettered messages by topic and reason"),
        &["topic", "reason"]  // reason: schema-invalid/non-retryable/max-deliver
    ).expect("metric creation failed");

    /// Handlers currently running
    pub static ref EVENT_HANDLERS_IN_FLIGHT: IntGaugeVec = IntGaugeVec::new(
        Opts::new("event_handlers_in_flight", "Handlers currently executing per topic"),
        &["topic"]
    ).expect("metric creation failed");

    /// Messages refused for lack of a concurrency slot
    pub static ref EVENT_CAPACITY_EXCEEDED: CounterVec = CounterVec::new(
        Opts::new("event_capacity_exceeded_total", "Messages refused at the concurrency limit"),
        &["topic"]
    ).expect("metric creation failed");

    /// Handler execution time
    pub static ref EVENT_HANDLER_DURATION: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "event_handler_duration_seconds",
            "Time spent in topic handlers"
        ).buckets(exponential_buckets(0.001, 2.0, 15).expect("valid buckets")),
        &["topic", "outcome"]  // outcome: success/error/panic
    ).expect("metric creation failed");

    // =========================================================================
    // WEBHOOK METRICS
    // =========================================================================

    /// Webhook requests by response status
    pub static ref WEBHOOK_REQUESTS: CounterVec = CounterVec::new(
        Opts::new("webhook_requests_total", "Webhook requests by source and status"),
        &["source", "status"]
    ).expect("metric creation failed");

    /// Live idempotency keys dropped because the store was full
    pub static ref WEBHOOK_IDEMPOTENCY_EVICTIONS: IntCounter = IntCounter::new(
        "webhook_idempotency_evictions_total",
        "Live idempotency keys evicted at capacity; a retried delivery may be forwarded again"
    ).expect("metric creation failed");
}

/// Handle proving the collectors are registered.
#[derive(Debug, Clone)]
pub struct MetricsHandle {
    registered: usize,
}

impl MetricsHandle {
    /// Number of collectors newly registered by this call.
    #[must_use]
    pub fn registered(&self) -> usize {
        self.registered
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; already registered collectors are skipped.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Publish
        Box::new(EVENT_PUBLISH_TOTAL.clone()),
        Box::new(EVENT_PUBLISH_DURATION.clone()),
        Box::new(EVENT_SCHEMA_VALIDATIONS.clone()),
        // Consume
        Box::new(EVENT_CONSUME_TOTAL.clone()),
        Box::new(EVENT_REDELIVERIES.clone()),
        Box::new(EVENT_DEAD_LETTERS.clone()),
        Box::new(EVENT_HANDLERS_IN_FLIGHT.clone()),
        Box::new(EVENT_CAPACITY_EXCEEDED.clone()),
        Box::new(EVENT_HANDLER_DURATION.clone()),
        // Webhooks
        Box::new(WEBHOOK_REQUESTS.clone()),
        Box::new(WEBHOOK_IDEMPOTENCY_EVICTIONS.clone()),
    ];

    let mut registered = 0;
    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) => registered += 1,
            Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle { registered })
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

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
