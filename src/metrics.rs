//! Metrics for disaggregation runs
//!
//! ## Table of Contents
//! - **DisaggMetrics**: Prometheus-backed counters and histograms
//! - **KernelTimer**: Measures kernel invocation latency
//!
//! Metrics are optional and never load-bearing: the engine works
//! identically with them disabled.

use crate::error::{DisaggError, Result};
use prometheus::{Counter, CounterVec, Histogram, HistogramOpts, Opts, Registry};

/// Core metrics for a disaggregation run
pub struct DisaggMetrics {
    registry: Registry,

    /// Units handed to the task substrate
    pub units_submitted: Counter,
    /// Units finished, labeled by status
    pub units_completed: CounterVec,
    /// Computation requests produced by the enumerator
    pub requests_enumerated: Counter,
    /// Results persisted for the first time
    pub results_created: Counter,
    /// Skipped combinations, labeled by reason
    pub combinations_skipped: CounterVec,
    /// Kernel invocation latency in seconds
    pub kernel_latency: Histogram,
    /// Realizations whose completion flag flipped
    pub realizations_completed: Counter,
}

impl DisaggMetrics {
    /// Create a new metrics instance
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let units_submitted =
            Counter::new("disagg_units_submitted_total", "Total units submitted")?;
        let units_completed = CounterVec::new(
            Opts::new("disagg_units_completed_total", "Total units completed"),
            &["status"],
        )?;
        let requests_enumerated = Counter::new(
            "disagg_requests_enumerated_total",
            "Total computation requests enumerated",
        )?;
        let results_created = Counter::new(
            "disagg_results_created_total",
            "Total disaggregation results persisted",
        )?;
        let combinations_skipped = CounterVec::new(
            Opts::new(
                "disagg_combinations_skipped_total",
                "Total skipped combinations",
            ),
            &["reason"],
        )?;
        let kernel_latency = Histogram::with_opts(
            HistogramOpts::new(
                "disagg_kernel_latency_seconds",
                "Disaggregation kernel latency",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0]),
        )?;
        let realizations_completed = Counter::new(
            "disagg_realizations_completed_total",
            "Total realizations completed",
        )?;

        registry.register(Box::new(units_submitted.clone()))?;
        registry.register(Box::new(units_completed.clone()))?;
        registry.register(Box::new(requests_enumerated.clone()))?;
        registry.register(Box::new(results_created.clone()))?;
        registry.register(Box::new(combinations_skipped.clone()))?;
        registry.register(Box::new(kernel_latency.clone()))?;
        registry.register(Box::new(realizations_completed.clone()))?;

        Ok(Self {
            registry,
            units_submitted,
            units_completed,
            requests_enumerated,
            results_created,
            combinations_skipped,
            kernel_latency,
            realizations_completed,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Record units handed to the substrate
    pub fn record_units_submitted(&self, n: u64) {
        self.units_submitted.inc_by(n as f64);
    }

    /// Record a finished unit
    pub fn record_unit_completed(&self, success: bool) {
        let status = if success { "success" } else { "failed" };
        self.units_completed.with_label_values(&[status]).inc();
    }

    /// Record enumerated requests
    pub fn record_requests(&self, n: u64) {
        self.requests_enumerated.inc_by(n as f64);
    }

    /// Record a newly persisted result
    pub fn record_result_created(&self) {
        self.results_created.inc();
    }

    /// Record all-zero-curve skips
    pub fn record_degenerate_skips(&self, n: u64) {
        self.combinations_skipped
            .with_label_values(&["degenerate_curve"])
            .inc_by(n as f64);
    }

    /// Record a no-contributing-ruptures skip
    pub fn record_no_rupture_skip(&self) {
        self.combinations_skipped
            .with_label_values(&["no_ruptures"])
            .inc();
    }

    /// Observe one kernel invocation's latency
    pub fn observe_kernel_seconds(&self, seconds: f64) {
        self.kernel_latency.observe(seconds);
    }

    /// Record a realization reaching completion
    pub fn record_realization_completed(&self) {
        self.realizations_completed.inc();
    }

    /// Gather all metrics as Prometheus text
    pub fn gather_text(&self) -> Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| DisaggError::metrics(format!("encode error: {}", e)))?;
        String::from_utf8(buffer).map_err(|e| DisaggError::metrics(format!("utf8 error: {}", e)))
    }
}

impl From<prometheus::Error> for DisaggError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

/// Timer for measuring kernel invocation duration
pub struct KernelTimer {
    start: std::time::Instant,
}

impl KernelTimer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }

    /// Stop and return elapsed seconds
    pub fn stop(self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
