//! Prometheus metrics for the schedule engine.

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};

/// Metrics owned by one scheduler instance.
///
/// Each instance has its own [`Registry`], so several schedulers (or tests)
/// can coexist in one process.
pub struct SchedulerMetrics {
    registry: Registry,
    ticks: IntCounterVec,
    resolutions: IntCounterVec,
    active_timers: IntGauge,
    pass_duration: Histogram,
}

impl SchedulerMetrics {
    /// Create and register every metric.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let ticks = IntCounterVec::new(
            Opts::new("schellar_ticks_total", "Timer ticks by outcome"),
            &["outcome"],
        )?;
        let resolutions = IntCounterVec::new(
            Opts::new(
                "schellar_reconciliations_total",
                "Reconciliation results per RUNNING schedule",
            ),
            &["resolution"],
        )?;
        let active_timers = IntGauge::new("schellar_active_timers", "Live schedule timers")?;
        let pass_duration = Histogram::with_opts(HistogramOpts::new(
            "schellar_reconciliation_pass_seconds",
            "Duration of one reconciliation pass",
        ))?;

        registry.register(Box::new(ticks.clone()))?;
        registry.register(Box::new(resolutions.clone()))?;
        registry.register(Box::new(active_timers.clone()))?;
        registry.register(Box::new(pass_duration.clone()))?;

        Ok(Self {
            registry,
            ticks,
            resolutions,
            active_timers,
            pass_duration,
        })
    }

    /// Count one tick outcome.
    pub fn record_tick(&self, outcome: &str) {
        self.ticks.with_label_values(&[outcome]).inc();
    }

    /// Count one reconciliation resolution.
    pub fn record_resolution(&self, resolution: &str) {
        self.resolutions.with_label_values(&[resolution]).inc();
    }

    /// Set the live timer count.
    pub fn set_active_timers(&self, count: usize) {
        self.active_timers.set(count as i64);
    }

    /// Record how long a reconciliation pass took.
    pub fn observe_pass(&self, seconds: f64) {
        self.pass_duration.observe(seconds);
    }

    /// Number of ticks recorded with the given outcome.
    pub fn tick_count(&self, outcome: &str) -> u64 {
        self.ticks.with_label_values(&[outcome]).get()
    }

    /// Render every metric in the Prometheus text format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
