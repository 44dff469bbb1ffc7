use std::time::Duration;

use prometheus::{
    Encoder, GaugeVec, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub transitions_total: IntCounterVec,
    pub transition_latency_seconds: HistogramVec,
    pub jobs_available: IntGauge,
    pub mirror_failures_total: IntCounter,
    pub driver_active_deliveries: GaugeVec,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let transitions_total = IntCounterVec::new(
            Opts::new("transitions_total", "Job transitions by kind and outcome"),
            &["transition", "outcome"],
        )
        .expect("valid transitions_total metric");

        let transition_latency_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "transition_latency_seconds",
                "Latency of job transitions in seconds",
            ),
            &["transition", "outcome"],
        )
        .expect("valid transition_latency_seconds metric");

        let jobs_available = IntGauge::new(
            "jobs_available",
            "Deliverable jobs currently in the live pool",
        )
        .expect("valid jobs_available metric");

        let mirror_failures_total = IntCounter::new(
            "mirror_failures_total",
            "Best-effort mirror writes to originating orders that failed",
        )
        .expect("valid mirror_failures_total metric");

        let driver_active_deliveries = GaugeVec::new(
            Opts::new("driver_active_deliveries", "Active deliveries per driver"),
            &["driver_id"],
        )
        .expect("valid driver_active_deliveries metric");

        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(transition_latency_seconds.clone()))
            .expect("register transition_latency_seconds");
        registry
            .register(Box::new(jobs_available.clone()))
            .expect("register jobs_available");
        registry
            .register(Box::new(mirror_failures_total.clone()))
            .expect("register mirror_failures_total");
        registry
            .register(Box::new(driver_active_deliveries.clone()))
            .expect("register driver_active_deliveries");

        Self {
            registry,
            transitions_total,
            transition_latency_seconds,
            jobs_available,
            mirror_failures_total,
            driver_active_deliveries,
        }
    }

    pub fn record_transition(&self, transition: &str, outcome: &str, elapsed: Duration) {
        self.transitions_total
            .with_label_values(&[transition, outcome])
            .inc();
        self.transition_latency_seconds
            .with_label_values(&[transition, outcome])
            .observe(elapsed.as_secs_f64());
    }

    pub fn set_jobs_available(&self, count: usize) {
        self.jobs_available.set(count as i64);
    }

    pub fn set_active_deliveries(&self, driver_id: &str, active: u32) {
        self.driver_active_deliveries
            .with_label_values(&[driver_id])
            .set(f64::from(active));
    }

    pub fn inc_mirror_failure(&self) {
        self.mirror_failures_total.inc();
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}
