use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub matches_created_total: IntCounterVec,
    pub confirmations_total: IntCounterVec,
    pub confirmation_latency_seconds: HistogramVec,
    pub available_actors: IntGaugeVec,
    pub competing_rejected_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let matches_created_total = IntCounterVec::new(
            Opts::new(
                "matches_created_total",
                "Match creation requests by outcome (created/existing)",
            ),
            &["outcome"],
        )
        .expect("valid matches_created_total metric");

        let confirmations_total = IntCounterVec::new(
            Opts::new("confirmations_total", "Confirmation attempts by outcome"),
            &["outcome"],
        )
        .expect("valid confirmations_total metric");

        let confirmation_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "confirmation_latency_seconds",
                "Latency of the confirmation transaction in seconds",
            ),
            &["outcome"],
        )
        .expect("valid confirmation_latency_seconds metric");

        let available_actors = IntGaugeVec::new(
            Opts::new("available_actors", "Actors currently open for matching"),
            &["pool"],
        )
        .expect("valid available_actors metric");

        let competing_rejected_total = IntCounter::new(
            "competing_rejected_total",
            "Open proposals rejected because a competing one was accepted",
        )
        .expect("valid competing_rejected_total metric");

        registry
            .register(Box::new(matches_created_total.clone()))
            .expect("register matches_created_total");
        registry
            .register(Box::new(confirmations_total.clone()))
            .expect("register confirmations_total");
        registry
            .register(Box::new(confirmation_latency_seconds.clone()))
            .expect("register confirmation_latency_seconds");
        registry
            .register(Box::new(available_actors.clone()))
            .expect("register available_actors");
        registry
            .register(Box::new(competing_rejected_total.clone()))
            .expect("register competing_rejected_total");

        Self {
            registry,
            matches_created_total,
            confirmations_total,
            confirmation_latency_seconds,
            available_actors,
            competing_rejected_total,
        }
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
