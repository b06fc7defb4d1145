use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub orders_created_total: IntCounter,
    pub order_transitions_total: IntCounterVec,
    pub distance_fallbacks_total: IntCounter,
    pub delivery_duration_seconds: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let orders_created_total = IntCounter::new("orders_created_total", "Total orders created")
            .expect("valid orders_created_total metric");

        let order_transitions_total = IntCounterVec::new(
            Opts::new(
                "order_transitions_total",
                "Order lifecycle transitions by event and outcome",
            ),
            &["event", "outcome"],
        )
        .expect("valid order_transitions_total metric");

        let distance_fallbacks_total = IntCounter::new(
            "distance_fallbacks_total",
            "Distance lookups that fell back to zero distance",
        )
        .expect("valid distance_fallbacks_total metric");

        let delivery_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "delivery_duration_seconds",
            "Time from pickup to confirmed delivery in seconds",
        ))
        .expect("valid delivery_duration_seconds metric");

        registry
            .register(Box::new(orders_created_total.clone()))
            .expect("register orders_created_total");
        registry
            .register(Box::new(order_transitions_total.clone()))
            .expect("register order_transitions_total");
        registry
            .register(Box::new(distance_fallbacks_total.clone()))
            .expect("register distance_fallbacks_total");
        registry
            .register(Box::new(delivery_duration_seconds.clone()))
            .expect("register delivery_duration_seconds");

        Self {
            registry,
            orders_created_total,
            order_transitions_total,
            distance_fallbacks_total,
            delivery_duration_seconds,
        }
    }

    pub fn record_transition(&self, event: &str, outcome: &str) {
        self.order_transitions_total
            .with_label_values(&[event, outcome])
            .inc();
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
