use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct WatcherMetrics {
    reconciliations: Counter,
    ingresses: Gauge,
}

impl WatcherMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let reconciliations = Counter::default();
        reg.register(
            "reconciliations",
            "Count of reconciliations that produced a payload",
            reconciliations.clone(),
        );

        let ingresses = Gauge::default();
        reg.register(
            "ingresses",
            "The number of ingresses in the most recent payload",
            ingresses.clone(),
        );

        Self {
            reconciliations,
            ingresses,
        }
    }

    pub(crate) fn record(&self, ingresses: usize) {
        self.reconciliations.inc();
        self.ingresses.set(ingresses as i64);
    }
}
