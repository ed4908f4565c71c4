use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ProxyMetrics {
    requests: Family<RequestLabels, Counter>,
    table_updates: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct RequestLabels {
    outcome: &'static str,
}

impl ProxyMetrics {
    pub fn register(reg: &mut Registry) -> Self {
        let requests = Family::default();
        reg.register(
            "requests",
            "Count of requests handled by the proxy, by outcome",
            requests.clone(),
        );

        let table_updates = Counter::default();
        reg.register(
            "table_updates",
            "Count of routing tables installed",
            table_updates.clone(),
        );

        Self {
            requests,
            table_updates,
        }
    }

    pub(crate) fn proxied(&self) {
        self.request("proxied");
    }

    pub(crate) fn not_found(&self) {
        self.request("not_found");
    }

    pub(crate) fn bad_gateway(&self) {
        self.request("bad_gateway");
    }

    pub(crate) fn table_updated(&self) {
        self.table_updates.inc();
    }

    fn request(&self, outcome: &'static str) {
        self.requests.get_or_create(&RequestLabels { outcome }).inc();
    }
}
