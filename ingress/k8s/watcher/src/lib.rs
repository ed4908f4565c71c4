//! Watches `Ingress`, `Service` and `Secret` resources and produces a
//! [`Payload`] each time the cluster state settles.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod debounce;
mod metrics;
mod notify;
pub mod reconcile;
mod store;


pub use self::{
    metrics::WatcherMetrics,
    notify::{Notifying, Trigger},
    store::{Lister, SharedStore, Store},
};

use futures::prelude::*;
use linkerd_ingress_core::Payload;
use linkerd_ingress_k8s_api::{self as k8s, watcher};
use tokio::time::Duration;
use tracing::{debug, info, info_span, Instrument};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(1);

pub struct Watcher<F> {
    store: SharedStore,
    trigger: Trigger,
    debounce: Duration,
    metrics: WatcherMetrics,
    on_change: F,
}

// === impl Watcher ===

impl<F> Watcher<F>
where
    F: Fn(Payload) + Send + Sync + 'static,
{
    /// Creates a watcher that invokes `on_change` with each new payload.
    pub fn new(on_change: F) -> Self {
        Self {
            store: Store::shared(),
            trigger: Trigger::default(),
            debounce: DEFAULT_DEBOUNCE,
            metrics: WatcherMetrics::default(),
            on_change,
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_metrics(mut self, metrics: WatcherMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    /// Indexes the given watch streams and reconciles after every quiet
    /// period.
    ///
    /// Completes once all three streams have ended, or fails if any of the
    /// indexing tasks fails.
    pub async fn run<I, S, C>(self, ingresses: I, services: S, secrets: C) -> anyhow::Result<()>
    where
        I: Stream<Item = watcher::Event<k8s::Ingress>> + Send + 'static,
        S: Stream<Item = watcher::Event<k8s::Service>> + Send + 'static,
        C: Stream<Item = watcher::Event<k8s::Secret>> + Send + 'static,
    {
        let index = Notifying::new(self.store.clone(), self.trigger.clone()).shared();
        let ingresses = tokio::spawn(
            kubert::index::namespaced(index.clone(), ingresses).instrument(info_span!("ingresses")),
        );
        let services = tokio::spawn(
            kubert::index::namespaced(index.clone(), services).instrument(info_span!("services")),
        );
        let secrets = tokio::spawn(
            kubert::index::namespaced(index, secrets).instrument(info_span!("secrets")),
        );

        let reconcile = debounce::debounce(&self.trigger, self.debounce, || self.reconcile());
        tokio::select! {
            res = future::try_join3(ingresses, services, secrets) => {
                res?;
                info!("Watches completed");
                Ok(())
            }
            () = reconcile => Ok(()),
        }
    }

    fn reconcile(&self) {
        let payload = reconcile::payload(&*self.store.read());
        debug!(
            ingresses = payload.ingresses.len(),
            certificates = payload.tls_certificates.len(),
            "Reconciled"
        );
        self.metrics.record(payload.ingresses.len());
        (self.on_change)(payload);
    }
}
