use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes the debouncer.
///
/// Notifications are never lost: when nobody is waiting, a single pending
/// notification is retained until the next wait.
#[derive(Clone, Debug, Default)]
pub struct Trigger(Arc<Notify>);

/// An index that forwards updates to an inner index and then fires a
/// [`Trigger`].
#[derive(Debug)]
pub struct Notifying<I> {
    index: Arc<RwLock<I>>,
    trigger: Trigger,
}

// === impl Trigger ===

impl Trigger {
    pub fn notify(&self) {
        self.0.notify_one();
    }

    pub async fn notified(&self) {
        self.0.notified().await
    }
}

// === impl Notifying ===

impl<I> Notifying<I> {
    pub fn new(index: Arc<RwLock<I>>, trigger: Trigger) -> Self {
        Self { index, trigger }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }
}

impl<I, R> IndexNamespacedResource<R> for Notifying<I>
where
    I: IndexNamespacedResource<R>,
{
    fn apply(&mut self, resource: R) {
        self.index.write().apply(resource);
        self.trigger.notify();
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.index.write().delete(namespace, name);
        self.trigger.notify();
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        self.index.write().reset(resources, removed);
        self.trigger.notify();
    }
}
