use ahash::AHashMap as HashMap;
use kubert::index::IndexNamespacedResource;
use linkerd_ingress_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::sync::Arc;

pub type SharedStore = Arc<RwLock<Store>>;

/// Lists the cluster resources that a reconciliation reads.
pub trait Lister {
    /// Returns all ingresses, ordered by namespace and then name.
    fn ingresses(&self) -> Vec<Arc<k8s::Ingress>>;

    fn service(&self, namespace: &str, name: &str) -> Option<Arc<k8s::Service>>;

    fn secret(&self, namespace: &str, name: &str) -> Option<Arc<k8s::Secret>>;
}

/// Holds the latest observed state of every watched resource.
#[derive(Debug, Default)]
pub struct Store {
    ingresses: ByNamespace<k8s::Ingress>,
    services: ByNamespace<k8s::Service>,
    secrets: ByNamespace<k8s::Secret>,
}

#[derive(Debug)]
struct ByNamespace<T>(HashMap<String, HashMap<String, Arc<T>>>);

// === impl Store ===

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn ingresses_len(&self) -> usize {
        self.ingresses.len()
    }
}

impl Lister for Store {
    fn ingresses(&self) -> Vec<Arc<k8s::Ingress>> {
        let mut ingresses = self
            .ingresses
            .0
            .iter()
            .flat_map(|(ns, by_name)| by_name.iter().map(move |(name, i)| (ns, name, i)))
            .collect::<Vec<_>>();
        ingresses.sort_unstable_by(|(ans, aname, _), (bns, bname, _)| {
            ans.cmp(bns).then_with(|| aname.cmp(bname))
        });
        ingresses.into_iter().map(|(_, _, i)| i.clone()).collect()
    }

    fn service(&self, namespace: &str, name: &str) -> Option<Arc<k8s::Service>> {
        self.services.get(namespace, name)
    }

    fn secret(&self, namespace: &str, name: &str) -> Option<Arc<k8s::Secret>> {
        self.secrets.get(namespace, name)
    }
}

impl IndexNamespacedResource<k8s::Ingress> for Store {
    fn apply(&mut self, ingress: k8s::Ingress) {
        self.ingresses.apply(ingress);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.ingresses.delete(&namespace, &name);
    }
}

impl IndexNamespacedResource<k8s::Service> for Store {
    fn apply(&mut self, service: k8s::Service) {
        self.services.apply(service);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.services.delete(&namespace, &name);
    }
}

impl IndexNamespacedResource<k8s::Secret> for Store {
    fn apply(&mut self, secret: k8s::Secret) {
        self.secrets.apply(secret);
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.secrets.delete(&namespace, &name);
    }
}

// === impl ByNamespace ===

impl<T> Default for ByNamespace<T> {
    fn default() -> Self {
        Self(HashMap::default())
    }
}

impl<T: ResourceExt> ByNamespace<T> {
    fn apply(&mut self, resource: T) {
        let Some(ns) = resource.namespace() else {
            tracing::debug!(name = %resource.name_any(), "Ignoring resource without a namespace");
            return;
        };
        let name = resource.name_any();
        self.0
            .entry(ns)
            .or_default()
            .insert(name, Arc::new(resource));
    }

    fn delete(&mut self, namespace: &str, name: &str) {
        if let Some(by_name) = self.0.get_mut(namespace) {
            by_name.remove(name);
            if by_name.is_empty() {
                self.0.remove(namespace);
            }
        }
    }

    fn get(&self, namespace: &str, name: &str) -> Option<Arc<T>> {
        self.0.get(namespace)?.get(name).cloned()
    }

    fn len(&self) -> usize {
        self.0.values().map(|by_name| by_name.len()).sum()
    }
}
