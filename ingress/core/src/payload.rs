use crate::{Certificate, InvalidBackend, DEFAULT_SERVICE_PORT};
use ahash::AHashMap as HashMap;
use linkerd_ingress_k8s_api::{self as k8s, BackendRef, PortRef};
use std::sync::Arc;

/// The named ports of a single service.
///
/// Unnamed ports are recorded under the empty name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServicePorts(HashMap<String, u16>);

/// An `Ingress` along with the ports of every service it references.
///
/// Port maps are resolved for each reconciliation and scoped to the ingress,
/// so that a stale service definition never outlives the payload it was read
/// into.
#[derive(Clone, Debug)]
pub struct IngressPayload {
    pub ingress: Arc<k8s::Ingress>,
    pub service_ports: HashMap<String, ServicePorts>,
}

/// A complete snapshot of the cluster state needed for routing.
#[derive(Clone, Debug, Default)]
pub struct Payload {
    pub ingresses: Vec<IngressPayload>,

    /// Certificates keyed by the secret they were loaded from.
    pub tls_certificates: HashMap<SecretRef, Certificate>,
}

/// Identifies a secret by namespace and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
}

// === impl ServicePorts ===

impl ServicePorts {
    pub fn from_service(service: &k8s::Service) -> Self {
        let ports = service
            .spec
            .iter()
            .flat_map(|spec| spec.ports.iter().flatten())
            .filter_map(|port| {
                let number = u16::try_from(port.port).ok().filter(|&p| p != 0)?;
                Some((port.name.clone().unwrap_or_default(), number))
            })
            .collect();
        Self(ports)
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, u16)> for ServicePorts {
    fn from_iter<T: IntoIterator<Item = (String, u16)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === impl SecretRef ===

impl SecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl IngressPayload ===

impl IngressPayload {
    pub fn new(ingress: Arc<k8s::Ingress>) -> Self {
        Self {
            ingress,
            service_ports: HashMap::default(),
        }
    }

    /// Resolves the numeric port for a backend.
    ///
    /// Numbered ports are used as-is. Named ports are looked up in the
    /// backend service's port map; when the service itself could not be
    /// resolved, the default HTTP port is assumed.
    pub fn resolve_port(&self, backend: &BackendRef) -> Result<u16, InvalidBackend> {
        let name = match &backend.port {
            PortRef::Number(number) => return Ok(number.get()),
            PortRef::Name(name) => name,
        };

        match self.service_ports.get(&backend.service) {
            Some(ports) => ports.get(name).ok_or_else(|| InvalidBackend::UnknownPort {
                service: backend.service.clone(),
                port: name.clone(),
            }),
            None => Ok(DEFAULT_SERVICE_PORT),
        }
    }
}
