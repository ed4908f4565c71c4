use crate::{Ingress, IngressBackend, IngressRule, IngressTLS};
use std::{fmt, num::NonZeroU16};

/// A backend service reference, as declared by an `Ingress` backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BackendRef {
    pub service: String,
    pub port: PortRef,
}

/// Identifies a service port either by its number or by its name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PortRef {
    Number(NonZeroU16),
    Name(String),
}

// === impl BackendRef ===

impl BackendRef {
    /// Reads a service reference from an ingress backend.
    ///
    /// Returns `None` for resource backends and for service backends without a
    /// usable port.
    pub fn from_backend(backend: &IngressBackend) -> Option<Self> {
        let service = backend.service.as_ref()?;
        if service.name.is_empty() {
            return None;
        }

        let port = service.port.as_ref()?;
        let port = match (port.number, port.name.as_deref()) {
            (Some(number), _) => u16::try_from(number)
                .ok()
                .and_then(|n| NonZeroU16::try_from(n).ok())
                .map(PortRef::Number)?,
            (None, Some(name)) if !name.is_empty() => PortRef::Name(name.to_string()),
            _ => return None,
        };

        Some(Self {
            service: service.name.clone(),
            port,
        })
    }
}

impl fmt::Display for BackendRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service, self.port)
    }
}

// === impl PortRef ===

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt::Display::fmt(n, f),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// The ingress-wide backend, used by rules that do not declare HTTP paths.
pub fn default_backend(ingress: &Ingress) -> Option<&IngressBackend> {
    ingress.spec.as_ref()?.default_backend.as_ref()
}

pub fn rules(ingress: &Ingress) -> &[IngressRule] {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.rules.as_deref())
        .unwrap_or_default()
}

pub fn tls(ingress: &Ingress) -> &[IngressTLS] {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.tls.as_deref())
        .unwrap_or_default()
}

/// Iterates over every backend referenced by an ingress: the default backend
/// first, followed by each path backend in declaration order.
pub fn backends(ingress: &Ingress) -> impl Iterator<Item = &IngressBackend> {
    let paths = rules(ingress)
        .iter()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter().map(|path| &path.backend));
    default_backend(ingress).into_iter().chain(paths)
}
