//! Linkerd Ingress core types
//!
//! A [`Payload`] is a point-in-time snapshot of the cluster resources that the
//! ingress proxy routes with: every `Ingress`, the ports of the `Service`s it
//! references, and the certificates loaded from its TLS `Secret`s.
//!
//! A [`RoutingTable`] is compiled from a single payload and is never modified
//! afterwards. It answers two questions on the request path: which backend
//! serves a host and path, and which certificate to present for an SNI name.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod backend;
mod certificate;
mod payload;
pub mod routing_table;

pub use self::{
    backend::{BackendUrl, InvalidBackend},
    certificate::{Certificate, InvalidCertificate},
    payload::{IngressPayload, Payload, SecretRef, ServicePorts},
    routing_table::{NotFound, RoutingTable},
};

/// The port used for backends whose service could not be resolved.
pub const DEFAULT_SERVICE_PORT: u16 = 80;
