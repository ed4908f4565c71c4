//! Compiles a [`Payload`] into the lookup structures used on the request path.
//!
//! Backends for a host are kept in the order in which they are declared by
//! the ingress rules, and the first backend whose path pattern matches a
//! request wins. Path patterns are regular expressions, compiled once when
//! the table is built. A rule that cannot be compiled is logged and skipped
//! without affecting the rest of the table.

use crate::{BackendUrl, Certificate, IngressPayload, InvalidBackend, Payload, SecretRef};
use ahash::AHashMap as HashMap;
use linkerd_ingress_k8s_api::{self as k8s, BackendRef, ResourceExt};
use regex::Regex;
use tracing::{debug, info, warn};

#[cfg(test)]
mod tests;

/// An immutable snapshot of routing state.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    /// Ordered backends for each virtual host.
    backends_by_host: HashMap<String, Vec<Backend>>,

    /// Candidate certificates for each virtual host, keyed by the (possibly
    /// wildcard) host name declared in the ingress' TLS configuration.
    certificates_by_host: HashMap<String, Vec<(String, Certificate)>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NotFound {
    #[error("backend not found")]
    Backend,

    #[error("certificate not found")]
    Certificate,
}

/// A single routing rule.
#[derive(Clone, Debug)]
struct Backend {
    /// When unset, the backend matches all paths.
    path: Option<Regex>,
    url: BackendUrl,
}

#[derive(Debug, thiserror::Error)]
enum InvalidRule {
    #[error("backend does not reference a service port")]
    NoServicePort,

    #[error(transparent)]
    Backend(#[from] InvalidBackend),

    #[error("invalid path regex")]
    Path(#[from] regex::Error),
}

// === impl RoutingTable ===

impl RoutingTable {
    pub fn new(payload: &Payload) -> Self {
        let mut table = Self::default();
        for ingress in &payload.ingresses {
            table.add_ingress(ingress, &payload.tls_certificates);
        }

        for (host, backends) in &table.backends_by_host {
            for backend in backends {
                debug!(
                    %host,
                    path = backend.path.as_ref().map(Regex::as_str).unwrap_or_default(),
                    backend = %backend.url,
                    "Routing table record"
                );
            }
        }
        info!(
            hosts = table.backends_by_host.len(),
            backends = table.backends_len(),
            certificates = table.certificates_by_host.values().map(Vec::len).sum::<usize>(),
            "Built routing table"
        );

        table
    }

    /// Finds the backend serving the given host and path.
    ///
    /// Any port suffix on `host` is ignored. Hosts are matched exactly.
    pub fn get_backend(&self, host: &str, path: &str) -> Result<&BackendUrl, NotFound> {
        let host = strip_port(host);
        self.backends_by_host
            .get(host)
            .and_then(|backends| backends.iter().find(|b| b.matches(path)))
            .map(|b| &b.url)
            .ok_or(NotFound::Backend)
    }

    /// Finds the certificate to present for an SNI name.
    pub fn get_certificate(&self, sni: &str) -> Result<&Certificate, NotFound> {
        self.certificates_by_host
            .get(sni)
            .and_then(|certs| {
                certs
                    .iter()
                    .find(|(cert_host, _)| matches_cert_host(sni, cert_host))
            })
            .map(|(_, cert)| cert)
            .ok_or(NotFound::Certificate)
    }

    /// The number of virtual hosts with at least one backend.
    pub fn hosts_len(&self) -> usize {
        self.backends_by_host.len()
    }

    pub fn backends_len(&self) -> usize {
        self.backends_by_host.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.backends_by_host.is_empty() && self.certificates_by_host.is_empty()
    }

    fn add_ingress(
        &mut self,
        ingress_payload: &IngressPayload,
        certificates: &HashMap<SecretRef, Certificate>,
    ) {
        let ingress = &*ingress_payload.ingress;
        let ns = ingress.namespace().unwrap_or_default();
        let rules = k8s::ingress::rules(ingress);

        // An ingress without rules only routes requests that have no host.
        if rules.is_empty() {
            if let Some(backend) = k8s::ingress::default_backend(ingress) {
                self.add_backend(ingress_payload, "", None, backend);
            }
            return;
        }

        // Every TLS host declared by the ingress is a candidate certificate
        // for each of its rules. Secrets are only read from the ingress'
        // own namespace.
        let tls_certs = k8s::ingress::tls(ingress)
            .iter()
            .filter_map(|tls| {
                let secret = SecretRef::new(ns.as_str(), tls.secret_name.as_deref()?);
                let cert = certificates.get(&secret)?;
                Some(tls.hosts.iter().flatten().map(move |h| (h, cert)))
            })
            .flatten()
            .collect::<Vec<_>>();

        for rule in rules {
            let host = rule.host.as_deref().unwrap_or_default();

            if !tls_certs.is_empty() {
                let certs = self
                    .certificates_by_host
                    .entry(host.to_string())
                    .or_default();
                for (cert_host, cert) in &tls_certs {
                    match certs.iter_mut().find(|(h, _)| h == *cert_host) {
                        Some((_, c)) => *c = (*cert).clone(),
                        None => certs.push((cert_host.to_string(), (*cert).clone())),
                    }
                }
            }

            match &rule.http {
                Some(http) => {
                    for path in &http.paths {
                        self.add_backend(
                            ingress_payload,
                            host,
                            path.path.as_deref(),
                            &path.backend,
                        );
                    }
                }
                None => {
                    if let Some(backend) = k8s::ingress::default_backend(ingress) {
                        self.add_backend(ingress_payload, host, None, backend);
                    }
                }
            }
        }
    }

    fn add_backend(
        &mut self,
        ingress_payload: &IngressPayload,
        host: &str,
        path: Option<&str>,
        backend: &k8s::IngressBackend,
    ) {
        match Backend::new(ingress_payload, path, backend) {
            Ok(backend) => self
                .backends_by_host
                .entry(host.to_string())
                .or_default()
                .push(backend),
            Err(error) => {
                let ingress = &ingress_payload.ingress;
                warn!(
                    ns = %ingress.namespace().unwrap_or_default(),
                    name = %ingress.name_any(),
                    %host,
                    path = path.unwrap_or_default(),
                    %error,
                    "Skipping invalid ingress rule"
                );
            }
        }
    }
}

// === impl Backend ===

impl Backend {
    fn new(
        ingress_payload: &IngressPayload,
        path: Option<&str>,
        backend: &k8s::IngressBackend,
    ) -> Result<Self, InvalidRule> {
        let backend = BackendRef::from_backend(backend).ok_or(InvalidRule::NoServicePort)?;
        let port = ingress_payload.resolve_port(&backend)?;
        let url = BackendUrl::http(&backend.service, port)?;
        let path = match path {
            Some(p) if !p.is_empty() => Some(Regex::new(p)?),
            _ => None,
        };
        Ok(Self { path, url })
    }

    fn matches(&self, path: &str) -> bool {
        match &self.path {
            Some(re) => re.is_match(path),
            None => true,
        }
    }
}

/// Strips a `:port` suffix from a host, leaving bracketed IPv6 literals
/// intact.
fn strip_port(host: &str) -> &str {
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.find(':') {
        Some(idx) if idx > 0 => &host[..idx],
        _ => host,
    }
}

/// Tests whether a certificate host (e.g. `*.example.com`) covers an SNI name.
///
/// Each leading `*.` in the certificate host consumes exactly one label of the
/// SNI name; the remainders must then be equal.
pub fn matches_cert_host(mut sni: &str, mut cert_host: &str) -> bool {
    while let Some(rest) = cert_host.strip_prefix("*.") {
        match sni.split_once('.') {
            Some((_, tail)) => sni = tail,
            None => return false,
        }
        cert_host = rest;
    }
    sni == cert_host
}
