use crate::store::Lister;
use linkerd_ingress_core::{Certificate, IngressPayload, Payload, SecretRef, ServicePorts};
use linkerd_ingress_k8s_api::{self as k8s, BackendRef, ResourceExt};
use tracing::{debug, warn};

/// Reads the current cluster state into a [`Payload`].
///
/// Services and secrets that can't be found, or that can't be used, are
/// logged and left out of the payload.
pub fn payload(lister: &impl Lister) -> Payload {
    let mut payload = Payload::default();

    for ingress in lister.ingresses() {
        let ns = ingress.namespace().unwrap_or_default();
        let name = ingress.name_any();
        let mut ingress_payload = IngressPayload::new(ingress.clone());

        for backend in k8s::ingress::backends(&ingress) {
            let Some(backend) = BackendRef::from_backend(backend) else {
                debug!(%ns, ingress = %name, "Ignoring backend without a service port");
                continue;
            };
            if ingress_payload.service_ports.contains_key(&backend.service) {
                continue;
            }
            match lister.service(&ns, &backend.service) {
                Some(service) => {
                    ingress_payload
                        .service_ports
                        .insert(backend.service, ServicePorts::from_service(&service));
                }
                None => {
                    warn!(%ns, ingress = %name, service = %backend.service, "Service not found");
                }
            }
        }

        for tls in k8s::ingress::tls(&ingress) {
            let Some(secret_name) = tls.secret_name.as_deref() else {
                continue;
            };
            let secret_ref = SecretRef::new(ns.as_str(), secret_name);
            if payload.tls_certificates.contains_key(&secret_ref) {
                continue;
            }
            let Some(secret) = lister.secret(&ns, secret_name) else {
                warn!(%ns, ingress = %name, secret = %secret_name, "Secret not found");
                continue;
            };
            let Some((cert, key)) = k8s::secret::tls_key_pair(&secret) else {
                warn!(
                    %ns,
                    ingress = %name,
                    secret = %secret_name,
                    "Secret does not contain a TLS key pair"
                );
                continue;
            };
            match Certificate::from_pem(secret_name, cert, key) {
                Ok(certificate) => {
                    payload.tls_certificates.insert(secret_ref, certificate);
                }
                Err(error) => {
                    warn!(
                        %ns,
                        ingress = %name,
                        secret = %secret_name,
                        %error,
                        "Invalid TLS secret"
                    );
                }
            }
        }

        payload.ingresses.push(ingress_payload);
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use k8s::{ObjectMeta, Resource};
    use kubert::index::IndexNamespacedResource;
    use linkerd_ingress_core::RoutingTable;
    use maplit::btreemap;

    fn meta(ns: &str, name: &str) -> ObjectMeta {
        ObjectMeta {
            namespace: Some(ns.to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    fn mk_ingress(name: &str, host: &str, service: &str, tls_secret: Option<&str>) -> k8s::Ingress {
        k8s::Ingress {
            metadata: meta("ns-0", name),
            spec: Some(k8s::IngressSpec {
                rules: Some(vec![k8s::IngressRule {
                    host: Some(host.to_string()),
                    http: Some(k8s::HTTPIngressRuleValue {
                        paths: vec![k8s::HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: k8s::IngressBackend {
                                service: Some(k8s::IngressServiceBackend {
                                    name: service.to_string(),
                                    port: Some(k8s::ServiceBackendPort {
                                        name: Some("http".to_string()),
                                        number: None,
                                    }),
                                }),
                                resource: None,
                            },
                        }],
                    }),
                }]),
                tls: tls_secret.map(|secret| {
                    vec![k8s::IngressTLS {
                        hosts: Some(vec![host.to_string()]),
                        secret_name: Some(secret.to_string()),
                    }]
                }),
                ..Default::default()
            }),
            status: None,
        }
    }

    fn mk_service(name: &str, port: i32) -> k8s::Service {
        k8s::Service {
            metadata: meta("ns-0", name),
            spec: Some(k8s::ServiceSpec {
                ports: Some(vec![k8s::ServicePort {
                    name: Some("http".to_string()),
                    port,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn mk_tls_secret(name: &str, host: &str) -> k8s::Secret {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
        k8s::Secret {
            metadata: meta("ns-0", name),
            data: Some(btreemap! {
                k8s::secret::TLS_CERT_KEY.to_string() => k8s::ByteString(cert.pem().into_bytes()),
                k8s::secret::TLS_PRIVATE_KEY_KEY.to_string() =>
                    k8s::ByteString(key_pair.serialize_pem().into_bytes()),
            }),
            ..Default::default()
        }
    }

    fn in_ns<T: Resource>(mut resource: T, ns: &str) -> T {
        resource.meta_mut().namespace = Some(ns.to_string());
        resource
    }

    fn leaf_der(table: &RoutingTable, sni: &str) -> Vec<u8> {
        let key = table.get_certificate(sni).unwrap().certified_key();
        key.cert[0].to_vec()
    }

    #[test]
    fn joins_services_and_secrets() {
        let mut store = Store::default();
        store.apply(mk_ingress("web", "web.example.com", "web", Some("web-tls")));
        store.apply(mk_service("web", 8080));
        store.apply(mk_tls_secret("web-tls", "web.example.com"));

        let payload = payload(&store);
        assert_eq!(payload.ingresses.len(), 1);
        let ports = payload.ingresses[0].service_ports.get("web").unwrap();
        assert_eq!(ports.get("http"), Some(8080));
        let cert = payload.tls_certificates.get(&SecretRef::new("ns-0", "web-tls"));
        assert_eq!(cert.unwrap().name(), "web-tls");

        let table = RoutingTable::new(&payload);
        assert_eq!(
            table.get_backend("web.example.com", "/").unwrap().to_string(),
            "http://web:8080"
        );
        assert!(table.get_certificate("web.example.com").is_ok());
    }

    #[test]
    fn missing_resources_are_omitted() {
        let mut store = Store::default();
        store.apply(mk_ingress("a-broken", "broken.example.com", "gone", Some("gone-tls")));
        store.apply(mk_ingress("b-web", "web.example.com", "web", None));
        store.apply(mk_service("web", 8080));
        store.apply(k8s::Secret {
            metadata: meta("ns-0", "gone-tls"),
            ..Default::default()
        });

        let payload = payload(&store);
        assert_eq!(payload.ingresses.len(), 2);
        assert!(payload.ingresses[0].service_ports.is_empty());
        assert!(payload.tls_certificates.is_empty());

        // The healthy ingress stays routable.
        let table = RoutingTable::new(&payload);
        assert_eq!(
            table.get_backend("web.example.com", "/").unwrap().to_string(),
            "http://web:8080"
        );
        // Without its service, a named port falls back to the default.
        assert_eq!(
            table
                .get_backend("broken.example.com", "/")
                .unwrap()
                .to_string(),
            "http://gone:80"
        );
        assert!(table.get_certificate("broken.example.com").is_err());
    }

    #[test]
    fn secrets_are_scoped_to_the_ingress_namespace() {
        let mut store = Store::default();
        store.apply(in_ns(mk_ingress("web", "a.example.com", "web", Some("tls")), "ns-a"));
        store.apply(in_ns(mk_ingress("web", "b.example.com", "web", Some("tls")), "ns-b"));
        let secret_a = in_ns(mk_tls_secret("tls", "a.example.com"), "ns-a");
        let secret_b = in_ns(mk_tls_secret("tls", "b.example.com"), "ns-b");
        let der = |secret: &k8s::Secret| {
            let (cert, key) = k8s::secret::tls_key_pair(secret).unwrap();
            Certificate::from_pem("tls", cert, key).unwrap().certified_key().cert[0].to_vec()
        };
        let (der_a, der_b) = (der(&secret_a), der(&secret_b));
        store.apply(secret_a);
        store.apply(secret_b);

        let payload = payload(&store);
        assert_eq!(payload.tls_certificates.len(), 2);

        let table = RoutingTable::new(&payload);
        assert_eq!(leaf_der(&table, "a.example.com"), der_a);
        assert_eq!(leaf_der(&table, "b.example.com"), der_b);
    }
}
