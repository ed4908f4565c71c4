use super::*;
use crate::{SecretRef, ServicePorts};
use k8s::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, IngressTLS, ObjectMeta, ServiceBackendPort,
};
use std::sync::Arc;

fn mk_backend(service: &str, port: i32) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: Some(port),
                name: None,
            }),
        }),
        resource: None,
    }
}

fn mk_named_backend(service: &str, port: &str) -> IngressBackend {
    IngressBackend {
        service: Some(IngressServiceBackend {
            name: service.to_string(),
            port: Some(ServiceBackendPort {
                number: None,
                name: Some(port.to_string()),
            }),
        }),
        resource: None,
    }
}

fn mk_rule(host: &str, paths: Vec<(Option<&str>, IngressBackend)>) -> IngressRule {
    IngressRule {
        host: Some(host.to_string()),
        http: Some(HTTPIngressRuleValue {
            paths: paths
                .into_iter()
                .map(|(path, backend)| HTTPIngressPath {
                    path: path.map(Into::into),
                    path_type: "ImplementationSpecific".to_string(),
                    backend,
                })
                .collect(),
        }),
    }
}

fn mk_ingress(name: &str, spec: IngressSpec) -> IngressPayload {
    IngressPayload::new(Arc::new(Ingress {
        metadata: ObjectMeta {
            namespace: Some("ns-0".to_string()),
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(spec),
        status: None,
    }))
}

fn mk_certificate(name: &str, host: &str) -> Certificate {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec![host.to_string()]).unwrap();
    Certificate::from_pem(
        name,
        cert.pem().as_bytes(),
        key_pair.serialize_pem().as_bytes(),
    )
    .unwrap()
}

fn mk_table(ingresses: Vec<IngressPayload>) -> RoutingTable {
    RoutingTable::new(&Payload {
        ingresses,
        tls_certificates: Default::default(),
    })
}

#[test]
fn empty_table_routes_nothing() {
    let table = RoutingTable::default();
    assert!(table.is_empty());
    assert_eq!(
        table.get_backend("example.com", "/").unwrap_err(),
        NotFound::Backend
    );
    assert_eq!(
        table.get_certificate("example.com").unwrap_err(),
        NotFound::Certificate
    );
}

#[test]
fn first_matching_path_wins() {
    let table = mk_table(vec![mk_ingress(
        "web",
        IngressSpec {
            rules: Some(vec![mk_rule(
                "example.com",
                vec![
                    (Some("^/api"), mk_backend("api", 8080)),
                    (Some("^/api/v2"), mk_backend("api-v2", 8080)),
                    (None, mk_backend("web", 80)),
                ],
            )]),
            ..Default::default()
        },
    )]);

    assert_eq!(table.hosts_len(), 1);
    assert_eq!(table.backends_len(), 3);
    assert_eq!(
        table
            .get_backend("example.com", "/api/v2/users")
            .unwrap()
            .to_string(),
        "http://api:8080"
    );
    assert_eq!(
        table.get_backend("example.com", "/index.html").unwrap().to_string(),
        "http://web:80"
    );
    assert_eq!(
        table.get_backend("other.com", "/").unwrap_err(),
        NotFound::Backend
    );
}

#[test]
fn paths_match_anywhere_unless_anchored() {
    let table = mk_table(vec![mk_ingress(
        "web",
        IngressSpec {
            rules: Some(vec![mk_rule(
                "example.com",
                vec![(Some("/static"), mk_backend("assets", 80))],
            )]),
            ..Default::default()
        },
    )]);

    assert!(table.get_backend("example.com", "/app/static/a.css").is_ok());
    assert_eq!(
        table.get_backend("example.com", "/app").unwrap_err(),
        NotFound::Backend
    );
}

#[test]
fn host_port_is_ignored() {
    let table = mk_table(vec![mk_ingress(
        "web",
        IngressSpec {
            rules: Some(vec![mk_rule(
                "example.com",
                vec![(Some(""), mk_backend("web", 80))],
            )]),
            ..Default::default()
        },
    )]);

    assert!(table.get_backend("example.com:8080", "/").is_ok());
    assert!(table.get_backend("example.com", "/").is_ok());
}

#[test]
fn strips_ports() {
    assert_eq!(strip_port("example.com:80"), "example.com");
    assert_eq!(strip_port("example.com"), "example.com");
    assert_eq!(strip_port("[::1]:8080"), "[::1]");
    assert_eq!(strip_port("[::1]"), "[::1]");
    assert_eq!(strip_port(":80"), ":80");
}

#[test]
fn invalid_rules_are_skipped() {
    let mut ingress = mk_ingress(
        "web",
        IngressSpec {
            rules: Some(vec![mk_rule(
                "example.com",
                vec![
                    (Some("^/(broken"), mk_backend("broken", 80)),
                    (Some("^/admin"), mk_named_backend("web", "admin")),
                    (Some("^/named"), mk_named_backend("web", "http")),
                    (None, mk_named_backend("missing", "http")),
                ],
            )]),
            ..Default::default()
        },
    );
    ingress.service_ports.insert(
        "web".to_string(),
        ServicePorts::from_iter([("http".to_string(), 8080)]),
    );
    let table = mk_table(vec![ingress]);

    // The malformed regex and the undeclared port name are dropped; the
    // remaining rules are kept in order.
    assert_eq!(table.backends_len(), 2);
    assert_eq!(
        table.get_backend("example.com", "/named").unwrap().to_string(),
        "http://web:8080"
    );
    // A service that could not be resolved falls back to the default port.
    assert_eq!(
        table.get_backend("example.com", "/(broken").unwrap().to_string(),
        "http://missing:80"
    );
}

#[test]
fn default_backend() {
    let table = mk_table(vec![
        mk_ingress(
            "no-rules",
            IngressSpec {
                default_backend: Some(mk_backend("fallback", 80)),
                ..Default::default()
            },
        ),
        mk_ingress(
            "no-http",
            IngressSpec {
                default_backend: Some(mk_backend("web", 8080)),
                rules: Some(vec![IngressRule {
                    host: Some("example.com".to_string()),
                    http: None,
                }]),
                ..Default::default()
            },
        ),
    ]);

    assert_eq!(
        table.get_backend("", "/").unwrap().to_string(),
        "http://fallback:80"
    );
    assert_eq!(
        table.get_backend("example.com", "/any").unwrap().to_string(),
        "http://web:8080"
    );
}

#[test]
fn wildcard_certificates() {
    assert!(matches_cert_host("a.example.com", "*.example.com"));
    assert!(!matches_cert_host("example.com", "*.example.com"));
    assert!(!matches_cert_host("a.b.example.com", "*.example.com"));
    assert!(matches_cert_host("a.b.example.com", "*.*.example.com"));
    assert!(matches_cert_host("example.com", "example.com"));
    assert!(!matches_cert_host("com", "*.com.example"));
}

#[test]
fn certificates_by_host() {
    let exact = mk_certificate("exact", "example.com");
    let wildcard = mk_certificate("wildcard", "*.example.com");
    let ingress = mk_ingress(
        "web",
        IngressSpec {
            rules: Some(vec![
                mk_rule("example.com", vec![(None, mk_backend("web", 80))]),
                mk_rule("www.example.com", vec![(None, mk_backend("web", 80))]),
            ]),
            tls: Some(vec![
                IngressTLS {
                    hosts: Some(vec!["example.com".to_string()]),
                    secret_name: Some("exact".to_string()),
                },
                IngressTLS {
                    hosts: Some(vec!["*.example.com".to_string()]),
                    secret_name: Some("wildcard".to_string()),
                },
                IngressTLS {
                    hosts: Some(vec!["missing.example.com".to_string()]),
                    secret_name: Some("missing".to_string()),
                },
            ]),
            ..Default::default()
        },
    );
    let table = RoutingTable::new(&Payload {
        ingresses: vec![ingress],
        tls_certificates: [
            (SecretRef::new("ns-0", "exact"), exact.clone()),
            (SecretRef::new("ns-0", "wildcard"), wildcard.clone()),
            // Secrets in other namespaces are never used.
            (SecretRef::new("ns-1", "missing"), mk_certificate("missing", "missing.example.com")),
        ]
        .into_iter()
        .collect(),
    });

    assert!(table.get_certificate("example.com").unwrap().ptr_eq(&exact));
    assert!(table
        .get_certificate("www.example.com")
        .unwrap()
        .ptr_eq(&wildcard));
    assert_eq!(
        table.get_certificate("missing.example.com").unwrap_err(),
        NotFound::Certificate
    );
    assert_eq!(
        table.get_certificate("other.com").unwrap_err(),
        NotFound::Certificate
    );
}
