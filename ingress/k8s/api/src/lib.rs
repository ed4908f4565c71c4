#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod ingress;
pub mod secret;

pub use self::ingress::{BackendRef, PortRef};
pub use k8s_openapi::{
    api::{
        self,
        core::v1::{Secret, Service, ServicePort, ServiceSpec},
        networking::v1::{
            HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
            IngressServiceBackend, IngressSpec, IngressTLS, ServiceBackendPort,
        },
    },
    ByteString,
};
pub use kube::{
    api::{ObjectMeta, Resource, ResourceExt},
    runtime::watcher,
};
