#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use linkerd_ingress_core as core;
pub use linkerd_ingress_k8s_api as k8s;
pub use linkerd_ingress_k8s_watcher as watcher;
pub use linkerd_ingress_proxy as proxy;

mod args;

pub use self::args::Args;
