//! The ingress data plane.
//!
//! A [`Server`] holds the active [`RoutingTable`] behind an atomically
//! swappable reference. Each call to [`Server::update`] publishes a new
//! table built from a [`Payload`]; readers load the table once per request
//! or handshake and never observe a partially built table.
//!
//! [`RoutingTable`]: linkerd_ingress_core::RoutingTable
//! [`Payload`]: linkerd_ingress_core::Payload

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod gate;
mod metrics;
mod proxy;
mod server;
mod tls;


pub use self::{
    gate::{Cancelled, Gate},
    metrics::ProxyMetrics,
    proxy::ProxyError,
    server::{Config, Server, BAD_GATEWAY_BODY, NOT_FOUND_BODY},
};

/// The body type of proxied requests and responses.
pub type ProxyBody = http_body_util::combinators::UnsyncBoxBody<bytes::Bytes, hyper::Error>;
