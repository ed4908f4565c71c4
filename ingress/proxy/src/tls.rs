use arc_swap::ArcSwap;
use linkerd_ingress_core::RoutingTable;
use rustls::{
    server::{ClientHello, ResolvesServerCert},
    sign::CertifiedKey,
    ServerConfig,
};
use std::{fmt, sync::Arc};
use tracing::debug;

/// Selects a certificate by SNI from the active routing table.
///
/// Handshakes without a matching certificate fail; no default certificate is
/// ever presented.
pub(crate) struct CertResolver(Arc<ArcSwap<RoutingTable>>);

pub(crate) fn server_config(
    table: Arc<ArcSwap<RoutingTable>>,
) -> Result<Arc<ServerConfig>, rustls::Error> {
    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_cert_resolver(Arc::new(CertResolver(table)));
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

// === impl CertResolver ===

impl ResolvesServerCert for CertResolver {
    fn resolve(&self, hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let Some(sni) = hello.server_name() else {
            debug!("Client did not send SNI");
            return None;
        };
        match self.0.load().get_certificate(sni) {
            Ok(cert) => Some(cert.certified_key()),
            Err(error) => {
                debug!(%sni, %error);
                None
            }
        }
    }
}

impl fmt::Debug for CertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertResolver").finish_non_exhaustive()
    }
}
