use crate::Secret;

/// The secret data key holding a PEM-encoded certificate chain.
pub const TLS_CERT_KEY: &str = "tls.crt";

/// The secret data key holding a PEM-encoded private key.
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// Reads the certificate chain and private key from a `kubernetes.io/tls`
/// style secret.
pub fn tls_key_pair(secret: &Secret) -> Option<(&[u8], &[u8])> {
    let data = secret.data.as_ref()?;
    let cert = data.get(TLS_CERT_KEY)?;
    let key = data.get(TLS_PRIVATE_KEY_KEY)?;
    Some((&cert.0, &key.0))
}
