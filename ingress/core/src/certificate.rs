use rustls::{crypto::ring::sign, sign::CertifiedKey};
use std::{fmt, io, sync::Arc};

/// A TLS key pair loaded from a secret.
#[derive(Clone)]
pub struct Certificate {
    name: Arc<str>,
    key: Arc<CertifiedKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidCertificate {
    #[error("invalid certificate chain")]
    Chain(#[source] io::Error),

    #[error("no certificates found")]
    NoCertificates,

    #[error("invalid private key")]
    PrivateKey(#[source] io::Error),

    #[error("no private key found")]
    NoPrivateKey,

    #[error("unsupported private key")]
    UnsupportedKey(#[source] rustls::Error),
}

// === impl Certificate ===

impl Certificate {
    /// Parses a PEM-encoded certificate chain and private key.
    pub fn from_pem(
        name: impl Into<Arc<str>>,
        cert_pem: &[u8],
        key_pem: &[u8],
    ) -> Result<Self, InvalidCertificate> {
        let chain = rustls_pemfile::certs(&mut &*cert_pem)
            .collect::<Result<Vec<_>, _>>()
            .map_err(InvalidCertificate::Chain)?;
        if chain.is_empty() {
            return Err(InvalidCertificate::NoCertificates);
        }

        let key = rustls_pemfile::private_key(&mut &*key_pem)
            .map_err(InvalidCertificate::PrivateKey)?
            .ok_or(InvalidCertificate::NoPrivateKey)?;
        let signer = sign::any_supported_type(&key).map_err(InvalidCertificate::UnsupportedKey)?;

        Ok(Self {
            name: name.into(),
            key: Arc::new(CertifiedKey::new(chain, signer)),
        })
    }

    /// The name of the secret this certificate was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn certified_key(&self) -> Arc<CertifiedKey> {
        self.key.clone()
    }

    /// Returns true if both values refer to the same loaded key pair.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.key, &other.key)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("name", &self.name)
            .field("chain_len", &self.key.cert.len())
            .finish()
    }
}
