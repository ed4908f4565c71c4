use http::uri::{Authority, InvalidUri, PathAndQuery, Scheme, Uri};
use std::{fmt, num::NonZeroU16};

/// The destination of a routing rule: a plaintext HTTP service address.
///
/// The host and port are validated when the URL is built so that request
/// dispatch never has to handle a malformed address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendUrl {
    scheme: Scheme,
    authority: Authority,
    port: NonZeroU16,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidBackend {
    #[error("backend host must not be empty")]
    EmptyHost,

    #[error("backend port must not be zero")]
    ZeroPort,

    #[error("invalid backend address {addr}")]
    Authority {
        addr: String,
        #[source]
        source: InvalidUri,
    },

    #[error("invalid backend host {0}")]
    Host(String),

    #[error("service {service} does not declare a port named {port}")]
    UnknownPort { service: String, port: String },
}

// === impl BackendUrl ===

impl BackendUrl {
    pub fn http(host: &str, port: u16) -> Result<Self, InvalidBackend> {
        if host.is_empty() {
            return Err(InvalidBackend::EmptyHost);
        }
        let port = NonZeroU16::new(port).ok_or(InvalidBackend::ZeroPort)?;

        let addr = format!("{host}:{port}");
        let authority = match addr.parse::<Authority>() {
            Ok(authority) if authority.host() == host => authority,
            Ok(_) => return Err(InvalidBackend::Host(host.to_string())),
            Err(source) => return Err(InvalidBackend::Authority { addr, source }),
        };

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
            port,
        })
    }

    pub fn scheme(&self) -> &Scheme {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        self.authority.host()
    }

    pub fn port(&self) -> NonZeroU16 {
        self.port
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Builds an absolute request URI for this backend, preserving the
    /// request's path and query.
    pub fn uri(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, http::Error> {
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl fmt::Display for BackendUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}
