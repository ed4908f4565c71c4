use crate::ProxyBody;
use http::{
    header::{self, HeaderMap, HeaderName, HeaderValue},
    Request, Response, StatusCode, Version,
};
use http_body_util::BodyExt;
use hyper::upgrade::OnUpgrade;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
};
use linkerd_ingress_core::BackendUrl;
use std::{net::IpAddr, time::Duration};
use tracing::debug;

pub(crate) type HttpClient = Client<HttpConnector, ProxyBody>;

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

const HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid backend request: {0}")]
    Request(#[from] http::Error),

    #[error(transparent)]
    Backend(#[from] hyper_util::client::legacy::Error),
}

pub(crate) fn client(connect_timeout: Duration) -> HttpClient {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(connect_timeout));
    connector.set_nodelay(true);
    Client::builder(TokioExecutor::new()).build(connector)
}

/// Forwards a request to a backend and returns the backend's response.
///
/// The request is sent over HTTP/1.1 with its original host. When the
/// backend accepts a protocol upgrade, the client and backend connections
/// are joined in a background task.
pub(crate) async fn forward(
    client: &HttpClient,
    backend: &BackendUrl,
    mut req: Request<ProxyBody>,
    client_ip: IpAddr,
) -> Result<Response<ProxyBody>, ProxyError> {
    let upgrade = upgrade_protocol(req.headers())
        .map(|protocol| (protocol, hyper::upgrade::on(&mut req)));

    let (mut parts, body) = req.into_parts();
    let host = parts.headers.get(header::HOST).cloned().or_else(|| {
        let authority = parts.uri.authority()?;
        HeaderValue::from_str(authority.as_str()).ok()
    });

    strip_hop_by_hop(&mut parts.headers);
    if let Some(host) = host {
        parts.headers.insert(header::HOST, host);
    }
    append_forwarded_for(&mut parts.headers, client_ip);

    let client_upgrade = match upgrade {
        Some((protocol, on_upgrade)) => {
            parts
                .headers
                .insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
            parts.headers.insert(header::UPGRADE, protocol);
            Some(on_upgrade)
        }
        None => None,
    };

    parts.uri = backend.uri(parts.uri.path_and_query())?;
    parts.version = Version::HTTP_11;

    let mut rsp = client.request(Request::from_parts(parts, body)).await?;

    if rsp.status() == StatusCode::SWITCHING_PROTOCOLS {
        if let Some(client_upgrade) = client_upgrade {
            let backend_upgrade = hyper::upgrade::on(&mut rsp);
            tokio::spawn(join_upgrades(client_upgrade, backend_upgrade));
        }
        return Ok(rsp.map(BodyExt::boxed_unsync));
    }

    strip_hop_by_hop(rsp.headers_mut());
    Ok(rsp.map(BodyExt::boxed_unsync))
}

async fn join_upgrades(client: OnUpgrade, backend: OnUpgrade) {
    let (client, backend) = match tokio::try_join!(client, backend) {
        Ok(upgraded) => upgraded,
        Err(error) => {
            debug!(%error, "Upgrade failed");
            return;
        }
    };
    let mut client = TokioIo::new(client);
    let mut backend = TokioIo::new(backend);
    match tokio::io::copy_bidirectional(&mut client, &mut backend).await {
        Ok((sent, received)) => debug!(sent, received, "Upgraded connection closed"),
        Err(error) => debug!(%error, "Upgraded connection failed"),
    }
}

/// Returns the requested upgrade protocol, if the client asked for one.
fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    let upgrade = connection_tokens(headers).any(|t| t.eq_ignore_ascii_case("upgrade"));
    if upgrade {
        headers.get(header::UPGRADE).cloned()
    } else {
        None
    }
}

fn connection_tokens(headers: &HeaderMap) -> impl Iterator<Item = &str> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let named = connection_tokens(headers)
        .filter_map(|t| HeaderName::from_bytes(t.as_bytes()).ok())
        .collect::<Vec<_>>();
    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
}

fn append_forwarded_for(headers: &mut HeaderMap, client_ip: IpAddr) {
    let prior = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>();
    let value = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {client_ip}", prior.join(", "))
    };
    match HeaderValue::try_from(value) {
        Ok(value) => {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }
        Err(error) => debug!(%error, "Invalid x-forwarded-for header"),
    }
}
