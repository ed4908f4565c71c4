use crate::{
    gate::Gate,
    metrics::ProxyMetrics,
    proxy::{self, HttpClient},
    tls, ProxyBody,
};
use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use bytes::Bytes;
use http::{header, HeaderValue, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper_util::{
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use linkerd_ingress_core::{Payload, RoutingTable};
use std::{
    convert::Infallible,
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, debug_span, info, info_span, warn, Instrument};

pub const NOT_FOUND_BODY: &str = "upstream server not found";
pub const BAD_GATEWAY_BODY: &str = "bad gateway";

/// How long a listener pauses after failing to accept a connection.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub tls_port: u16,
    pub backend_connect_timeout: Duration,
}

/// Serves plaintext and TLS listeners, routing each request with the active
/// [`RoutingTable`].
pub struct Server {
    config: Config,
    table: Arc<ArcSwap<RoutingTable>>,
    ready: Gate,
    client: HttpClient,
    metrics: ProxyMetrics,
}

// === impl Config ===

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 80,
            tls_port: 443,
            backend_connect_timeout: Duration::from_secs(10),
        }
    }
}

// === impl Server ===

impl Server {
    pub fn new(config: Config) -> Self {
        let client = proxy::client(config.backend_connect_timeout);
        Self {
            config,
            table: Default::default(),
            ready: Gate::default(),
            client,
            metrics: ProxyMetrics::default(),
        }
    }

    pub fn with_metrics(mut self, metrics: ProxyMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set once the first routing table has been installed.
    pub fn ready(&self) -> &Gate {
        &self.ready
    }

    /// Returns the active routing table.
    pub fn table(&self) -> Arc<RoutingTable> {
        self.table.load_full()
    }

    /// Replaces the active routing table with one built from `payload`.
    ///
    /// Requests and handshakes already holding the previous table are
    /// unaffected.
    pub fn update(&self, payload: &Payload) {
        let table = RoutingTable::new(payload);
        self.table.store(Arc::new(table));
        self.metrics.table_updated();
        self.ready.set();
    }

    /// Waits for the first routing table and then serves both listeners until
    /// `drain` is signaled.
    ///
    /// If shutdown begins before a routing table is installed, returns
    /// without binding either listener.
    pub async fn run(self: Arc<Self>, drain: drain::Watch) -> Result<()> {
        if self.ready.wait(drain.clone()).await.is_err() {
            info!("Shutdown before routes were available");
            return Ok(());
        }

        let http = {
            let server = self.clone();
            let drain = drain.clone();
            async move {
                let addr = SocketAddr::new(server.config.host, server.config.port);
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind HTTP listener on {addr}"))?;
                server.serve_http(listener, drain).await
            }
            .instrument(info_span!("http"))
        };

        let https = {
            let server = self.clone();
            async move {
                let addr = SocketAddr::new(server.config.host, server.config.tls_port);
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind HTTPS listener on {addr}"))?;
                server.serve_https(listener, drain).await
            }
            .instrument(info_span!("https"))
        };

        let (http, https) = tokio::join!(
            async {
                let res = http.await;
                if let Err(error) = &res {
                    warn!(%error, "HTTP listener failed");
                }
                res
            },
            async {
                let res = https.await;
                if let Err(error) = &res {
                    warn!(%error, "HTTPS listener failed");
                }
                res
            },
        );
        http.and(https)
    }

    pub async fn serve_http(
        self: Arc<Self>,
        listener: TcpListener,
        drain: drain::Watch,
    ) -> Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "HTTP server listening");
        self.accept(listener, None, drain).await;
        Ok(())
    }

    pub async fn serve_https(
        self: Arc<Self>,
        listener: TcpListener,
        drain: drain::Watch,
    ) -> Result<()> {
        let config = tls::server_config(self.table.clone()).context("failed to configure TLS")?;
        let addr = listener.local_addr()?;
        info!(%addr, "HTTPS server listening");
        self.accept(listener, Some(TlsAcceptor::from(config)), drain)
            .await;
        Ok(())
    }

    /// Dispatches a single request.
    pub async fn handle(
        &self,
        req: Request<ProxyBody>,
        client_addr: SocketAddr,
    ) -> Response<ProxyBody> {
        let backend = {
            let host = request_host(&req);
            let path = req.uri().path();
            match self.table.load().get_backend(host, path) {
                Ok(backend) => backend.clone(),
                Err(error) => {
                    debug!(%host, %path, %error);
                    self.metrics.not_found();
                    return respond(StatusCode::NOT_FOUND, NOT_FOUND_BODY);
                }
            }
        };

        match proxy::forward(&self.client, &backend, req, client_addr.ip()).await {
            Ok(rsp) => {
                self.metrics.proxied();
                rsp
            }
            Err(error) => {
                warn!(%backend, %error, "Failed to proxy request");
                self.metrics.bad_gateway();
                respond(StatusCode::BAD_GATEWAY, BAD_GATEWAY_BODY)
            }
        }
    }

    async fn accept(
        self: Arc<Self>,
        listener: TcpListener,
        tls: Option<TlsAcceptor>,
        drain: drain::Watch,
    ) {
        let shutdown = drain.clone().signaled();
        tokio::pin!(shutdown);

        loop {
            let res = tokio::select! {
                res = listener.accept() => res,
                _ = &mut shutdown => {
                    debug!("Listener shutting down");
                    return;
                }
            };
            let (io, client_addr) = match res {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(%error, "Failed to accept connection");
                    if accept_backoff(&mut shutdown).await {
                        continue;
                    }
                    debug!("Listener shutting down");
                    return;
                }
            };

            let server = self.clone();
            let tls = tls.clone();
            let drain = drain.clone();
            tokio::spawn(
                async move {
                    match tls {
                        None => server.serve_connection(io, client_addr, drain).await,
                        Some(tls) => match tls.accept(io).await {
                            Ok(io) => server.serve_connection(io, client_addr, drain).await,
                            Err(error) => debug!(%error, "TLS handshake failed"),
                        },
                    }
                }
                .instrument(debug_span!("conn", client.addr = %client_addr)),
            );
        }
    }

    async fn serve_connection<I>(
        self: Arc<Self>,
        io: I,
        client_addr: SocketAddr,
        drain: drain::Watch,
    )
    where
        I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let svc = hyper::service::service_fn(move |req: Request<Incoming>| {
            let server = self.clone();
            async move {
                let req = req.map(BodyExt::boxed_unsync);
                Ok::<_, Infallible>(server.handle(req, client_addr).await)
            }
        });

        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(TokioIo::new(io), svc);
        tokio::pin!(conn);

        let res = tokio::select! {
            res = conn.as_mut() => res,
            release = drain.signaled() => {
                conn.as_mut().graceful_shutdown();
                release.release_after(conn).await
            }
        };
        if let Err(error) = res {
            debug!(%error, "Connection closed");
        }
    }
}

/// Pauses after an accept error. Errors such as `EMFILE` persist until other
/// connections close.
///
/// Returns false if shutdown was signaled while waiting.
async fn accept_backoff<F: Future + Unpin>(shutdown: &mut F) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(ACCEPT_ERROR_BACKOFF) => true,
        _ = shutdown => false,
    }
}

fn request_host<B>(req: &Request<B>) -> &str {
    req.headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| req.uri().authority().map(|a| a.as_str()))
        .unwrap_or_default()
}

fn respond(status: StatusCode, body: &'static str) -> Response<ProxyBody> {
    let body = Full::new(Bytes::from_static(body.as_bytes()))
        .map_err(|never| match never {})
        .boxed_unsync();
    let mut rsp = Response::new(body);
    *rsp.status_mut() = status;
    rsp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    rsp
}
