use crate::{
    core::Payload,
    k8s::{self, watcher},
    proxy::{self, ProxyMetrics, Server},
    watcher::{Watcher, WatcherMetrics},
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use futures::prelude::*;
use prometheus_client::registry::Registry;
use std::{net::IpAddr, sync::Arc};
use tokio::{task::JoinHandle, time::Duration};
use tracing::{info_span, warn, Instrument};

#[derive(Debug, Parser)]
#[clap(name = "ingress", about = "A Kubernetes ingress proxy")]
pub struct Args {
    #[clap(
        long,
        default_value = "linkerd=info,warn",
        env = "LINKERD_INGRESS_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    /// Address on which both proxy listeners bind.
    #[clap(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port of the plaintext HTTP listener.
    #[clap(long, default_value = "80")]
    port: u16,

    /// Port of the TLS listener.
    #[clap(long, default_value = "443")]
    tls_port: u16,

    /// Quiet period after a resource change before routes are rebuilt.
    #[clap(long, default_value = "1000")]
    debounce_ms: u64,

    #[clap(long, default_value = "10000")]
    backend_connect_timeout_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            log_level,
            log_format,
            client,
            admin,
            host,
            port,
            tls_port,
            debounce_ms,
            backend_connect_timeout_ms,
        } = self;

        // Kubernetes API connections use the process-wide crypto provider.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let mut prom = <Registry>::default();
        let watcher_metrics =
            WatcherMetrics::register(prom.sub_registry_with_prefix("ingress_watcher"));
        let proxy_metrics = ProxyMetrics::register(prom.sub_registry_with_prefix("ingress_proxy"));
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let server = Arc::new(
            Server::new(proxy::Config {
                host,
                port,
                tls_port,
                backend_connect_timeout: Duration::from_millis(backend_connect_timeout_ms),
            })
            .with_metrics(proxy_metrics),
        );

        // Spawn resource watches. Every change feeds the same debounced
        // reconciliation, which installs a new routing table on the server.
        let ingresses = runtime.watch_all::<k8s::Ingress>(watcher::Config::default());
        let services = runtime.watch_all::<k8s::Service>(watcher::Config::default());
        let secrets = runtime.watch_all::<k8s::Secret>(
            watcher::Config::default().fields("type=kubernetes.io/tls"),
        );
        let watcher = Watcher::new({
            let server = server.clone();
            move |payload: Payload| server.update(&payload)
        })
        .with_debounce(Duration::from_millis(debounce_ms))
        .with_metrics(watcher_metrics);
        let watcher = tokio::spawn(
            watcher
                .run(ingresses, services, secrets)
                .instrument(info_span!("watcher")),
        );

        // Serve proxy traffic once the first routing table is available.
        let proxy = tokio::spawn(
            server
                .run(runtime.shutdown_handle())
                .instrument(info_span!("proxy")),
        );

        supervise(runtime.run(), proxy, watcher).await
    }
}

/// Blocks on the runtime's shutdown signal.
///
/// A proxy that fails to start, or a watcher that fails, ends the process
/// without waiting for shutdown. Otherwise the runtime is awaited so that
/// background tasks complete before exiting.
async fn supervise<E>(
    run: impl Future<Output = Result<(), E>>,
    proxy: JoinHandle<Result<()>>,
    watcher: JoinHandle<Result<()>>,
) -> Result<()> {
    tokio::pin!(run);
    tokio::select! {
        res = &mut run => {
            if res.is_err() {
                bail!("Aborted");
            }
        }
        res = proxy => {
            res.context("proxy task failed")??;
            if run.await.is_err() {
                bail!("Aborted");
            }
        }
        res = watcher => {
            res.context("watcher task failed")?.context("watcher failed")?;
            warn!("Watches ended");
            if run.await.is_err() {
                bail!("Aborted");
            }
        }
    }

    Ok(())
}
