use crate::{
    index::{self, graph, Store},
    k8s, lease, resolver, status,
};
use anyhow::{bail, Context, Result};
use clap::Parser;
use kube::runtime::watcher;
use prometheus_client::registry::Registry;
use tokio::{sync::mpsc, time::Duration};
use tracing::{info_span, Instrument};

// How often the status index re-emits records that could not be enqueued and
// checks whether the write lease changed hands.
const RECONCILIATION_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[clap(name = "ingress", about = "An ingress routing resource controller")]
pub struct Args {
    #[clap(
        long,
        default_value = "ingress=info,warn",
        env = "INGRESS_CONTROLLER_LOG"
    )]
    log_level: kubert::LogFilter,

    #[clap(long, default_value = "plain")]
    log_format: kubert::LogFormat,

    #[clap(flatten)]
    client: kubert::ClientArgs,

    #[clap(flatten)]
    admin: kubert::AdminArgs,

    #[clap(long, default_value = "ingress-controller")]
    controller_deployment_name: String,

    #[clap(long, default_value = "ingress-system")]
    controller_namespace: String,

    /// The maximum time to wait for a single status patch.
    #[clap(long, default_value = "5000")]
    patch_timeout_ms: u64,

    /// The number of status patches that may be waiting to be applied.
    #[clap(long, default_value = "10000")]
    status_queue_size: usize,

    /// The time to wait before retrying a failed status patch.
    #[clap(long, default_value = "1000")]
    status_retry_ms: u64,
}

impl Args {
    #[inline]
    pub async fn parse_and_run() -> Result<()> {
        Self::parse().run().await
    }

    pub async fn run(self) -> Result<()> {
        let Self {
            admin,
            client,
            log_level,
            log_format,
            controller_deployment_name,
            controller_namespace,
            patch_timeout_ms,
            status_queue_size,
            status_retry_ms,
        } = self;

        let store = Store::shared();

        let mut prom = <Registry>::default();
        let indexed =
            index::IndexMetrics::register(store.clone(), prom.sub_registry_with_prefix("store"))
                .shared();
        let resolve_metrics =
            index::ResolveMetrics::register(prom.sub_registry_with_prefix("resolver"));
        let resource_status = prom.sub_registry_with_prefix("resource_status");
        let status_metrics = status::ControllerMetrics::register(resource_status);
        let status_index_metrics = status::IndexMetrics::register(resource_status);
        let rt_metrics = kubert::RuntimeMetrics::register(prom.sub_registry_with_prefix("kube"));

        let mut runtime = kubert::Runtime::builder()
            .with_log(log_level, log_format)
            .with_metrics(rt_metrics)
            .with_admin(admin.into_builder().with_prometheus(prom))
            .with_client(client)
            .build()
            .await?;

        let hostname =
            std::env::var("HOSTNAME").context("the HOSTNAME environment variable must be set")?;

        let claims = lease::init(
            &runtime,
            &controller_namespace,
            &controller_deployment_name,
            &hostname,
        )
        .await?;

        let (updates_tx, updates_rx) = mpsc::channel(status_queue_size);
        let status_index = status::Index::shared(
            hostname.clone(),
            claims.clone(),
            updates_tx,
            status_index_metrics,
        );

        // Spawn resource watches.

        let virtual_hosts = runtime.watch_all::<k8s::VirtualHost>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexed.clone(), virtual_hosts)
                .instrument(info_span!("virtualhosts")),
        );

        let route_fragments = runtime.watch_all::<k8s::RouteFragment>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexed.clone(), route_fragments)
                .instrument(info_span!("routefragments")),
        );

        let listeners = runtime.watch_all::<k8s::Listener>(watcher::Config::default());
        tokio::spawn(
            kubert::index::namespaced(indexed, listeners).instrument(info_span!("listeners")),
        );

        // Spawn the resolution loop and the graph's consumers.
        let (publisher, reader) = graph::channel();
        tokio::spawn(
            resolver::run(store, status_index.clone(), publisher, resolve_metrics)
                .instrument(info_span!("resolver")),
        );
        tokio::spawn(resolver::log_graphs(reader).instrument(info_span!("graph")));

        tokio::spawn(
            status::Index::run(status_index, RECONCILIATION_PERIOD)
                .instrument(info_span!("status_index")),
        );

        let status_controller = status::Controller::new(
            claims,
            runtime.client(),
            hostname,
            updates_rx,
            Duration::from_millis(patch_timeout_ms),
            Duration::from_millis(status_retry_ms),
            status_metrics,
        );
        tokio::spawn(
            status_controller
                .run()
                .instrument(info_span!("status_controller")),
        );

        // Block the main thread on the shutdown signal. Once it fires, wait for
        // the background tasks to complete before exiting.
        if runtime.run().await.is_err() {
            bail!("Aborted");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let args = Args::try_parse_from(["ingress"]).expect("defaults must parse");
        assert_eq!(args.controller_namespace, "ingress-system");
        assert_eq!(args.controller_deployment_name, "ingress-controller");
        assert_eq!(args.patch_timeout_ms, 5000);
        assert_eq!(args.status_queue_size, 10000);
        assert_eq!(args.status_retry_ms, 1000);
    }

    #[test]
    fn overrides() {
        let args = Args::try_parse_from([
            "ingress",
            "--controller-namespace=edge",
            "--patch-timeout-ms=250",
            "--status-queue-size=16",
        ])
        .expect("arguments must parse");
        assert_eq!(args.controller_namespace, "edge");
        assert_eq!(args.patch_timeout_ms, 250);
        assert_eq!(args.status_queue_size, 16);
    }
}
