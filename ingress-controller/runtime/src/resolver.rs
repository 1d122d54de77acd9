use crate::{
    index::{graph, resolve, ResolveMetrics, Resolution, SharedStore},
    status,
};
use tokio::time;

/// Resolves the store whenever it changes, hands the outcomes to the status
/// index, and publishes the resulting graph.
///
/// Only one pass runs at a time. Changes observed while a pass runs are
/// coalesced into a single follow-up pass. The first pass waits for every
/// kind to be listed so that a partial view is never reported or published.
pub async fn run(
    store: SharedStore,
    status: status::SharedIndex,
    publisher: graph::Publisher,
    metrics: ResolveMetrics,
) {
    let mut changes = store.read().subscribe();
    while !store.read().is_synced() {
        if changes.changed().await.is_err() {
            tracing::debug!("Store closed");
            return;
        }
    }
    tracing::info!("Resources listed; resolving");

    loop {
        // Mark the current version as seen before taking the snapshot so that
        // any change after this point triggers another pass.
        changes.mark_unchanged();
        let snapshot = store.read().snapshot();

        let started = time::Instant::now();
        let Resolution { graph, outcomes } = resolve(&snapshot);
        metrics.observe(started, &graph);
        tracing::debug!(
            version = snapshot.version(),
            resources = snapshot.len(),
            findings = outcomes.findings.len(),
            "Resolved snapshot"
        );

        status.write().apply_outcomes(&outcomes);
        if publisher.publish(graph) {
            tracing::debug!(version = snapshot.version(), "Published routing graph");
        }

        if changes.changed().await.is_err() {
            tracing::debug!("Store closed");
            return;
        }
    }
}

/// Logs a summary of every graph published.
pub async fn log_graphs(mut reader: graph::Reader) {
    while let Some(graph) = reader.next().await {
        let routes = graph
            .virtual_hosts
            .iter()
            .map(|vh| vh.routes.len())
            .sum::<usize>();
        tracing::info!(
            virtual_hosts = graph.virtual_hosts.len(),
            routes,
            listeners = graph.listeners.len(),
            "Routing graph updated"
        );
    }
}
