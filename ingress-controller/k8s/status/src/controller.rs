use crate::{index::Update, metrics::ControllerMetrics};
use ingress_controller_core::{ResourceId, ResourceKind};
use ingress_controller_k8s_api::{self as k8s, NamespaceResourceScope};
use kubert::lease::Claim;
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, fmt, sync::Arc};
use tokio::{
    sync::{mpsc, watch},
    time,
};

/// The field manager that owns `status.validity` on routing resources.
pub const FIELD_MANAGER: &str = "ingress-controller";

/// Applies status patches produced by the [`Index`](crate::Index).
///
/// Patches are applied one at a time, each bounded by a timeout. A patch that
/// fails is retried after a delay unless a newer patch for the same resource
/// arrives first.
pub struct Controller {
    claims: watch::Receiver<Arc<Claim>>,
    client: k8s::Client,
    name: String,
    updates: mpsc::Receiver<Update>,
    patch_timeout: time::Duration,
    retry_delay: time::Duration,
    metrics: ControllerMetrics,
}

#[derive(Debug, Default)]
struct Retries {
    pending: BTreeMap<ResourceId, (time::Instant, Update)>,
}

impl Controller {
    pub fn new(
        claims: watch::Receiver<Arc<Claim>>,
        client: k8s::Client,
        name: impl ToString,
        updates: mpsc::Receiver<Update>,
        patch_timeout: time::Duration,
        retry_delay: time::Duration,
        metrics: ControllerMetrics,
    ) -> Self {
        Self {
            claims,
            client,
            name: name.to_string(),
            updates,
            patch_timeout,
            retry_delay,
            metrics,
        }
    }

    pub async fn run(mut self) {
        let mut retries = Retries::default();
        loop {
            let updates = tokio::select! {
                update = self.updates.recv() => match update {
                    Some(update) => {
                        retries.remove(&update.id);
                        vec![update]
                    }
                    None => {
                        tracing::debug!("Status update queue closed");
                        return;
                    }
                },
                () = retries.ready() => {
                    let due = retries.take_due(time::Instant::now());
                    for update in &due {
                        self.metrics.retried(update.id.kind);
                    }
                    due
                }
            };

            // The index emits every record again once this process acquires
            // the lease, so nothing needs to be kept while another process
            // holds it.
            if !self.claims.borrow().is_current_for(&self.name) {
                self.metrics.skipped(updates.len() + retries.len());
                retries.clear();
                continue;
            }

            for update in updates {
                if let Err(update) = self.patch(update).await {
                    retries.insert(update, time::Instant::now() + self.retry_delay);
                }
            }
        }
    }

    /// Applies a single patch, returning it if it should be retried.
    async fn patch(&self, update: Update) -> Result<(), Update> {
        let kind = update.id.kind;
        let res = match kind {
            ResourceKind::VirtualHost => self.patch_status::<k8s::VirtualHost>(&update).await,
            ResourceKind::RouteFragment => {
                self.patch_status::<k8s::RouteFragment>(&update).await
            }
            ResourceKind::Listener => self.patch_status::<k8s::Listener>(&update).await,
        };

        let id = &update.id;
        match res {
            Ok(Ok(())) => {
                tracing::debug!(%id, "Patched status");
                self.metrics.succeeded(kind);
                Ok(())
            }
            Ok(Err(k8s::Error::Api(error))) if error.code == 404 => {
                tracing::debug!(%id, "Resource was deleted before its status was patched");
                Ok(())
            }
            Ok(Err(error)) => {
                tracing::warn!(%id, %error, "Failed to patch status");
                self.metrics.failed(kind);
                Err(update)
            }
            Err(_) => {
                tracing::warn!(%id, timeout = ?self.patch_timeout, "Timed out patching status");
                self.metrics.timeout(kind);
                Err(update)
            }
        }
    }

    async fn patch_status<K>(
        &self,
        Update { id, patch }: &Update,
    ) -> Result<Result<(), k8s::Error>, time::error::Elapsed>
    where
        K: k8s::Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
        K: Clone + DeserializeOwned + fmt::Debug,
    {
        let api = k8s::Api::<K>::namespaced(self.client.clone(), &id.namespace);
        let params = k8s::PatchParams::apply(FIELD_MANAGER);
        time::timeout(self.patch_timeout, api.patch_status(&id.name, &params, patch))
            .await
            .map(|res| res.map(|_| ()))
    }
}

// === impl Retries ===

impl Retries {
    fn insert(&mut self, update: Update, due: time::Instant) {
        self.pending.insert(update.id.clone(), (due, update));
    }

    fn remove(&mut self, id: &ResourceId) {
        self.pending.remove(id);
    }

    fn clear(&mut self) {
        self.pending.clear();
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    /// Completes when the earliest retry is due. Never completes when nothing
    /// is pending.
    async fn ready(&self) {
        match self.pending.values().map(|(due, _)| *due).min() {
            Some(due) => time::sleep_until(due).await,
            None => std::future::pending().await,
        }
    }

    fn take_due(&mut self, now: time::Instant) -> Vec<Update> {
        let due = self
            .pending
            .iter()
            .filter(|(_, (at, _))| *at <= now)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        due.into_iter()
            .filter_map(|id| self.pending.remove(&id))
            .map(|(_, update)| update)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn update(name: &str) -> Update {
        Update {
            id: ResourceId::virtual_host("ns", name),
            patch: k8s::Patch::Merge(serde_json::json!({ "name": name })),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_wait_for_their_delay() {
        let mut retries = Retries::default();
        let start = time::Instant::now();
        retries.insert(update("a"), start + time::Duration::from_secs(1));
        retries.insert(update("b"), start + time::Duration::from_secs(2));

        retries.ready().await;
        let now = time::Instant::now();
        assert_eq!(now - start, time::Duration::from_secs(1));
        assert_eq!(retries.take_due(now), vec![update("a")]);
        assert_eq!(retries.len(), 1);

        retries.ready().await;
        assert_eq!(retries.take_due(time::Instant::now()), vec![update("b")]);
        assert_eq!(retries.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_updates_supersede_retries() {
        let mut retries = Retries::default();
        let due = time::Instant::now() + time::Duration::from_secs(1);
        retries.insert(update("a"), due);
        retries.insert(update("b"), due);
        retries.remove(&ResourceId::virtual_host("ns", "a"));

        retries.ready().await;
        assert_eq!(retries.take_due(time::Instant::now()), vec![update("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_pending_is_never_ready() {
        let retries = Retries::default();
        let ready = time::timeout(time::Duration::from_secs(60), retries.ready()).await;
        assert!(ready.is_err());
    }
}
