use crate::{metrics::IndexMetrics, records};
use ahash::AHashMap as HashMap;
use ingress_controller_core::{
    validity::{Outcomes, ValidityRecord},
    ResourceId,
};
use ingress_controller_k8s_api::{self as k8s, routing};
use kubert::lease::Claim;
use parking_lot::RwLock;
use std::{collections::BTreeMap, sync::Arc};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        watch,
    },
    time,
};

pub type SharedIndex = Arc<RwLock<Index>>;

/// Tracks the validity record of every resource and hands changed records to
/// the [`Controller`](crate::Controller) as status patches.
///
/// Only the holder of the write lease enqueues patches. When the lease is
/// acquired, every record is emitted again since the previous holder may have
/// written different statuses.
pub struct Index {
    name: String,
    claims: watch::Receiver<Arc<Claim>>,
    updates: mpsc::Sender<Update>,

    /// The records computed by the latest resolution.
    records: BTreeMap<ResourceId, ValidityRecord>,

    /// The UIDs of the resources the records were computed for. A resource
    /// recreated under the same name starts without a status.
    uids: BTreeMap<ResourceId, String>,

    /// The records that have been handed to the controller, with the UID of
    /// the resource they were written to.
    emitted: HashMap<ResourceId, (Option<String>, ValidityRecord)>,

    metrics: IndexMetrics,
}

#[derive(Debug, PartialEq)]
pub struct Update {
    pub id: ResourceId,
    pub patch: k8s::Patch<serde_json::Value>,
}

impl Index {
    pub fn shared(
        name: impl ToString,
        claims: watch::Receiver<Arc<Claim>>,
        updates: mpsc::Sender<Update>,
        metrics: IndexMetrics,
    ) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            name: name.to_string(),
            claims,
            updates,
            records: BTreeMap::new(),
            uids: BTreeMap::new(),
            emitted: HashMap::new(),
            metrics,
        }))
    }

    /// Reconciles the emitted records periodically and whenever the lease
    /// changes hands.
    ///
    /// Periodic reconciliation re-emits records whose patches were dropped
    /// because the queue was full.
    pub async fn run(index: SharedIndex, period: time::Duration) {
        let mut claims = index.read().claims.clone();
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        let mut leading = false;

        loop {
            tokio::select! {
                res = claims.changed() => {
                    if res.is_err() {
                        tracing::debug!("Lease claims closed");
                        return;
                    }
                }
                _ = interval.tick() => {}
            }

            let mut index = index.write();
            let is_leader = index.is_leader();
            if is_leader && !leading {
                tracing::info!(records = index.records.len(), "Acquired status write lease");
                index.emitted.clear();
            }
            leading = is_leader;
            index.reconcile();
        }
    }

    /// Replaces the current records with those computed from a resolution's
    /// outcomes and enqueues patches for every record that changed.
    pub fn apply_outcomes(&mut self, outcomes: &Outcomes) {
        self.records = records::build(outcomes);
        self.uids = outcomes.uids.clone();
        // Deleted resources have no status left to patch.
        self.emitted.retain(|id, _| self.records.contains_key(id));
        self.metrics.set_records(self.records.len());
        self.reconcile();
    }

    pub fn record(&self, id: &ResourceId) -> Option<&ValidityRecord> {
        self.records.get(id)
    }

    fn is_leader(&self) -> bool {
        self.claims.borrow().is_current_for(&self.name)
    }

    pub(crate) fn reconcile(&mut self) {
        if !self.is_leader() {
            return;
        }

        let mut deferred = 0;
        for (id, record) in &self.records {
            let uid = self.uids.get(id);
            if let Some((emitted_uid, emitted)) = self.emitted.get(id) {
                if emitted_uid.as_ref() == uid && emitted == record {
                    continue;
                }
            }

            let update = Update {
                id: id.clone(),
                patch: make_patch(id, record),
            };
            match self.updates.try_send(update) {
                Ok(()) => {
                    tracing::debug!(%id, state = %record.state, "Enqueued status patch");
                    self.metrics.enqueued(id.kind);
                    self.emitted
                        .insert(id.clone(), (uid.cloned(), record.clone()));
                }
                // The record is left unemitted so that a later reconciliation
                // retries it.
                Err(TrySendError::Full(_)) => {
                    self.metrics.dropped(id.kind);
                    deferred += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::error!("Status controller is no longer receiving updates");
                    return;
                }
            }
        }

        if deferred > 0 {
            tracing::warn!(deferred, "Status patch queue is full");
        }
    }
}

pub(crate) fn make_patch(id: &ResourceId, record: &ValidityRecord) -> k8s::Patch<serde_json::Value> {
    let validity = routing::Validity {
        state: record.state.to_string(),
        observed_generation: record.observed_generation,
        conditions: record
            .conditions
            .iter()
            .map(|c| routing::ValidityCondition {
                severity: c.severity.as_str().to_string(),
                reason: c.reason.to_string(),
                message: c.detail.clone(),
            })
            .collect(),
    };
    let value = serde_json::json!({
        "apiVersion": k8s::ROUTING_API_VERSION,
        "kind": id.kind.as_str(),
        "name": id.name,
        "status": {
            "validity": validity,
        },
    });
    k8s::Patch::Merge(value)
}
