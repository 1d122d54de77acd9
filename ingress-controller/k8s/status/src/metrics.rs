use ingress_controller_core::ResourceKind;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug)]
pub struct IndexMetrics {
    records: Gauge,
    enqueued: Family<KindLabels, Counter>,
    dropped: Family<KindLabels, Counter>,
}

#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    succeeded: Family<KindLabels, Counter>,
    failed: Family<KindLabels, Counter>,
    timeouts: Family<KindLabels, Counter>,
    retried: Family<KindLabels, Counter>,
    skipped: Counter,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: &'static str,
}

impl From<ResourceKind> for KindLabels {
    fn from(kind: ResourceKind) -> Self {
        Self {
            kind: kind.as_str(),
        }
    }
}

// === impl IndexMetrics ===

impl IndexMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let records = Gauge::default();
        prom.register(
            "records",
            "Number of validity records computed by the last resolution",
            records.clone(),
        );

        let enqueued = Family::default();
        prom.register(
            "patches_enqueued",
            "Count of status patches handed to the controller",
            enqueued.clone(),
        );

        let dropped = Family::default();
        prom.register(
            "patches_dropped",
            "Count of status patches dropped because the queue was full",
            dropped.clone(),
        );

        Self {
            records,
            enqueued,
            dropped,
        }
    }

    pub(crate) fn set_records(&self, n: usize) {
        self.records.set(n as i64);
    }

    pub(crate) fn enqueued(&self, kind: ResourceKind) {
        self.enqueued.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn dropped(&self, kind: ResourceKind) {
        self.dropped.get_or_create(&kind.into()).inc();
    }
}

// === impl ControllerMetrics ===

impl ControllerMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let succeeded = Family::default();
        prom.register(
            "patch_succeeded",
            "Count of status patches that were applied",
            succeeded.clone(),
        );

        let failed = Family::default();
        prom.register(
            "patch_failed",
            "Count of status patches rejected by the API server",
            failed.clone(),
        );

        let timeouts = Family::default();
        prom.register(
            "patch_timeout",
            "Count of status patches that did not complete in time",
            timeouts.clone(),
        );

        let retried = Family::default();
        prom.register(
            "patch_retried",
            "Count of status patches attempted again after a failure",
            retried.clone(),
        );

        let skipped = Counter::default();
        prom.register(
            "patch_skipped",
            "Count of status patches discarded while not holding the write lease",
            skipped.clone(),
        );

        Self {
            succeeded,
            failed,
            timeouts,
            retried,
            skipped,
        }
    }

    pub(crate) fn succeeded(&self, kind: ResourceKind) {
        self.succeeded.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn failed(&self, kind: ResourceKind) {
        self.failed.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn timeout(&self, kind: ResourceKind) {
        self.timeouts.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn retried(&self, kind: ResourceKind) {
        self.retried.get_or_create(&kind.into()).inc();
    }

    pub(crate) fn skipped(&self, n: usize) {
        self.skipped.inc_by(n as u64);
    }
}
