use ingress_controller_core::graph::GraphSnapshot;
use kube::ResourceExt;
use kubert::index::NamespacedRemoved;
use parking_lot::RwLock;
use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge, histogram::Histogram},
    registry::{Registry, Unit},
};
use std::{collections::BTreeSet, sync::Arc};
use tokio::time;

/// Wraps a shared store so that every watch event is counted by kind and
/// namespace.
pub struct IndexMetrics<T> {
    inner: T,

    size: Family<KindLabels, Gauge>,
    applies: Family<KindLabels, Counter>,
    deletes: Family<KindLabels, Counter>,
    resets: Family<ResetLabels, Counter>,
}

/// Tracks the cost and output of resolution passes.
#[derive(Clone, Debug)]
pub struct ResolveMetrics {
    passes: Counter,
    duration: Histogram,
    virtual_hosts: Gauge,
    routes: Gauge,
    listeners: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct KindLabels {
    kind: String,
    namespace: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct ResetLabels {
    kind: String,
}

pub trait SizedIndex<R> {
    fn size(&self, namespace: &str) -> usize;
}

impl<T, R> SizedIndex<R> for Arc<RwLock<T>>
where
    T: SizedIndex<R>,
{
    fn size(&self, namespace: &str) -> usize {
        self.read().size(namespace)
    }
}

// === impl IndexMetrics ===

impl<T> IndexMetrics<T> {
    pub fn register(inner: T, prom: &mut Registry) -> Self {
        let size = Family::default();
        prom.register(
            "resources",
            "Number of routing resources held by the store",
            size.clone(),
        );

        let applies = Family::default();
        prom.register(
            "applies",
            "Count of resource updates observed by the store",
            applies.clone(),
        );

        let deletes = Family::default();
        prom.register(
            "deletes",
            "Count of resource deletions observed by the store",
            deletes.clone(),
        );

        let resets = Family::default();
        prom.register(
            "resets",
            "Count of watch restarts observed by the store",
            resets.clone(),
        );

        Self {
            inner,
            size,
            applies,
            deletes,
            resets,
        }
    }

    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    fn set_size<R>(&self, kind: &str, namespace: String)
    where
        T: SizedIndex<R>,
    {
        let size = self.inner.size(&namespace);
        self.size
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
                namespace,
            })
            .set(size as i64);
    }
}

impl<R, T> kubert::index::IndexNamespacedResource<R> for IndexMetrics<Arc<RwLock<T>>>
where
    T: SizedIndex<R> + kubert::index::IndexNamespacedResource<R>,
    R: ResourceExt<DynamicType = ()>,
{
    fn apply(&mut self, resource: R) {
        let kind = R::kind(&());
        let namespace = resource.namespace().unwrap_or_default();
        self.applies
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
                namespace: namespace.clone(),
            })
            .inc();
        self.inner.write().apply(resource);
        self.set_size::<R>(&kind, namespace);
    }

    fn delete(&mut self, namespace: String, name: String) {
        let kind = R::kind(&());
        self.deletes
            .get_or_create(&KindLabels {
                kind: kind.to_string(),
                namespace: namespace.clone(),
            })
            .inc();
        self.inner.write().delete(namespace.clone(), name);
        self.set_size::<R>(&kind, namespace);
    }

    fn reset(&mut self, resources: Vec<R>, removed: NamespacedRemoved) {
        let kind = R::kind(&());
        let namespaces = resources
            .iter()
            .filter_map(|r| r.namespace())
            .chain(removed.keys().cloned())
            .collect::<BTreeSet<_>>();
        self.resets
            .get_or_create(&ResetLabels {
                kind: kind.to_string(),
            })
            .inc();
        self.inner.write().reset(resources, removed);
        for namespace in namespaces {
            self.set_size::<R>(&kind, namespace);
        }
    }
}

// === impl ResolveMetrics ===

impl ResolveMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let passes = Counter::default();
        prom.register(
            "passes",
            "Count of completed resolution passes",
            passes.clone(),
        );

        // Passes are expected to complete in well under a second; the upper
        // buckets catch pathological delegation trees.
        let duration = Histogram::new([0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
        prom.register_with_unit(
            "pass_duration",
            "Time taken to resolve a snapshot into a routing graph",
            Unit::Seconds,
            duration.clone(),
        );

        let virtual_hosts = Gauge::default();
        prom.register(
            "virtual_hosts",
            "Number of virtual hosts in the published graph",
            virtual_hosts.clone(),
        );

        let routes = Gauge::default();
        prom.register(
            "routes",
            "Number of route entries in the published graph",
            routes.clone(),
        );

        let listeners = Gauge::default();
        prom.register(
            "listeners",
            "Number of physical listeners in the published graph",
            listeners.clone(),
        );

        Self {
            passes,
            duration,
            virtual_hosts,
            routes,
            listeners,
        }
    }

    pub fn observe(&self, started: time::Instant, graph: &GraphSnapshot) {
        self.passes.inc();
        self.duration.observe(started.elapsed().as_secs_f64());
        self.virtual_hosts.set(graph.virtual_hosts.len() as i64);
        self.routes.set(
            graph
                .virtual_hosts
                .iter()
                .map(|vh| vh.routes.len() as i64)
                .sum(),
        );
        self.listeners.set(graph.listeners.len() as i64);
    }
}
