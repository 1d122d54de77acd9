//! Holds the latest observed version of every routing resource.
//!
//! The store is fed by Kubernetes watches and is never mutated by the
//! resolver. Each resolution pass works from a `Snapshot`, an immutable view
//! that shares its contents with the store until the store next changes.

use crate::{metrics::SizedIndex, resource};
use ingress_controller_core::{ResourceId, ResourceKind, RoutingResource};
use ingress_controller_k8s_api as k8s;
use parking_lot::RwLock;
use kubert::index::NamespacedRemoved;
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tokio::sync::watch;

pub type SharedStore = Arc<RwLock<Store>>;

type Resources = BTreeMap<ResourceId, Arc<RoutingResource>>;

#[derive(Debug)]
pub struct Store {
    resources: Arc<Resources>,
    changes: watch::Sender<u64>,

    /// Kinds whose initial list has been indexed.
    synced: BTreeSet<ResourceKind>,
}

/// An immutable view of the store at a single version.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    resources: Arc<Resources>,
    version: u64,
}

// === impl Store ===

impl Store {
    pub fn shared() -> SharedStore {
        Arc::new(RwLock::new(Self::default()))
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            resources: self.resources.clone(),
            version: *self.changes.borrow(),
        }
    }

    /// Returns a receiver that is notified whenever the store's contents
    /// change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Indicates whether every kind has been listed at least once.
    ///
    /// Until then a snapshot may hold fragments without the virtual hosts that
    /// delegate to them.
    pub fn is_synced(&self) -> bool {
        [
            ResourceKind::VirtualHost,
            ResourceKind::RouteFragment,
            ResourceKind::Listener,
        ]
        .iter()
        .all(|k| self.synced.contains(k))
    }

    pub fn apply(&mut self, resource: RoutingResource) {
        if self.insert(resource) {
            self.notify();
        }
    }

    pub fn delete(&mut self, id: &ResourceId) {
        if self.remove(id) {
            self.notify();
        }
    }

    /// Replaces every resource of a kind with a listed set, notifying
    /// subscribers once.
    pub fn reset(
        &mut self,
        kind: ResourceKind,
        resources: impl IntoIterator<Item = RoutingResource>,
        removed: NamespacedRemoved,
    ) {
        let mut changed = false;
        for resource in resources {
            changed |= self.insert(resource);
        }
        for (namespace, names) in removed {
            for name in names {
                changed |= self.remove(&ResourceId::new(kind, &namespace, name));
            }
        }

        if self.synced.insert(kind) {
            tracing::info!(%kind, "Initial list indexed");
            changed = true;
        }
        if changed {
            self.notify();
        }
    }

    fn insert(&mut self, resource: RoutingResource) -> bool {
        if let Some(current) = self.resources.get(&resource.id) {
            if **current == resource {
                tracing::trace!(id = %resource.id, "Unchanged");
                return false;
            }
        }
        tracing::debug!(id = %resource.id, generation = resource.generation, "Applied");
        Arc::make_mut(&mut self.resources).insert(resource.id.clone(), Arc::new(resource));
        true
    }

    fn remove(&mut self, id: &ResourceId) -> bool {
        if !self.resources.contains_key(id) {
            return false;
        }
        tracing::debug!(%id, "Deleted");
        Arc::make_mut(&mut self.resources).remove(id);
        true
    }

    fn notify(&self) {
        self.changes.send_modify(|v| *v += 1);
    }

    fn count(&self, kind: ResourceKind, namespace: &str) -> usize {
        self.resources
            .keys()
            .filter(|id| id.kind == kind && id.namespace == namespace)
            .count()
    }
}

impl Default for Store {
    fn default() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            resources: Default::default(),
            changes,
            synced: Default::default(),
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::VirtualHost> for Store {
    fn apply(&mut self, vh: k8s::VirtualHost) {
        self.apply(resource::virtual_host(vh));
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete(&ResourceId::virtual_host(namespace, name));
    }

    fn reset(&mut self, vhs: Vec<k8s::VirtualHost>, removed: NamespacedRemoved) {
        let resources = vhs.into_iter().map(resource::virtual_host);
        self.reset(ResourceKind::VirtualHost, resources, removed);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::RouteFragment> for Store {
    fn apply(&mut self, frag: k8s::RouteFragment) {
        self.apply(resource::route_fragment(frag));
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete(&ResourceId::fragment(namespace, name));
    }

    fn reset(&mut self, frags: Vec<k8s::RouteFragment>, removed: NamespacedRemoved) {
        let resources = frags.into_iter().map(resource::route_fragment);
        self.reset(ResourceKind::RouteFragment, resources, removed);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Listener> for Store {
    fn apply(&mut self, listener: k8s::Listener) {
        self.apply(resource::listener(listener));
    }

    fn delete(&mut self, namespace: String, name: String) {
        self.delete(&ResourceId::listener(namespace, name));
    }

    fn reset(&mut self, listeners: Vec<k8s::Listener>, removed: NamespacedRemoved) {
        let resources = listeners.into_iter().map(resource::listener);
        self.reset(ResourceKind::Listener, resources, removed);
    }
}

impl SizedIndex<k8s::VirtualHost> for Store {
    fn size(&self, namespace: &str) -> usize {
        self.count(ResourceKind::VirtualHost, namespace)
    }
}

impl SizedIndex<k8s::RouteFragment> for Store {
    fn size(&self, namespace: &str) -> usize {
        self.count(ResourceKind::RouteFragment, namespace)
    }
}

impl SizedIndex<k8s::Listener> for Store {
    fn size(&self, namespace: &str) -> usize {
        self.count(ResourceKind::Listener, namespace)
    }
}

// === impl Snapshot ===

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, id: &ResourceId) -> Option<&RoutingResource> {
        self.resources.get(id).map(|r| &**r)
    }

    /// Iterates over resources in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &RoutingResource> {
        self.resources.values().map(|r| &**r)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl FromIterator<RoutingResource> for Snapshot {
    fn from_iter<I: IntoIterator<Item = RoutingResource>>(iter: I) -> Self {
        let resources = iter
            .into_iter()
            .map(|r| (r.id.clone(), Arc::new(r)))
            .collect();
        Self {
            resources: Arc::new(resources),
            version: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingress_controller_core::{ResourceSpec, RouteFragment};

    fn fragment(name: &str, generation: i64) -> RoutingResource {
        RoutingResource {
            id: ResourceId::fragment("ns-0", name),
            uid: None,
            generation,
            creation_timestamp: None,
            labels: Default::default(),
            spec: ResourceSpec::RouteFragment(RouteFragment::default()),
        }
    }

    #[test]
    fn snapshots_are_isolated_from_later_changes() {
        let mut store = Store::default();
        store.apply(fragment("a", 1));
        let before = store.snapshot();

        store.apply(fragment("b", 1));
        store.delete(&ResourceId::fragment("ns-0", "a"));

        assert_eq!(before.len(), 1);
        assert!(before.get(&ResourceId::fragment("ns-0", "a")).is_some());

        let after = store.snapshot();
        assert_eq!(after.len(), 1);
        assert!(after.version() > before.version());
    }

    #[test]
    fn only_changes_notify() {
        let mut store = Store::default();
        let mut rx = store.subscribe();

        store.apply(fragment("a", 1));
        assert!(rx.has_changed().unwrap());
        rx.mark_unchanged();

        store.apply(fragment("a", 1));
        store.delete(&ResourceId::fragment("ns-0", "missing"));
        assert!(!rx.has_changed().unwrap());

        store.apply(fragment("a", 2));
        assert!(rx.has_changed().unwrap());
    }
}
