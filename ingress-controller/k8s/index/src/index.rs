//! Classifies a snapshot's resources for a single resolution pass.
//!
//! The index borrows from the snapshot it was built from and is discarded when
//! the pass completes. It performs no validation beyond separating resources
//! that could not be converted at all.

use crate::store::Snapshot;
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use ingress_controller_core::{
    http_route::RouteAction, listener::ListenerResource, ResourceId, ResourceSpec, RouteFragment,
    RouteSet, RoutingResource, VirtualHostRoot,
};

#[derive(Debug)]
pub(crate) struct ResourceIndex<'s> {
    roots: HashMap<&'s ResourceId, Indexed<'s, VirtualHostRoot>>,
    fragments: HashMap<&'s ResourceId, Fragment<'s>>,
    rejected: Vec<(&'s RoutingResource, &'s str)>,

    /// Maps each resource to the resources that name it, either through a
    /// delegation or a listener's route binding.
    referenced_by: HashMap<&'s ResourceId, HashSet<&'s ResourceId>>,
}

/// A resource paired with its kind-specific spec.
#[derive(Debug)]
pub(crate) struct Indexed<'s, T> {
    pub resource: &'s RoutingResource,
    pub spec: &'s T,
}

#[derive(Debug)]
pub(crate) enum Fragment<'s> {
    Routes(Indexed<'s, RouteFragment>),
    Listener(Indexed<'s, ListenerResource>),
}

// === impl ResourceIndex ===

impl<'s> ResourceIndex<'s> {
    pub(crate) fn build(snapshot: &'s Snapshot) -> Self {
        let mut roots = HashMap::new();
        let mut fragments = HashMap::new();
        let mut rejected = Vec::new();

        for resource in snapshot.iter() {
            match &resource.spec {
                ResourceSpec::VirtualHost(spec) => {
                    roots.insert(&resource.id, Indexed { resource, spec });
                }
                ResourceSpec::RouteFragment(spec) => {
                    fragments.insert(&resource.id, Fragment::Routes(Indexed { resource, spec }));
                }
                ResourceSpec::Listener(spec) => {
                    fragments.insert(&resource.id, Fragment::Listener(Indexed { resource, spec }));
                }
                ResourceSpec::Rejected { detail } => rejected.push((resource, detail.as_str())),
            }
        }

        let mut referenced_by = HashMap::<_, HashSet<_>>::new();
        for resource in snapshot.iter() {
            for target in resource.routes().into_iter().flat_map(delegations) {
                referenced_by
                    .entry(target)
                    .or_default()
                    .insert(&resource.id);
            }
        }
        for fragment in fragments.values() {
            let Fragment::Listener(listener) = fragment else {
                continue;
            };
            for root in roots.values() {
                if listener.spec.binding.selects(
                    &listener.resource.id.namespace,
                    &root.resource.id.namespace,
                    &root.resource.labels,
                ) {
                    referenced_by
                        .entry(&root.resource.id)
                        .or_default()
                        .insert(&listener.resource.id);
                }
            }
        }

        Self {
            roots,
            fragments,
            rejected,
            referenced_by,
        }
    }

    /// Returns every virtual host, oldest first.
    pub(crate) fn roots(&self) -> Vec<&Indexed<'s, VirtualHostRoot>> {
        let mut roots = self.roots.values().collect::<Vec<_>>();
        roots.sort_by_cached_key(|r| r.resource.precedence());
        roots
    }

    /// Returns every listener, oldest first.
    pub(crate) fn listeners(&self) -> Vec<&Indexed<'s, ListenerResource>> {
        let mut listeners = self
            .fragments
            .values()
            .filter_map(|f| match f {
                Fragment::Listener(l) => Some(l),
                Fragment::Routes(_) => None,
            })
            .collect::<Vec<_>>();
        listeners.sort_by_cached_key(|l| l.resource.precedence());
        listeners
    }

    pub(crate) fn route_fragment(&self, id: &ResourceId) -> Option<&Indexed<'s, RouteFragment>> {
        match self.fragments.get(id)? {
            Fragment::Routes(frag) => Some(frag),
            Fragment::Listener(_) => None,
        }
    }

    /// Returns every route fragment in identity order.
    pub(crate) fn route_fragments(&self) -> Vec<&Indexed<'s, RouteFragment>> {
        let mut frags = self
            .fragments
            .values()
            .filter_map(|f| match f {
                Fragment::Routes(frag) => Some(frag),
                Fragment::Listener(_) => None,
            })
            .collect::<Vec<_>>();
        frags.sort_by(|a, b| a.resource.id.cmp(&b.resource.id));
        frags
    }

    pub(crate) fn rejected(&self) -> &[(&'s RoutingResource, &'s str)] {
        &self.rejected
    }

    /// Returns the resources referring to `id`, in identity order.
    pub(crate) fn referenced_by(&self, id: &ResourceId) -> Vec<&'s ResourceId> {
        let mut referrers = self
            .referenced_by
            .get(id)
            .into_iter()
            .flatten()
            .copied()
            .collect::<Vec<_>>();
        referrers.sort();
        referrers
    }
}

fn delegations(routes: &RouteSet) -> impl Iterator<Item = &ResourceId> {
    routes.rules.iter().filter_map(|rule| match &rule.action {
        RouteAction::Delegate(target) => Some(target),
        RouteAction::Forward(_) => None,
    })
}
