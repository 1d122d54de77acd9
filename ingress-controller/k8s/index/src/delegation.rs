//! Walks delegation edges from a virtual host to every fragment it reaches.
//!
//! Traversal is depth-first and pre-order, following edges in declaration
//! order, with an explicit stack so that deep or cyclic delegation chains
//! cannot exhaust the call stack. A fragment is visited once per distinct
//! constraint: the rules it contributes depend only on what it inherits, so
//! reaching it again with the same constraint only adds ancestors.

use crate::{
    index::{Indexed, ResourceIndex},
    matches,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use ingress_controller_core::{
    http_route::{RouteAction, RouteMatch},
    validity::{Outcomes, Reason},
    ResourceId, RouteSet, RoutingResource, VirtualHostRoot,
};

/// A resource reached by a traversal, with everything it inherits from the
/// edges that led to it.
#[derive(Clone, Debug)]
pub(crate) struct Visit<'s> {
    pub resource: &'s RoutingResource,
    pub routes: &'s RouteSet,

    /// The merged match of every edge on the path. Rules declared by the
    /// resource must remain within it.
    pub constraint: RouteMatch,

    /// Every resource that delegated to this one, directly or indirectly,
    /// root first.
    pub path: Vec<ResourceId>,
}

#[derive(Debug)]
struct Node<'s> {
    resource: &'s RoutingResource,
    routes: &'s RouteSet,
    constraint: RouteMatch,
    parents: Vec<usize>,
}

/// Returns every resource reachable from `root`, including the root itself,
/// in traversal order.
///
/// Rejected edges are recorded against the resource that declared them and
/// are not followed. Sibling edges are unaffected.
pub(crate) fn traverse<'s>(
    index: &ResourceIndex<'s>,
    root: &Indexed<'s, VirtualHostRoot>,
    outcomes: &mut Outcomes,
) -> Vec<Visit<'s>> {
    let mut nodes = vec![Node {
        resource: root.resource,
        routes: &root.spec.routes,
        constraint: RouteMatch::default(),
        parents: vec![],
    }];
    let mut seen = HashMap::<(&'s ResourceId, RouteMatch), usize>::new();
    let mut rejected = Vec::<(usize, Reason, String)>::new();
    let mut order = Vec::new();
    let mut stack = vec![0];

    while let Some(n) = stack.pop() {
        order.push(n);
        let resource = nodes[n].resource;
        let owner = &resource.id;
        let routes = nodes[n].routes;
        let inherited = nodes[n].constraint.clone();
        let lineage = ancestors(&nodes, n)
            .into_iter()
            .map(|a| nodes[a].resource)
            .map(|r| &r.id)
            .collect::<HashSet<_>>();
        let mut children = Vec::new();

        for rule in &routes.rules {
            let RouteAction::Delegate(target) = &rule.action else {
                continue;
            };

            if target == owner || lineage.contains(target) {
                tracing::debug!(%owner, %target, "Delegation cycle");
                rejected.push((
                    n,
                    Reason::DelegationCycle,
                    format!(
                        "route {} delegates to {target}, which already delegates to {owner}",
                        rule.index
                    ),
                ));
                continue;
            }

            let Some(frag) = index.route_fragment(target) else {
                rejected.push((
                    n,
                    Reason::DelegationTargetNotFound,
                    format!("route {} delegates to {target}, which does not exist", rule.index),
                ));
                continue;
            };

            let constraint = match matches::merge(&inherited, &rule.matches) {
                Ok(merged) => merged,
                Err(detail) => {
                    rejected.push((
                        n,
                        Reason::ConstraintViolation,
                        format!("route {} delegating to {target}: {detail}", rule.index),
                    ));
                    continue;
                }
            };

            if constraint.path.as_ref().is_some_and(|p| p.is_unbounded()) {
                rejected.push((
                    n,
                    Reason::UnboundedWildcardDelegation,
                    format!(
                        "route {} delegates {constraint} to {target}, but a trailing '**' cannot be delegated further",
                        rule.index
                    ),
                ));
                continue;
            }

            let key = (&frag.resource.id, constraint);
            if let Some(&c) = seen.get(&key) {
                if !nodes[c].parents.contains(&n) {
                    nodes[c].parents.push(n);
                }
                continue;
            }
            let c = nodes.len();
            nodes.push(Node {
                resource: frag.resource,
                routes: &frag.spec.routes,
                constraint: key.1.clone(),
                parents: vec![n],
            });
            seen.insert(key, c);
            children.push(c);
        }

        // The stack is LIFO: push in reverse so the first-declared edge is
        // visited first.
        stack.extend(children.into_iter().rev());
    }

    let paths = (0..nodes.len())
        .map(|n| path(&nodes, n))
        .collect::<Vec<_>>();
    for (n, reason, detail) in rejected {
        outcomes.error(&nodes[n].resource.id, reason, detail, &paths[n]);
    }

    let mut visits = nodes
        .into_iter()
        .zip(paths)
        .map(|(node, path)| {
            Some(Visit {
                resource: node.resource,
                routes: node.routes,
                constraint: node.constraint,
                path,
            })
        })
        .collect::<Vec<_>>();
    order
        .into_iter()
        .filter_map(|n| visits[n].take())
        .collect()
}

/// Returns the nodes from which `n` was reached.
fn ancestors(nodes: &[Node<'_>], n: usize) -> HashSet<usize> {
    let mut found = HashSet::new();
    let mut stack = nodes[n].parents.clone();
    while let Some(p) = stack.pop() {
        if found.insert(p) {
            stack.extend(&nodes[p].parents);
        }
    }
    found
}

/// Lists the resources from which `n` was reached in discovery order, so the
/// root comes first.
fn path(nodes: &[Node<'_>], n: usize) -> Vec<ResourceId> {
    let mut found = ancestors(nodes, n).into_iter().collect::<Vec<_>>();
    found.sort_unstable();

    let own = &nodes[n].resource.id;
    let mut ids = HashSet::new();
    found
        .into_iter()
        .map(|a| &nodes[a].resource.id)
        .filter(|id| *id != own && ids.insert(*id))
        .cloned()
        .collect()
}
