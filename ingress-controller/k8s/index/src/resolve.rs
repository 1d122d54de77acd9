use crate::{delegation, index::ResourceIndex, listeners, matches, store::Snapshot};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use ingress_controller_core::{
    graph::{GraphSnapshot, VirtualHostTable},
    validity::{Condition, Outcomes, Reason},
    HostMatch, ResourceId,
};

/// The result of resolving a snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    pub graph: GraphSnapshot,
    pub outcomes: Outcomes,
}

/// Resolves a snapshot of routing resources into a routing graph and the
/// outcome for every resource in it.
///
/// Resolution is a pure function of the snapshot. It never fails: anything
/// that cannot be programmed is reported in the outcomes while everything
/// that can be programmed is.
pub fn resolve(snapshot: &Snapshot) -> Resolution {
    let index = ResourceIndex::build(snapshot);
    let mut outcomes = Outcomes::default();
    outcomes.generations = snapshot
        .iter()
        .map(|r| (r.id.clone(), r.generation))
        .collect();
    outcomes.uids = snapshot
        .iter()
        .filter_map(|r| Some((r.id.clone(), r.uid.clone()?)))
        .collect();

    for (resource, detail) in index.rejected() {
        outcomes.error(&resource.id, Reason::InvalidResource, *detail, &[]);
    }

    // The oldest virtual host claims a hostname; later claims are rejected
    // without being traversed.
    let mut claims = HashMap::<&HostMatch, &ResourceId>::new();
    let mut roots = Vec::new();
    for root in index.roots() {
        let id = &root.resource.id;
        if let Some(winner) = claims.get(&root.spec.hostname) {
            tracing::debug!(%id, %winner, hostname = %root.spec.hostname, "Duplicate hostname");
            outcomes.error(
                id,
                Reason::DuplicateHostname,
                format!("hostname {} is already claimed by {winner}", root.spec.hostname),
                &[],
            );
            continue;
        }
        claims.insert(&root.spec.hostname, id);
        roots.push(root);
    }

    let mut checked = HashSet::new();
    let mut virtual_hosts = Vec::with_capacity(roots.len());
    for root in &roots {
        let visits = delegation::traverse(&index, root, &mut outcomes);
        for visit in &visits {
            let id = &visit.resource.id;
            outcomes.reachable.insert(id.clone());
            // Malformed rules are a property of the resource, not of the path
            // that reached it.
            if checked.insert(id) {
                for rule in &visit.routes.malformed {
                    outcomes.error(
                        id,
                        Reason::InvalidRoute,
                        format!("route {}: {}", rule.index, rule.detail),
                        &visit.path,
                    );
                }
            }
        }

        let routes = matches::route_table(&visits, &mut outcomes);
        tracing::trace!(root = %root.resource.id, routes = routes.len(), "Resolved route table");
        virtual_hosts.push(VirtualHostTable {
            root: root.resource.id.clone(),
            hostname: root.spec.hostname.clone(),
            tls: root.spec.tls.clone(),
            routes,
        });
    }

    let listeners = listeners::merge(&index, &roots, &mut outcomes);

    for frag in index.route_fragments() {
        let id = &frag.resource.id;
        if !outcomes.is_orphaned(id) {
            continue;
        }
        let referrers = index.referenced_by(id);
        let detail = if referrers.is_empty() {
            "no VirtualHost or RouteFragment delegates to this fragment".to_string()
        } else {
            let names = referrers
                .iter()
                .map(|r| r.to_string())
                .collect::<Vec<_>>();
            format!(
                "not reachable from any VirtualHost, although delegated to by {}",
                names.join(", ")
            )
        };
        outcomes.record(id, Condition::info(Reason::Orphaned, detail), &[]);
    }

    Resolution {
        graph: GraphSnapshot {
            virtual_hosts,
            listeners,
        },
        outcomes,
    }
}
