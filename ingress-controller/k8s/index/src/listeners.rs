//! Coalesces listener declarations into physical listeners.
//!
//! Listeners that share a protocol and port form a merge group. Within a
//! group, declarations for the same hostname collapse into a single host as
//! long as they agree on TLS; a single catch-all declaration may omit the
//! hostname. Conflicts only exclude the declarations involved, never the rest
//! of the group.

use crate::index::{Indexed, ResourceIndex};
use ingress_controller_core::{
    graph::{ListenerHost, PhysicalListener},
    listener::{ListenerResource, Protocol, TlsDescriptor},
    validity::{Outcomes, Reason},
    HostMatch, ResourceId, VirtualHostRoot,
};
use std::{collections::BTreeMap, num::NonZeroU16};

/// A listener declaration that passed its own validation.
#[derive(Debug)]
struct Member<'s> {
    id: &'s ResourceId,
    hostname: Option<&'s HostMatch>,
    tls: Option<&'s TlsDescriptor>,
}

type GroupKey = (Protocol, NonZeroU16);

/// Merges every listener in the index, binding each resulting host to the
/// accepted virtual hosts its declarations select.
///
/// `roots` must be ordered oldest first and contain only virtual hosts that
/// were not themselves rejected.
pub(crate) fn merge(
    index: &ResourceIndex<'_>,
    roots: &[&Indexed<'_, VirtualHostRoot>],
    outcomes: &mut Outcomes,
) -> Vec<PhysicalListener> {
    let mut groups = BTreeMap::<GroupKey, Vec<Member<'_>>>::new();
    for listener in index.listeners() {
        if let Some(member) = validate(listener, outcomes) {
            groups
                .entry((listener.spec.protocol, listener.spec.port))
                .or_default()
                .push(member);
        }
    }

    let mut listeners = Vec::with_capacity(groups.len());
    for ((protocol, port), members) in groups {
        let mut hosts = Vec::new();
        for host in merge_group(members, outcomes) {
            hosts.push(bind(index, host, roots, outcomes));
        }
        if hosts.is_empty() {
            tracing::debug!(%protocol, %port, "No listener declarations survived merging");
            continue;
        }
        listeners.push(PhysicalListener {
            protocol,
            port,
            hosts,
        });
    }
    listeners
}

fn validate<'s>(
    listener: &Indexed<'s, ListenerResource>,
    outcomes: &mut Outcomes,
) -> Option<Member<'s>> {
    let id = &listener.resource.id;
    let spec = listener.spec;

    let tls = match (spec.protocol, &spec.tls) {
        (Protocol::Https, None) => {
            outcomes.error(
                id,
                Reason::TlsRequired,
                format!("{} listeners must reference a TLS secret", spec.protocol),
                &[],
            );
            return None;
        }
        (Protocol::Http, Some(tls)) => {
            outcomes.warning(
                id,
                Reason::TlsIgnored,
                format!("{tls} is ignored by {} listeners", spec.protocol),
            );
            None
        }
        (_, tls) => tls.as_ref(),
    };

    Some(Member {
        id,
        hostname: spec.hostname.as_ref(),
        tls,
    })
}

/// A host under construction, before its bindings are resolved.
struct PendingHost<'s> {
    hostname: Option<&'s HostMatch>,
    tls: Option<&'s TlsDescriptor>,
    sources: Vec<&'s ResourceId>,
}

/// Partitions a merge group by hostname. Members arrive oldest first.
fn merge_group<'s>(members: Vec<Member<'s>>, outcomes: &mut Outcomes) -> Vec<PendingHost<'s>> {
    let mut catch_all = None::<Member<'s>>;
    let mut by_host = BTreeMap::<&HostMatch, Vec<Member<'s>>>::new();
    for member in members {
        match member.hostname {
            Some(host) => by_host.entry(host).or_default().push(member),
            None => match catch_all.as_ref().map(|first| first.id) {
                None => catch_all = Some(member),
                Some(first) => outcomes.error(
                    member.id,
                    Reason::DuplicateCatchAllListener,
                    format!("{first} already accepts every hostname on this port"),
                    &[],
                ),
            },
        }
    }

    let mut hosts = Vec::with_capacity(by_host.len() + 1);
    for (hostname, members) in by_host {
        let mut descriptors = members.iter().map(|m| m.tls).collect::<Vec<_>>();
        descriptors.sort();
        descriptors.dedup();
        if descriptors.len() > 1 {
            for member in &members {
                let others = members
                    .iter()
                    .filter(|m| m.id != member.id)
                    .map(|m| match m.tls {
                        Some(tls) => format!("{} ({tls})", m.id),
                        None => format!("{} (no TLS)", m.id),
                    })
                    .collect::<Vec<_>>();
                outcomes.error(
                    member.id,
                    Reason::TlsMismatch,
                    format!(
                        "hostname {hostname} is also declared with different TLS by {}",
                        others.join(", ")
                    ),
                    &[],
                );
            }
            continue;
        }

        hosts.push(PendingHost {
            hostname: Some(hostname),
            tls: descriptors[0],
            sources: members.iter().map(|m| m.id).collect(),
        });
    }

    if let Some(member) = catch_all {
        hosts.push(PendingHost {
            hostname: None,
            tls: member.tls,
            sources: vec![member.id],
        });
    }

    hosts
}

/// Resolves which virtual hosts a merged host exposes.
fn bind(
    index: &ResourceIndex<'_>,
    host: PendingHost<'_>,
    roots: &[&Indexed<'_, VirtualHostRoot>],
    outcomes: &mut Outcomes,
) -> ListenerHost {
    let mut virtual_hosts = Vec::new();
    for root in roots {
        let root_id = &root.resource.id;
        let referrers = index.referenced_by(root_id);
        for source in host.sources.iter().filter(|s| referrers.contains(*s)) {
            if let Some(hostname) = host.hostname {
                if !hostname.intersects(&root.spec.hostname) {
                    let detail = format!(
                        "{source} serves {hostname}, which never matches {root_id} hostname {}",
                        root.spec.hostname
                    );
                    outcomes.warning(source, Reason::HostnameMismatch, detail.clone());
                    outcomes.warning(root_id, Reason::HostnameMismatch, detail);
                    continue;
                }
            }
            if !virtual_hosts.contains(root_id) {
                virtual_hosts.push(root_id.clone());
            }
        }
    }

    ListenerHost {
        hostname: host.hostname.cloned(),
        tls: host.tls.cloned(),
        sources: host.sources.into_iter().cloned().collect(),
        virtual_hosts,
    }
}
