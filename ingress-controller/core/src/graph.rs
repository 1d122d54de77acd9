//! The resolved routing graph handed to the data-plane translator.
//!
//! A `GraphSnapshot` is immutable once published: consumers never need to
//! re-derive delegation or listener merging.

use crate::{
    http_route::{Backend, RouteMatch},
    listener::{Protocol, TlsDescriptor},
    HostMatch, ResourceId,
};
use serde::Serialize;
use std::num::NonZeroU16;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphSnapshot {
    pub virtual_hosts: Vec<VirtualHostTable>,
    pub listeners: Vec<PhysicalListener>,
}

/// The flattened route table of a single virtual host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHostTable {
    pub root: ResourceId,
    pub hostname: HostMatch,
    pub tls: Option<TlsDescriptor>,
    pub routes: Vec<RouteEntry>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    /// The fully merged match, including every predicate inherited along the
    /// delegation path.
    pub matches: RouteMatch,
    pub backends: Vec<Backend>,

    /// The resource that declared the rule.
    pub origin: ResourceId,
    pub rule_index: usize,
}

/// A listener as it will be programmed: one per protocol and port.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalListener {
    pub protocol: Protocol,
    pub port: NonZeroU16,
    pub hosts: Vec<ListenerHost>,
}

/// A hostname served by a physical listener, with the virtual hosts bound
/// to it. An absent hostname is the listener's catch-all.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerHost {
    pub hostname: Option<HostMatch>,
    pub tls: Option<TlsDescriptor>,

    /// The listener resources merged into this host, oldest first.
    pub sources: Vec<ResourceId>,
    pub virtual_hosts: Vec<ResourceId>,
}

// === impl GraphSnapshot ===

impl GraphSnapshot {
    pub fn virtual_host(&self, root: &ResourceId) -> Option<&VirtualHostTable> {
        self.virtual_hosts.iter().find(|vh| vh.root == *root)
    }

    pub fn listener(&self, protocol: Protocol, port: u16) -> Option<&PhysicalListener> {
        self.listeners
            .iter()
            .find(|l| l.protocol == protocol && l.port.get() == port)
    }
}
