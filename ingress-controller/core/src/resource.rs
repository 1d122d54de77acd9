use crate::{
    http_route::RouteRule,
    listener::{ListenerResource, TlsDescriptor},
    HostMatch,
};
use chrono::{offset::Utc, DateTime};
use serde::Serialize;
use std::{cmp::Ordering, collections::BTreeMap, fmt};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    VirtualHost,
    RouteFragment,
    Listener,
}

/// Identifies a routing resource by kind, namespace, and name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

/// A resource as observed in the store, read-only to the resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingResource {
    pub id: ResourceId,

    /// Distinguishes a resource from an earlier one with the same name.
    pub uid: Option<String>,
    pub generation: i64,

    /// Orders resources when they compete for the same routing space.
    pub creation_timestamp: Option<DateTime<Utc>>,

    pub labels: BTreeMap<String, String>,
    pub spec: ResourceSpec,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceSpec {
    VirtualHost(VirtualHostRoot),
    RouteFragment(RouteFragment),
    Listener(ListenerResource),

    /// The resource could not be interpreted at all, e.g. because its
    /// hostname is malformed.
    Rejected { detail: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualHostRoot {
    pub hostname: HostMatch,
    pub tls: Option<TlsDescriptor>,
    pub routes: RouteSet,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteFragment {
    pub routes: RouteSet,
}

/// The routes declared by a virtual host or fragment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteSet {
    pub rules: Vec<RouteRule>,

    /// Declared routes that could not be interpreted. These are reported
    /// against the owning resource but never affect sibling rules.
    pub malformed: Vec<MalformedRule>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MalformedRule {
    pub index: usize,
    pub detail: String,
}

/// Orders resources oldest first. Resources without a creation timestamp
/// sort after all timestamped resources; identity breaks ties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Precedence {
    created: Option<DateTime<Utc>>,
    id: ResourceId,
}

// === impl ResourceKind ===

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualHost => "VirtualHost",
            Self::RouteFragment => "RouteFragment",
            Self::Listener => "Listener",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl ResourceId ===

impl ResourceId {
    pub fn new(kind: ResourceKind, namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn virtual_host(namespace: impl ToString, name: impl ToString) -> Self {
        Self::new(ResourceKind::VirtualHost, namespace, name)
    }

    pub fn fragment(namespace: impl ToString, name: impl ToString) -> Self {
        Self::new(ResourceKind::RouteFragment, namespace, name)
    }

    pub fn listener(namespace: impl ToString, name: impl ToString) -> Self {
        Self::new(ResourceKind::Listener, namespace, name)
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

// === impl RoutingResource ===

impl RoutingResource {
    pub fn precedence(&self) -> Precedence {
        Precedence {
            created: self.creation_timestamp,
            id: self.id.clone(),
        }
    }

    /// Returns the routes declared by a virtual host or fragment.
    pub fn routes(&self) -> Option<&RouteSet> {
        match &self.spec {
            ResourceSpec::VirtualHost(vh) => Some(&vh.routes),
            ResourceSpec::RouteFragment(frag) => Some(&frag.routes),
            ResourceSpec::Listener(_) | ResourceSpec::Rejected { .. } => None,
        }
    }
}

// === impl Precedence ===

impl Ord for Precedence {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_ts = match (&self.created, &other.created) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_ts.then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Precedence {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
