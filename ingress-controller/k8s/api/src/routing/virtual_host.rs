use super::{Route, RoutingStatus, TlsRef};

/// A VirtualHost is the root of a routing tree. It claims a hostname and
/// declares routes, some of which may delegate a portion of the path space
/// to `RouteFragment`s owned by other teams.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    kube::CustomResource,
    serde::Deserialize,
    serde::Serialize,
    schemars::JsonSchema,
)]
#[kube(
    group = "routing.ingress-controller.io",
    version = "v1alpha1",
    kind = "VirtualHost",
    status = "RoutingStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct VirtualHostSpec {
    /// The fully qualified name served by this virtual host. The first label
    /// may be `*` to match any single label.
    pub hostname: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsRef>,

    #[serde(default)]
    pub routes: Vec<Route>,
}
