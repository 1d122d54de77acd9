use super::{Route, RoutingStatus};

/// A RouteFragment declares routes without a hostname. It only takes effect
/// when a VirtualHost (or another reachable fragment) delegates to it.
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
    kind = "RouteFragment",
    status = "RoutingStatus",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct RouteFragmentSpec {
    #[serde(default)]
    pub routes: Vec<Route>,
}
