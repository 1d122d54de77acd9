#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod routing;

pub use self::routing::{
    Listener, ListenerSpec, RouteFragment, RouteFragmentSpec, RoutingStatus, VirtualHost,
    VirtualHostSpec,
};
pub use k8s_openapi::{api, apimachinery::pkg::apis::meta::v1::Time, NamespaceResourceScope};
pub use kube::{
    api::{Api, ObjectMeta, Patch, PatchParams, Resource, ResourceExt},
    Client, Error,
};

/// The API group that owns every routing resource kind.
pub const ROUTING_API_GROUP: &str = "routing.ingress-controller.io";
pub const ROUTING_API_VERSION: &str = "routing.ingress-controller.io/v1alpha1";
