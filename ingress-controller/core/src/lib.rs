#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod graph;
mod hostname;
pub mod http_route;
pub mod listener;
mod resource;
pub mod validity;

pub use self::{
    hostname::{HostMatch, InvalidHostname},
    resource::{
        MalformedRule, Precedence, ResourceId, ResourceKind, ResourceSpec, RouteFragment,
        RouteSet, RoutingResource, VirtualHostRoot,
    },
};
