pub mod listener;
pub mod route;
pub mod route_fragment;
pub mod status;
pub mod virtual_host;

pub use self::{
    listener::{Listener, ListenerSpec},
    route::{Backend, DelegateRef, HeaderMatch, Match, PathMatch, Route, TlsRef},
    route_fragment::{RouteFragment, RouteFragmentSpec},
    status::{RoutingStatus, Validity, ValidityCondition},
    virtual_host::{VirtualHost, VirtualHostSpec},
};
