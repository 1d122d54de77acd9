//! Ingress routing resolution
//!
//! Routing configuration is authored as independent resources, possibly by
//! different teams in different namespaces:
//!
//! - A `VirtualHost` claims a hostname and declares routes. A route either
//!   forwards to backends or delegates a portion of the request space to a
//!   `RouteFragment`.
//! - A `RouteFragment` declares routes of its own, which must stay within the
//!   space delegated to it, and may delegate further.
//! - A `Listener` declares a protocol and port (and optionally a hostname and
//!   TLS material) and binds to virtual hosts by namespace and labels.
//!
//! ```text
//! [ Listener ] -> [ VirtualHost ] -> [ RouteFragment ] -> [ RouteFragment ] ...
//! ```
//!
//! The [`Store`] keeps the latest version of each resource as observed by
//! Kubernetes watches and signals when it changes. Each resolution pass takes
//! an immutable [`Snapshot`] and [`resolve`]s it into a `GraphSnapshot` (a
//! flattened route table per virtual host and the merged physical listeners)
//! along with the validity outcome of every resource. A pass never observes
//! changes made while it runs; a superseded pass is simply replaced by the
//! next one.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod delegation;
pub mod graph;
mod index;
mod listeners;
mod matches;
pub mod metrics;
pub mod resource;
mod resolve;
mod store;


pub use self::{
    metrics::{IndexMetrics, ResolveMetrics, SizedIndex},
    resolve::{resolve, Resolution},
    store::{SharedStore, Snapshot, Store},
};
