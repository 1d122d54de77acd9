#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use ingress_controller_core as core;
pub use ingress_controller_k8s_api as k8s;
pub use ingress_controller_k8s_index as index;
pub use ingress_controller_k8s_status as status;

mod args;
mod lease;
mod resolver;

pub use self::args::Args;
