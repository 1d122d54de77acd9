#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod controller;
mod index;
mod metrics;
pub mod records;


pub use self::{
    controller::{Controller, FIELD_MANAGER},
    index::{Index, SharedIndex, Update},
    metrics::{ControllerMetrics, IndexMetrics},
};
