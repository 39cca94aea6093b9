//! Fleet registry: bikes and fare plans.

pub mod model;
pub mod service;

pub use model::{Bike, BikeLookup, FarePlan};
pub use service::RegistryService;
