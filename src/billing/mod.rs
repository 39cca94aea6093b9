//! Top-up lifecycle: pending record, checkout link, idempotent settlement.

pub mod model;
pub mod service;

pub use model::{Settlement, Topup, TopupStatus};
pub use service::BillingService;
