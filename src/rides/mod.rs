//! Ride ledger and the lock-state watchdog.

pub mod model;
pub mod service;
pub mod watchdog;

pub use model::{billed_minutes, FinalizeOutcome, Ride, RideReceipt, RideStart, RideStatus};
pub use service::RideService;
pub use watchdog::RideWatchdog;
