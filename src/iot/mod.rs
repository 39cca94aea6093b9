//! Lock vendor integration.
//!
//! The vendor exposes a single form-encoded endpoint; every call carries a
//! signed parameter set and instructions are free-text templates relayed to
//! the lock over GPRS.

pub mod client;
pub mod credentials;
pub mod protocol;

pub use client::{IotClient, UnlockOutcome};
pub use credentials::IotCredentialState;
pub use protocol::{LockState, TokenGrant, UnlockReply};
