//! Hosted checkout integration for balance top-ups.

pub mod client;
pub mod model;

pub use client::CheckoutClient;
pub use model::{CallbackParams, ExternalReference, PaymentStatus, PreferenceResponse};
