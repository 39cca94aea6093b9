//! HTTP handlers for the Rodada API

mod chat;
mod payments;
mod unlock;

pub use chat::{inbound_message, InboundMessage};
pub use payments::payment_callback;
pub use unlock::{redeem_unlock_code, UnlockRequest, UnlockResponse};
