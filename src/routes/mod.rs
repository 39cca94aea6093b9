//! Route definitions for the Rodada API

mod chat;
mod payments;
mod unlock;

pub use chat::chat_routes;
pub use payments::payment_routes;
pub use unlock::unlock_routes;
