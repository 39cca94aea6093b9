//! Single-use unlock codes with a short TTL.

pub mod model;
pub mod store;

pub use model::{Redemption, UnlockToken};
pub use store::TokenStore;
