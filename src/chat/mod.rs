//! WhatsApp conversation: session state, input parsing, and the flow engine.

pub mod engine;
pub mod parse;
pub mod session;

pub use engine::ChatEngine;
pub use session::{Session, SessionStep, SessionStore};
