//! Outbound WhatsApp delivery.

pub mod client;

pub use client::WhatsAppClient;
