//! Rider accounts and the balance ledger.

pub mod model;
pub mod service;

pub use model::{LedgerEntry, LedgerKind, NewRider, RegisterOutcome, Rider};
pub use service::{apply_balance_delta, RiderService};
