//! Wire and domain types for the sealed-compute task lifecycle.
//!
//! A confidential task is submitted to a ledger, executed off-chain by a
//! worker, and its encrypted result fetched back by the client. This crate
//! holds the value types that flow between those stages, the on-chain status
//! state machine, and the shared error taxonomy.
//!
//! # Overview
//!
//! A task record progresses through a monotonic state machine:
//! `RecordCreated -> InProgress -> ReceiptVerified | Failed`. The two last
//! states are terminal. Independently, the worker reports a logical outcome
//! ([`EngStatus`]) for the computation itself.
//!
//! # Module Organization
//!
//! - [`types`] - Identifiers, statuses, descriptors, records and results
//! - [`error`] - [`TaskError`] with diagnostic context per variant
//! - [`constants`] - Default status codes and token units
//! - [`hex`] - Serde helpers for `0x`-prefixed byte strings

pub mod constants;
pub mod error;
pub mod hex;
pub mod types;

pub use constants::*;
pub use error::{Result, TaskError};
pub use types::*;
