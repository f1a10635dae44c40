//! Ledger boundary.
//!
//! The ledger records submitted tasks and their on-chain status. The client
//! only needs two calls, captured by the [`Ledger`] trait; chain RPC,
//! accounts and transaction signing live behind it.
//!
//! # Backends
//!
//! - [`InMemoryLedger`](memory::InMemoryLedger) -- `DashMap`-backed ledger
//!   with fee accounting and worker-side transitions, for simulation and
//!   tests.
//!
//! Wrap a backend in `Arc<dyn Ledger>` to share it between the client, its
//! pollers and spawned lifecycles.

pub mod memory;

use async_trait::async_trait;

use sealed_compute_types::{LedgerRecord, Result, TaskDescriptor, TaskId};

pub use memory::InMemoryLedger;

/// Client-side view of the ledger.
///
/// # Errors
///
/// - [`submit`](Ledger::submit) returns
///   [`TaskError::Submission`](sealed_compute_types::TaskError::Submission)
///   when the transaction reverts (duplicate task, insufficient fee balance,
///   zero gas).
/// - [`read_record`](Ledger::read_record) returns
///   [`TaskError::NotFound`](sealed_compute_types::TaskError::NotFound) for
///   unknown ids.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submits a task and returns the id the ledger recorded it under.
    async fn submit(&self, descriptor: &TaskDescriptor) -> Result<TaskId>;

    /// Reads the raw record of a task.
    async fn read_record(&self, task_id: &TaskId) -> Result<LedgerRecord>;
}
