//! In-memory ledger.
//!
//! [`InMemoryLedger`] keeps task records and fee balances in `DashMap`s and a
//! block counter in an atomic. Besides the client-facing [`Ledger`] calls it
//! exposes the operations a worker network performs on-chain (picking up a
//! task, committing its receipt) and a few test hooks:
//!
//! - [`script_statuses`](InMemoryLedger::script_statuses) replays a fixed
//!   sequence of raw status codes, one per read.
//! - [`drop_record`](InMemoryLedger::drop_record) and
//!   [`move_to_block`](InMemoryLedger::move_to_block) simulate reorgs.
//! - [`read_count`](InMemoryLedger::read_count) counts record reads.
//!
//! # Examples
//!
//! ```
//! use sealed_compute::ledger::InMemoryLedger;
//! use sealed_compute::types::{to_grains, Address};
//!
//! let ledger = InMemoryLedger::new();
//! let sender = Address::repeat_byte(0x5e);
//! ledger.fund(sender, to_grains(10));
//! assert_eq!(ledger.balance(&sender), 1_000_000_000);
//! assert_eq!(ledger.current_block(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, info};

use sealed_compute_types::{
    Address, EthStatus, LedgerRecord, Result, StatusCodes, TaskDescriptor, TaskError, TaskId,
};

use super::Ledger;
use crate::builder::expected_task_id;

#[derive(Debug)]
struct StoredTask {
    descriptor: TaskDescriptor,
    status: i64,
    block_number: u64,
    script: VecDeque<i64>,
}

/// Thread-safe in-memory [`Ledger`].
#[derive(Debug)]
pub struct InMemoryLedger {
    records: DashMap<TaskId, StoredTask>,
    balances: DashMap<Address, u128>,
    block: AtomicU64,
    reads: AtomicU64,
    codes: StatusCodes,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedger {
    /// Creates an empty ledger using the default status codes.
    pub fn new() -> Self {
        Self::with_status_codes(StatusCodes::default())
    }

    /// Creates an empty ledger that reports statuses with `codes`.
    pub fn with_status_codes(codes: StatusCodes) -> Self {
        Self {
            records: DashMap::new(),
            balances: DashMap::new(),
            block: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            codes,
        }
    }

    /// Credits `grains` to `account`.
    pub fn fund(&self, account: Address, grains: u128) {
        let mut balance = self.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(grains);
    }

    /// Fee balance of `account`, in grains.
    pub fn balance(&self, account: &Address) -> u128 {
        self.balances.get(account).map(|b| *b).unwrap_or(0)
    }

    /// Number of the most recently mined block.
    pub fn current_block(&self) -> u64 {
        self.block.load(Ordering::SeqCst)
    }

    /// Total [`read_record`](Ledger::read_record) calls so far, including
    /// reads of unknown tasks.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// The descriptor a task was submitted with.
    pub fn descriptor(&self, task_id: &TaskId) -> Option<TaskDescriptor> {
        self.records.get(task_id).map(|t| t.descriptor.clone())
    }

    /// Current status of a task, decoded.
    pub fn status(&self, task_id: &TaskId) -> Option<EthStatus> {
        self.records
            .get(task_id)
            .and_then(|t| self.codes.decode(t.status))
    }

    /// Tasks waiting for a worker, oldest block first.
    pub fn pending_tasks(&self) -> Vec<TaskDescriptor> {
        let mut pending: Vec<(u64, TaskDescriptor)> = self
            .records
            .iter()
            .filter(|t| t.status == self.codes.record_created && t.script.is_empty())
            .map(|t| (t.block_number, t.descriptor.clone()))
            .collect();
        pending.sort_by_key(|(block, _)| *block);
        pending.into_iter().map(|(_, d)| d).collect()
    }

    /// Marks a created task as picked up by a worker.
    pub fn start(&self, task_id: &TaskId) -> Result<()> {
        self.transition(task_id, EthStatus::InProgress)
    }

    /// Settles a task: `ReceiptVerified` when `verified`, `Failed` otherwise.
    pub fn commit(&self, task_id: &TaskId, verified: bool) -> Result<()> {
        let status = if verified {
            EthStatus::ReceiptVerified
        } else {
            EthStatus::Failed
        };
        self.transition(task_id, status)
    }

    fn transition(&self, task_id: &TaskId, next: EthStatus) -> Result<()> {
        let mut task = self
            .records
            .get_mut(task_id)
            .ok_or(TaskError::NotFound { task_id: *task_id })?;
        let current = self
            .codes
            .decode(task.status)
            .ok_or(TaskError::UnknownStatusCode {
                task_id: *task_id,
                code: task.status,
            })?;
        current.validate_progression(task_id, &next)?;
        task.status = self.codes.encode(next);
        debug!(task_id = %task_id, from = %current, to = %next, "ledger status transition");
        Ok(())
    }

    /// Replaces the status of a task with a scripted sequence of raw codes.
    ///
    /// Each read pops the next code; once the script is exhausted the last
    /// code keeps being reported.
    pub fn script_statuses(&self, task_id: &TaskId, codes: Vec<i64>) -> Result<()> {
        let mut task = self
            .records
            .get_mut(task_id)
            .ok_or(TaskError::NotFound { task_id: *task_id })?;
        task.script = codes.into();
        Ok(())
    }

    /// Removes a record, as if its block was reorganized away.
    pub fn drop_record(&self, task_id: &TaskId) -> Option<TaskDescriptor> {
        self.records.remove(task_id).map(|(_, t)| t.descriptor)
    }

    /// Moves a record to another block.
    pub fn move_to_block(&self, task_id: &TaskId, block_number: u64) -> Result<()> {
        let mut task = self
            .records
            .get_mut(task_id)
            .ok_or(TaskError::NotFound { task_id: *task_id })?;
        task.block_number = block_number;
        Ok(())
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn submit(&self, descriptor: &TaskDescriptor) -> Result<TaskId> {
        let task_id = descriptor.task_id;

        if descriptor.gas_limit == 0 {
            return Err(TaskError::submission("gas limit must be greater than zero"));
        }
        if expected_task_id(descriptor) != task_id {
            return Err(TaskError::submission(format!(
                "task id {task_id} does not match the task contents"
            )));
        }

        let slot = match self.records.entry(task_id) {
            Entry::Occupied(_) => {
                return Err(TaskError::submission(format!("task {task_id} already exists")));
            },
            Entry::Vacant(slot) => slot,
        };

        let fee = descriptor.fee();
        {
            let mut balance = self.balances.entry(descriptor.sender).or_insert(0);
            if *balance < fee {
                return Err(TaskError::submission(format!(
                    "insufficient balance for {}: need {fee} grains, have {}",
                    descriptor.sender, *balance
                )));
            }
            *balance -= fee;
        }

        let block_number = self.block.fetch_add(1, Ordering::SeqCst) + 1;
        slot.insert(StoredTask {
            descriptor: descriptor.clone(),
            status: self.codes.record_created,
            block_number,
            script: VecDeque::new(),
        });

        info!(task_id = %task_id, block_number, fee, "task record created");
        Ok(task_id)
    }

    async fn read_record(&self, task_id: &TaskId) -> Result<LedgerRecord> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let mut task = self
            .records
            .get_mut(task_id)
            .ok_or(TaskError::NotFound { task_id: *task_id })?;
        if let Some(code) = task.script.pop_front() {
            task.status = code;
        }
        Ok(LedgerRecord {
            eth_status: task.status,
            block_number: task.block_number,
        })
    }
}
