//! Ledger task records, raw and decoded.

use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::types::ids::TaskId;
use crate::types::status::{EthStatus, StatusCodes};

/// Task record exactly as the ledger reports it.
///
/// The status is a raw integer; decode it with a [`StatusCodes`] table via
/// [`LedgerRecord::decode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRecord {
    /// Raw on-chain status code.
    pub eth_status: i64,
    /// Block in which the record was created.
    pub block_number: u64,
}

impl LedgerRecord {
    /// Decodes the raw status for `task_id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sealed_compute_types::{EthStatus, LedgerRecord, StatusCodes, TaskId};
    ///
    /// let raw = LedgerRecord { eth_status: 1, block_number: 12 };
    /// let record = raw.decode(TaskId::new([1; 32]), &StatusCodes::default()).unwrap();
    /// assert_eq!(record.eth_status, EthStatus::InProgress);
    /// assert_eq!(record.block_number, 12);
    ///
    /// let bad = LedgerRecord { eth_status: 9, block_number: 12 };
    /// assert!(bad.decode(TaskId::new([1; 32]), &StatusCodes::default()).is_err());
    /// ```
    pub fn decode(&self, task_id: TaskId, codes: &StatusCodes) -> Result<TaskRecord, TaskError> {
        let eth_status = codes
            .decode(self.eth_status)
            .ok_or(TaskError::UnknownStatusCode {
                task_id,
                code: self.eth_status,
            })?;
        Ok(TaskRecord {
            task_id,
            eth_status,
            block_number: self.block_number,
        })
    }
}

/// A decoded snapshot of a task's on-chain record.
///
/// Records are owned by the ledger; the client only ever observes snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    /// The task this record belongs to.
    pub task_id: TaskId,
    /// Current on-chain status.
    pub eth_status: EthStatus,
    /// Block in which the record was created.
    pub block_number: u64,
}

impl TaskRecord {
    /// Returns `true` once the record reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.eth_status.is_terminal()
    }
}
