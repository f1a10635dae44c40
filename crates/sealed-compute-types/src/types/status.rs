//! On-chain and engine-level task statuses.
//!
//! [`EthStatus`] is the ledger-maintained lifecycle of a task record;
//! [`EngStatus`] is the worker-reported logical outcome of running the task's
//! function. The two are independent: a record can settle at
//! `ReceiptVerified` while the computation itself reported `Failed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{FAILED_CODE, IN_PROGRESS_CODE, RECEIPT_VERIFIED_CODE, RECORD_CREATED_CODE};
use crate::error::TaskError;
use crate::types::ids::TaskId;

/// Ledger-maintained status of a task record.
///
/// # State Machine
///
/// ```text
/// RecordCreated -> InProgress -> ReceiptVerified (terminal)
///                             -> Failed          (terminal)
/// ```
///
/// Repeated observations of the same status are allowed. A status whose
/// [`rank`](Self::rank) is lower than a previously observed one, or any
/// change after a terminal status, is a protocol violation.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::EthStatus;
///
/// assert!(!EthStatus::InProgress.is_terminal());
/// assert!(EthStatus::Failed.is_terminal());
/// assert!(EthStatus::RecordCreated.can_progress_to(&EthStatus::InProgress));
/// assert!(!EthStatus::InProgress.can_progress_to(&EthStatus::RecordCreated));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EthStatus {
    /// The submission transaction was mined.
    RecordCreated,
    /// A worker picked up the task.
    InProgress,
    /// The worker's receipt was verified on-chain (terminal).
    ReceiptVerified,
    /// The task failed on-chain (terminal).
    Failed,
}

impl fmt::Display for EthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecordCreated => write!(f, "RECORD_CREATED"),
            Self::InProgress => write!(f, "IN_PROGRESS"),
            Self::ReceiptVerified => write!(f, "RECEIPT_VERIFIED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

impl EthStatus {
    /// Returns `true` for `ReceiptVerified` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::ReceiptVerified | Self::Failed)
    }

    /// Position in the progression. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            Self::RecordCreated => 0,
            Self::InProgress => 1,
            Self::ReceiptVerified | Self::Failed => 2,
        }
    }

    /// Returns `true` if observing `next` after `self` is consistent with the
    /// monotonic progression.
    ///
    /// Self-observations are accepted (polling sees the same status many
    /// times). Terminal states only accept themselves.
    pub fn can_progress_to(&self, next: &Self) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() {
            return false;
        }
        next.rank() > self.rank()
    }

    /// Validates an observed progression for `task_id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sealed_compute_types::{EthStatus, TaskError, TaskId};
    ///
    /// let id = TaskId::new([7; 32]);
    /// assert!(EthStatus::InProgress.validate_progression(&id, &EthStatus::Failed).is_ok());
    ///
    /// let err = EthStatus::InProgress
    ///     .validate_progression(&id, &EthStatus::RecordCreated)
    ///     .unwrap_err();
    /// assert!(matches!(err, TaskError::InconsistentState { .. }));
    /// ```
    pub fn validate_progression(&self, task_id: &TaskId, next: &Self) -> Result<(), TaskError> {
        if self.can_progress_to(next) {
            Ok(())
        } else {
            Err(TaskError::InconsistentState {
                task_id: *task_id,
                previous: *self,
                observed: *next,
            })
        }
    }
}

/// Worker-reported outcome of executing the task's function.
///
/// Serialized as `"SUCCESS"` / `"FAILED"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngStatus {
    /// The function returned normally; output is ABI-encoded return data.
    Success,
    /// The function failed; output is a human-readable error message.
    Failed,
}

impl fmt::Display for EngStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

/// Mapping between raw ledger status codes and [`EthStatus`].
///
/// Keyed by name rather than position, so a ledger that numbers its states
/// differently only needs a different table.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::{EthStatus, StatusCodes};
///
/// let codes = StatusCodes::default();
/// assert_eq!(codes.decode(3), Some(EthStatus::Failed));
/// assert_eq!(codes.encode(EthStatus::InProgress), 1);
/// assert_eq!(codes.decode(42), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusCodes {
    /// Code for `RecordCreated`.
    pub record_created: i64,
    /// Code for `InProgress`.
    pub in_progress: i64,
    /// Code for `ReceiptVerified`.
    pub receipt_verified: i64,
    /// Code for `Failed`.
    pub failed: i64,
}

impl Default for StatusCodes {
    fn default() -> Self {
        Self {
            record_created: RECORD_CREATED_CODE,
            in_progress: IN_PROGRESS_CODE,
            receipt_verified: RECEIPT_VERIFIED_CODE,
            failed: FAILED_CODE,
        }
    }
}

impl StatusCodes {
    /// Maps a raw code to a status, or `None` if the code is not in the table.
    pub fn decode(&self, code: i64) -> Option<EthStatus> {
        if code == self.record_created {
            Some(EthStatus::RecordCreated)
        } else if code == self.in_progress {
            Some(EthStatus::InProgress)
        } else if code == self.receipt_verified {
            Some(EthStatus::ReceiptVerified)
        } else if code == self.failed {
            Some(EthStatus::Failed)
        } else {
            None
        }
    }

    /// Maps a status to its raw code.
    pub fn encode(&self, status: EthStatus) -> i64 {
        match status {
            EthStatus::RecordCreated => self.record_created,
            EthStatus::InProgress => self.in_progress,
            EthStatus::ReceiptVerified => self.receipt_verified,
            EthStatus::Failed => self.failed,
        }
    }

    /// Rejects tables where two statuses share one raw code, since
    /// [`decode`](Self::decode) could not tell them apart.
    pub fn validate(&self) -> Result<(), TaskError> {
        let entries = [
            (EthStatus::RecordCreated, self.record_created),
            (EthStatus::InProgress, self.in_progress),
            (EthStatus::ReceiptVerified, self.receipt_verified),
            (EthStatus::Failed, self.failed),
        ];
        for (index, (status, code)) in entries.iter().enumerate() {
            if let Some((other, _)) = entries[index + 1..].iter().find(|(_, c)| c == code) {
                return Err(TaskError::Configuration(format!(
                    "status code {code} is assigned to both {status} and {other}"
                )));
            }
        }
        Ok(())
    }
}
