//! Error types for sealed-compute task operations.
//!
//! Provides [`TaskError`], a single taxonomy shared by every lifecycle stage.
//! Each variant carries enough context (task id, last observed status,
//! attempt counts) to diagnose a failure without retrying blindly.

use thiserror::Error;

use crate::types::ids::TaskId;
use crate::types::status::EthStatus;

/// Convenience alias used throughout the sealed-compute crates.
pub type Result<T, E = TaskError> = std::result::Result<T, E>;

/// Errors that can occur while building, submitting, tracking, fetching or
/// decrypting a task.
///
/// Only [`Transport`](TaskError::Transport) is retried internally; see
/// [`is_retryable`](TaskError::is_retryable).
///
/// # Examples
///
/// ```
/// use sealed_compute_types::{TaskError, TaskId};
///
/// let err = TaskError::NotFound {
///     task_id: TaskId::new([0xaa; 32]),
/// };
/// assert!(!err.is_retryable());
/// assert!(err.to_string().contains("0xaaaa"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// An argument's declared type does not match its value, or the function
    /// signature is malformed.
    #[error("encoding error: {reason}")]
    Encoding {
        /// What was wrong with the input.
        reason: String,
    },

    /// The ledger rejected the submission transaction.
    #[error("submission rejected: {reason}")]
    Submission {
        /// Revert or rejection reason reported by the ledger.
        reason: String,
    },

    /// The identifier is unknown to the ledger or worker.
    #[error("task not found: {task_id}")]
    NotFound {
        /// The unknown task.
        task_id: TaskId,
    },

    /// Polling exhausted its attempts without reaching a terminal status.
    #[error("timed out waiting for task {task_id} after {attempts} reads (last status: {last_status})")]
    Timeout {
        /// The task being polled.
        task_id: TaskId,
        /// Number of reads issued.
        attempts: u32,
        /// Last status observed before giving up.
        last_status: EthStatus,
    },

    /// The observed status regressed or a terminal status changed.
    #[error("inconsistent state for task {task_id}: observed {observed} after {previous}")]
    InconsistentState {
        /// The task being polled.
        task_id: TaskId,
        /// Previously observed status.
        previous: EthStatus,
        /// The offending observation.
        observed: EthStatus,
    },

    /// Network failure talking to the Worker Service.
    #[error("transport error after {attempts} attempt(s): {message}")]
    Transport {
        /// The task being fetched, if the call was task-scoped.
        task_id: Option<TaskId>,
        /// Attempts made before surfacing.
        attempts: u32,
        /// Underlying failure.
        message: String,
    },

    /// The worker signature does not match the expected identity.
    #[error("verification failed for task {task_id}: {reason}")]
    Verification {
        /// The task whose result failed verification.
        task_id: TaskId,
        /// Why verification failed.
        reason: String,
    },

    /// Authenticated decryption failed.
    #[error("decryption failed: {reason}")]
    Decryption {
        /// Why decryption failed.
        reason: String,
    },

    /// The task record is not terminal yet.
    #[error("task not in terminal state: {task_id} (status: {current_status})")]
    NotReady {
        /// The task.
        task_id: TaskId,
        /// Its current, non-terminal status.
        current_status: EthStatus,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled{}", cancelled_suffix(.task_id))]
    Cancelled {
        /// The task whose operation was cancelled, if known.
        task_id: Option<TaskId>,
    },

    /// The ledger reported a status code outside the configured table.
    #[error("unknown status code {code} for task {task_id}")]
    UnknownStatusCode {
        /// The task.
        task_id: TaskId,
        /// The unmapped raw code.
        code: i64,
    },

    /// Key material could not be parsed or used.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// A counterparty returned a malformed payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Client configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Configuration(String),
}

fn cancelled_suffix(task_id: &Option<TaskId>) -> String {
    task_id
        .map(|id| format!(" for task {id}"))
        .unwrap_or_default()
}

impl TaskError {
    /// Returns `true` if the failure is transient and worth retrying.
    ///
    /// Only transport failures qualify. Verification and decryption failures
    /// are fatal: a forged or corrupted result stays forged on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// The task this error refers to, when known.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::NotFound { task_id }
            | Self::Timeout { task_id, .. }
            | Self::InconsistentState { task_id, .. }
            | Self::Verification { task_id, .. }
            | Self::NotReady { task_id, .. }
            | Self::UnknownStatusCode { task_id, .. } => Some(*task_id),
            Self::Transport { task_id, .. } | Self::Cancelled { task_id } => *task_id,
            Self::Encoding { .. }
            | Self::Submission { .. }
            | Self::Decryption { .. }
            | Self::Crypto(_)
            | Self::Protocol(_)
            | Self::Configuration(_) => None,
        }
    }

    /// Shorthand for an [`Encoding`](TaskError::Encoding) error.
    pub fn encoding(reason: impl Into<String>) -> Self {
        Self::Encoding {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Submission`](TaskError::Submission) error.
    pub fn submission(reason: impl Into<String>) -> Self {
        Self::Submission {
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`Decryption`](TaskError::Decryption) error.
    pub fn decryption(reason: impl Into<String>) -> Self {
        Self::Decryption {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> TaskId {
        TaskId::new([0x11; 32])
    }

    #[test]
    fn error_display_messages() {
        let err = TaskError::Timeout {
            task_id: id(),
            attempts: 5,
            last_status: EthStatus::InProgress,
        };
        let text = err.to_string();
        assert!(text.contains("5 reads"));
        assert!(text.contains("IN_PROGRESS"));

        let err = TaskError::Cancelled { task_id: None };
        assert_eq!(err.to_string(), "operation cancelled");

        let err = TaskError::Cancelled {
            task_id: Some(id()),
        };
        assert!(err.to_string().ends_with(&id().to_string()));
    }

    #[test]
    fn only_transport_is_retryable() {
        assert!(TaskError::Transport {
            task_id: None,
            attempts: 1,
            message: "connection refused".to_string(),
        }
        .is_retryable());
        assert!(!TaskError::Verification {
            task_id: id(),
            reason: "bad signer".to_string(),
        }
        .is_retryable());
        assert!(!TaskError::decryption("tag mismatch").is_retryable());
        assert!(!TaskError::submission("revert").is_retryable());
    }

    #[test]
    fn task_id_context_is_exposed() {
        let err = TaskError::InconsistentState {
            task_id: id(),
            previous: EthStatus::InProgress,
            observed: EthStatus::RecordCreated,
        };
        assert_eq!(err.task_id(), Some(id()));
        assert_eq!(TaskError::encoding("bad").task_id(), None);
    }
}
