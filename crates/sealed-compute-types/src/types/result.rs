//! Worker results and their decrypted outcome.

use serde::{Deserialize, Serialize};

use crate::types::ids::TaskId;
use crate::types::status::EngStatus;

/// Encrypted result of a task as returned by the worker, plus the decrypted
/// payload once available.
///
/// A `TaskResult` is owned by the flow that requested it. Only the decryptor
/// fills in `decrypted_output`; everything else is fixed at fetch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    /// The task this result belongs to.
    pub task_id: TaskId,

    /// Logical outcome reported by the worker.
    pub eng_status: EngStatus,

    /// Ciphertext of the return value or error message.
    #[serde(with = "crate::hex")]
    pub encrypted_abi_encoded_outputs: Vec<u8>,

    /// Worker signature over `encrypted_abi_encoded_outputs ‖ task_id`.
    #[serde(with = "crate::hex")]
    pub worker_task_sig: Vec<u8>,

    /// Plaintext output, present only after successful decryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decrypted_output: Option<Vec<u8>>,
}

/// Interpretation of a decrypted result, branched on [`EngStatus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// ABI-encoded return data of a successful call.
    Return(Vec<u8>),
    /// Human-readable error reported by the worker.
    Error(String),
}

impl TaskResult {
    /// Signed message for this result: `encrypted_abi_encoded_outputs ‖ task_id`.
    ///
    /// # Examples
    ///
    /// ```
    /// use sealed_compute_types::{EngStatus, TaskId, TaskResult};
    ///
    /// let result = TaskResult {
    ///     task_id: TaskId::new([9; 32]),
    ///     eng_status: EngStatus::Success,
    ///     encrypted_abi_encoded_outputs: vec![1, 2, 3],
    ///     worker_task_sig: vec![],
    ///     decrypted_output: None,
    /// };
    /// let message = result.signed_message();
    /// assert_eq!(message.len(), 3 + 32);
    /// assert_eq!(&message[..3], &[1, 2, 3]);
    /// ```
    pub fn signed_message(&self) -> Vec<u8> {
        let mut message =
            Vec::with_capacity(self.encrypted_abi_encoded_outputs.len() + TaskId::LEN);
        message.extend_from_slice(&self.encrypted_abi_encoded_outputs);
        message.extend_from_slice(self.task_id.as_bytes());
        message
    }

    /// Returns `true` once the output has been decrypted.
    pub fn is_decrypted(&self) -> bool {
        self.decrypted_output.is_some()
    }

    /// Interprets the decrypted output according to the engine status.
    ///
    /// Returns `None` before decryption. A `FAILED` result is always read as
    /// an error message (lossy UTF-8), never as return data.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        let output = self.decrypted_output.as_ref()?;
        Some(match self.eng_status {
            EngStatus::Success => TaskOutcome::Return(output.clone()),
            EngStatus::Failed => TaskOutcome::Error(String::from_utf8_lossy(output).into_owned()),
        })
    }

    /// The worker's error message, for decrypted `FAILED` results.
    pub fn error_message(&self) -> Option<String> {
        match self.outcome()? {
            TaskOutcome::Error(message) => Some(message),
            TaskOutcome::Return(_) => None,
        }
    }
}
