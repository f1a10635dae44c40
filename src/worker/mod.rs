//! Worker Service boundary.
//!
//! The Worker Service hands out the public key tasks are encrypted against
//! and, once a task settled on the ledger, its encrypted and signed result.
//!
//! - [`WorkerService`] - the two calls the client makes
//! - [`WorkerResult`] - result payload as returned on the wire
//! - [`WorkerEncryptionKey`] - signed encryption key as returned on the wire
//! - [`http::HttpWorkerService`] - JSON-RPC 2.0 over HTTP (feature
//!   `http-client`)

#[cfg(feature = "http-client")]
pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sealed_compute_types::{Address, EngStatus, Result, TaskError, TaskId, TaskResult};

use crate::builder::WorkerKey;
use crate::crypto;

#[cfg(feature = "http-client")]
pub use http::HttpWorkerService;

/// Client-side view of the Worker Service.
///
/// Implementations report network failures as
/// [`TaskError::Transport`] so callers can retry them, and unknown tasks as
/// [`TaskError::NotFound`].
#[async_trait]
pub trait WorkerService: Send + Sync {
    /// Fetches the encrypted result of a settled task.
    async fn get_result(&self, task_id: &TaskId) -> Result<WorkerResult>;

    /// Fetches the worker's signed encryption key.
    async fn get_encryption_key(&self) -> Result<WorkerEncryptionKey>;
}

/// A task result as returned by the Worker Service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerResult {
    /// Logical outcome of the computation.
    pub eng_status: EngStatus,
    /// Encrypted return data or error message.
    #[serde(with = "sealed_compute_types::hex")]
    pub encrypted_abi_encoded_outputs: Vec<u8>,
    /// Signature over `encrypted_abi_encoded_outputs ‖ task_id`.
    #[serde(with = "sealed_compute_types::hex")]
    pub worker_task_sig: Vec<u8>,
}

impl WorkerResult {
    /// Attaches the result to its task.
    pub fn into_task_result(self, task_id: TaskId) -> TaskResult {
        TaskResult {
            task_id,
            eng_status: self.eng_status,
            encrypted_abi_encoded_outputs: self.encrypted_abi_encoded_outputs,
            worker_task_sig: self.worker_task_sig,
            decrypted_output: None,
        }
    }
}

/// The worker's encryption key, signed by its signing key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerEncryptionKey {
    /// Public encryption key (64-byte uncompressed without prefix).
    #[serde(with = "sealed_compute_types::hex")]
    pub worker_encryption_key: Vec<u8>,
    /// Signature over the key bytes.
    #[serde(with = "sealed_compute_types::hex")]
    pub worker_sig: Vec<u8>,
}

impl WorkerEncryptionKey {
    /// Verifies the signature and returns the worker identity.
    ///
    /// When `expected` is set, the recovered signer must match it.
    pub fn verify(&self, expected: Option<Address>) -> Result<WorkerKey> {
        let signer = crypto::recover_address(&self.worker_encryption_key, &self.worker_sig)?;
        if let Some(expected) = expected {
            if signer != expected {
                return Err(TaskError::Crypto(format!(
                    "worker encryption key signed by {signer:?}, expected {expected:?}"
                )));
            }
        }
        WorkerKey::from_bytes(signer, &self.worker_encryption_key)
    }
}
