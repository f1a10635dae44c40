//! The encrypted, submitted form of a task.

use serde::{Deserialize, Serialize};

use crate::types::ids::{Address, TaskId};

/// An encrypted task descriptor, immutable once built.
///
/// The function selector and the ABI-encoded arguments are sealed separately
/// under a key derived from the ephemeral `user_pub_key` and the worker's
/// `worker_pub_key`. The worker can therefore derive the same key from the
/// descriptor alone, without a prior handshake.
///
/// Every downstream stage (ledger submission, polling, result fetching,
/// decryption) receives the descriptor by reference and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    /// Identifier derived from the sealed inputs and `nonce`.
    pub task_id: TaskId,

    /// Target secret contract.
    pub contract: Address,

    /// Ciphertext of the canonical function signature.
    #[serde(with = "crate::hex")]
    pub encrypted_fn: Vec<u8>,

    /// Ciphertext of the ABI-encoded arguments.
    #[serde(with = "crate::hex")]
    pub encrypted_args: Vec<u8>,

    /// Gas limit supplied by the caller.
    pub gas_limit: u64,

    /// Gas price in grains.
    pub gas_price: u128,

    /// Submitting account.
    pub sender: Address,

    /// Ephemeral public key (64-byte uncompressed, no prefix) for this task.
    #[serde(with = "crate::hex")]
    pub user_pub_key: Vec<u8>,

    /// Address of the worker expected to sign the result.
    pub worker: Address,

    /// Worker encryption key the task was sealed against.
    #[serde(with = "crate::hex")]
    pub worker_pub_key: Vec<u8>,

    /// Per-task nonce mixed into `task_id`.
    pub nonce: u64,
}

impl TaskDescriptor {
    /// Total fee reserved for the task (`gas_limit * gas_price`), saturating.
    ///
    /// # Examples
    ///
    /// ```
    /// use sealed_compute_types::{Address, TaskDescriptor, TaskId};
    ///
    /// let descriptor = TaskDescriptor {
    ///     task_id: TaskId::new([0; 32]),
    ///     contract: Address::default(),
    ///     encrypted_fn: vec![],
    ///     encrypted_args: vec![],
    ///     gas_limit: 3,
    ///     gas_price: 100,
    ///     sender: Address::default(),
    ///     user_pub_key: vec![],
    ///     worker: Address::default(),
    ///     worker_pub_key: vec![],
    ///     nonce: 0,
    /// };
    /// assert_eq!(descriptor.fee(), 300);
    /// ```
    pub fn fee(&self) -> u128 {
        u128::from(self.gas_limit).saturating_mul(self.gas_price)
    }
}
