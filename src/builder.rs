//! Task construction.
//!
//! [`TaskBuilder`] turns a function signature and its arguments into an
//! encrypted [`TaskDescriptor`]:
//!
//! 1. The signature is canonicalized and the arguments ABI-encoded.
//! 2. A fresh ephemeral [`KeyPair`] is generated and a symmetric key derived
//!    against the worker's encryption key.
//! 3. Signature and arguments are sealed separately.
//! 4. The task id is the keccak256 of the sealed inputs, the parties and a
//!    nonce.
//!
//! The ephemeral key pair never enters the descriptor. It travels next to it
//! in a [`PendingTask`] so the caller can decrypt the result later.

use secp256k1::PublicKey;
use tracing::debug;

use sealed_compute_types::{Address, Result, TaskDescriptor, TaskId};

use crate::abi::{self, TaskArg};
use crate::crypto::{self, KeyPair};

/// A worker's published identity: its signer address and the public key
/// tasks are encrypted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerKey {
    /// Address that signs the worker's results.
    pub address: Address,
    /// Public encryption key.
    pub encryption_key: PublicKey,
}

impl WorkerKey {
    /// Creates a worker key.
    pub fn new(address: Address, encryption_key: PublicKey) -> Self {
        Self {
            address,
            encryption_key,
        }
    }

    /// Parses the encryption key from any supported public key encoding.
    pub fn from_bytes(address: Address, encryption_key: &[u8]) -> Result<Self> {
        Ok(Self::new(address, crypto::parse_public_key(encryption_key)?))
    }
}

/// A built task: the immutable descriptor plus the ephemeral keys needed to
/// open its result.
#[derive(Debug)]
pub struct PendingTask {
    descriptor: TaskDescriptor,
    keys: KeyPair,
}

impl PendingTask {
    /// The encrypted descriptor.
    pub fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    /// The ephemeral key pair bound to this task.
    pub fn keys(&self) -> &KeyPair {
        &self.keys
    }

    /// Shorthand for `descriptor().task_id`.
    pub fn task_id(&self) -> TaskId {
        self.descriptor.task_id
    }

    /// Splits the task into its parts.
    pub fn into_parts(self) -> (TaskDescriptor, KeyPair) {
        (self.descriptor, self.keys)
    }
}

/// Builds encrypted tasks for one secret contract.
///
/// # Examples
///
/// ```
/// use sealed_compute::abi::TaskArg;
/// use sealed_compute::builder::{TaskBuilder, WorkerKey};
/// use sealed_compute::crypto::KeyPair;
/// use sealed_compute::types::Address;
/// use serde_json::json;
///
/// let worker = KeyPair::generate();
/// let worker_key = WorkerKey::new(worker.address(), *worker.public_key());
///
/// let task = TaskBuilder::for_contract(Address::repeat_byte(0x11))
///     .build(
///         "add(uint,uint)",
///         &[TaskArg::new(json!(24), "uint256"), TaskArg::new(json!(67), "uint256")],
///         100_000,
///         1,
///         Address::repeat_byte(0x22),
///         &worker_key,
///     )
///     .unwrap();
///
/// assert_eq!(task.descriptor().worker, worker.address());
/// assert_eq!(task.descriptor().user_pub_key, task.keys().public_key_bytes());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskBuilder {
    contract: Address,
}

impl TaskBuilder {
    /// Targets `contract`.
    pub fn for_contract(contract: Address) -> Self {
        Self { contract }
    }

    /// The target contract.
    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Builds a task with a random nonce.
    pub fn build(
        &self,
        fn_signature: &str,
        args: &[TaskArg],
        gas_limit: u64,
        gas_price: u128,
        sender: Address,
        worker: &WorkerKey,
    ) -> Result<PendingTask> {
        let nonce = rand::random::<u64>();
        self.build_with_nonce(fn_signature, args, gas_limit, gas_price, sender, worker, nonce)
    }

    /// Builds a task with a caller-chosen nonce.
    #[allow(clippy::too_many_arguments)]
    pub fn build_with_nonce(
        &self,
        fn_signature: &str,
        args: &[TaskArg],
        gas_limit: u64,
        gas_price: u128,
        sender: Address,
        worker: &WorkerKey,
        nonce: u64,
    ) -> Result<PendingTask> {
        let signature = abi::parse_signature(fn_signature)?;
        let encoded_args = abi::encode_args(&signature, args)?;

        let keys = KeyPair::generate();
        let key = crypto::derive_shared_key(keys.secret_key(), &worker.encryption_key);

        let encrypted_fn = crypto::encrypt(&key, signature.canonical().as_bytes())?;
        let encrypted_args = crypto::encrypt(&key, &encoded_args)?;
        let user_pub_key = keys.public_key_bytes();

        let task_id = derive_task_id(
            &self.contract,
            &sender,
            &user_pub_key,
            &encrypted_fn,
            &encrypted_args,
            nonce,
        );

        debug!(
            task_id = %task_id,
            function = %signature,
            contract = ?self.contract,
            gas_limit,
            "built task"
        );

        Ok(PendingTask {
            descriptor: TaskDescriptor {
                task_id,
                contract: self.contract,
                encrypted_fn,
                encrypted_args,
                gas_limit,
                gas_price,
                sender,
                user_pub_key,
                worker: worker.address,
                worker_pub_key: crypto::public_key_bytes(&worker.encryption_key),
                nonce,
            },
            keys,
        })
    }
}

/// `keccak256(contract ‖ sender ‖ user_pub_key ‖ encrypted_fn ‖
/// encrypted_args ‖ nonce_be64)`.
pub fn derive_task_id(
    contract: &Address,
    sender: &Address,
    user_pub_key: &[u8],
    encrypted_fn: &[u8],
    encrypted_args: &[u8],
    nonce: u64,
) -> TaskId {
    let mut preimage = Vec::with_capacity(
        Address::len_bytes() * 2 + user_pub_key.len() + encrypted_fn.len() + encrypted_args.len() + 8,
    );
    preimage.extend_from_slice(contract.as_bytes());
    preimage.extend_from_slice(sender.as_bytes());
    preimage.extend_from_slice(user_pub_key);
    preimage.extend_from_slice(encrypted_fn);
    preimage.extend_from_slice(encrypted_args);
    preimage.extend_from_slice(&nonce.to_be_bytes());
    TaskId::new(crypto::keccak256(&preimage))
}

/// Recomputes the id of `descriptor` from its contents.
pub fn expected_task_id(descriptor: &TaskDescriptor) -> TaskId {
    derive_task_id(
        &descriptor.contract,
        &descriptor.sender,
        &descriptor.user_pub_key,
        &descriptor.encrypted_fn,
        &descriptor.encrypted_args,
        descriptor.nonce,
    )
}
