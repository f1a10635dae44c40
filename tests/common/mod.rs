//! Simulated worker network shared by the integration tests.
//!
//! [`SimulatedWorker`] plays both roles a real secure worker has: it executes
//! pending tasks found on an [`InMemoryLedger`] (decrypting them with its
//! encryption key, charging gas, settling the record) and it serves results
//! and its signed encryption key as a [`WorkerService`].

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use sealed_compute::abi::{self, AbiType};
use sealed_compute::crypto::{self, KeyPair};
use sealed_compute::ledger::InMemoryLedger;
use sealed_compute::types::{
    Address, EngStatus, Result, TaskDescriptor, TaskError, TaskId,
};
use sealed_compute::worker::{WorkerEncryptionKey, WorkerResult, WorkerService};
use sealed_compute::{ClientConfig, PollConfig, RetryConfig, SealedComputeClient};

/// Gas charged for any call.
pub const GAS_PER_CALL: u64 = 5;

pub const CONTRACT: Address = Address::repeat_byte(0xc0);
pub const SENDER: Address = Address::repeat_byte(0x5e);

pub struct SimulatedWorker {
    signer: KeyPair,
    encryption: KeyPair,
    ledger: Arc<InMemoryLedger>,
    results: DashMap<TaskId, WorkerResult>,
    transport_failures: AtomicU32,
    result_calls: AtomicU32,
    forge: AtomicBool,
    step_delay: Duration,
}

impl SimulatedWorker {
    pub fn new(ledger: Arc<InMemoryLedger>) -> Arc<Self> {
        Arc::new(Self {
            signer: KeyPair::generate(),
            encryption: KeyPair::generate(),
            ledger,
            results: DashMap::new(),
            transport_failures: AtomicU32::new(0),
            result_calls: AtomicU32::new(0),
            forge: AtomicBool::new(false),
            step_delay: Duration::from_millis(15),
        })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Makes the next `n` result requests fail with a transport error.
    pub fn fail_next(&self, n: u32) {
        self.transport_failures.store(n, Ordering::SeqCst);
    }

    /// Signs subsequent results with a key that is not the worker's.
    pub fn forge_signatures(&self) {
        self.forge.store(true, Ordering::SeqCst);
    }

    pub fn result_calls(&self) -> u32 {
        self.result_calls.load(Ordering::SeqCst)
    }

    /// Executes one task: picks it up, runs it, stores the signed result and
    /// settles the ledger record.
    pub async fn execute(&self, descriptor: &TaskDescriptor) -> Result<()> {
        let task_id = descriptor.task_id;
        self.ledger.start(&task_id)?;
        tokio::time::sleep(self.step_delay).await;

        let client_key = crypto::parse_public_key(&descriptor.user_pub_key)?;
        let key = crypto::derive_shared_key(self.encryption.secret_key(), &client_key);

        let (eng_status, output) = match run(&key, descriptor) {
            Ok(output) => (EngStatus::Success, output),
            Err(message) => (EngStatus::Failed, message.into_bytes()),
        };

        let encrypted = crypto::encrypt(&key, &output)?;
        let mut message = encrypted.clone();
        message.extend_from_slice(task_id.as_bytes());
        let signature = if self.forge.load(Ordering::SeqCst) {
            crypto::sign(KeyPair::generate().secret_key(), &message)
        } else {
            crypto::sign(self.signer.secret_key(), &message)
        };

        self.results.insert(
            task_id,
            WorkerResult {
                eng_status,
                encrypted_abi_encoded_outputs: encrypted,
                worker_task_sig: signature,
            },
        );
        self.ledger
            .commit(&task_id, eng_status == EngStatus::Success)
    }

    /// Executes every pending task once. Returns how many ran.
    pub async fn process_pending(&self) -> usize {
        let pending = self.ledger.pending_tasks();
        let mut ran = 0;
        for descriptor in pending {
            if self.execute(&descriptor).await.is_ok() {
                ran += 1;
            }
        }
        ran
    }

    /// Runs [`process_pending`](Self::process_pending) in the background
    /// until the returned token is cancelled.
    pub fn spawn_executor(self: &Arc<Self>) -> CancellationToken {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_millis(5)) => {
                        worker.process_pending().await;
                    },
                }
            }
        });
        cancel
    }
}

/// Decrypts and runs the call, or returns the error message.
fn run(key: &crypto::SymmetricKey, descriptor: &TaskDescriptor) -> std::result::Result<Vec<u8>, String> {
    if descriptor.gas_limit < GAS_PER_CALL {
        return Err(format!(
            "out of gas: limit {}, required {GAS_PER_CALL}",
            descriptor.gas_limit
        ));
    }

    let function = crypto::decrypt(key, &descriptor.encrypted_fn).map_err(|e| e.to_string())?;
    let function = String::from_utf8(function).map_err(|e| e.to_string())?;
    let signature = abi::parse_signature(&function).map_err(|e| e.to_string())?;
    let encoded = crypto::decrypt(key, &descriptor.encrypted_args).map_err(|e| e.to_string())?;
    let args = abi::decode(signature.params(), &encoded).map_err(|e| e.to_string())?;

    match signature.canonical().as_str() {
        "add(uint256,uint256)" => {
            let sum = args
                .iter()
                .map(|v| v.as_u64().ok_or_else(|| "argument too large".to_string()))
                .sum::<std::result::Result<u64, String>>()?;
            abi::encode(&[AbiType::Uint(256)], &[Value::from(sum)]).map_err(|e| e.to_string())
        },
        "noop()" => Ok(Vec::new()),
        other => Err(format!("unknown function {other}")),
    }
}

#[async_trait]
impl WorkerService for SimulatedWorker {
    async fn get_result(&self, task_id: &TaskId) -> Result<WorkerResult> {
        self.result_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.transport_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transport_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(TaskError::Transport {
                task_id: Some(*task_id),
                attempts: 1,
                message: "connection reset by peer".to_string(),
            });
        }
        self.results
            .get(task_id)
            .map(|r| r.clone())
            .ok_or(TaskError::NotFound { task_id: *task_id })
    }

    async fn get_encryption_key(&self) -> Result<WorkerEncryptionKey> {
        let key = self.encryption.public_key_bytes();
        Ok(WorkerEncryptionKey {
            worker_sig: crypto::sign(self.signer.secret_key(), &key),
            worker_encryption_key: key,
        })
    }
}

/// Fast polling and retry settings for tests.
pub fn test_config() -> ClientConfig {
    ClientConfig::new()
        .with_poll(PollConfig::fixed(10, 300))
        .with_retry(RetryConfig {
            max_attempts: 3,
            base_delay_ms: 5,
            max_delay_ms: 20,
        })
}

/// A funded ledger, a worker and a client wired together.
pub struct Network {
    pub ledger: Arc<InMemoryLedger>,
    pub worker: Arc<SimulatedWorker>,
    pub client: SealedComputeClient,
}

impl Network {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        ledger.fund(SENDER, sealed_compute::types::to_grains(1_000));
        let worker = SimulatedWorker::new(ledger.clone());
        let client = SealedComputeClient::new(config, ledger.clone(), worker.clone())
            .expect("valid test config");
        Self {
            ledger,
            worker,
            client,
        }
    }
}
