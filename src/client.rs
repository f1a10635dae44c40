//! Caller-facing client.
//!
//! [`SealedComputeClient`] bundles a [`Ledger`], a [`WorkerService`] and a
//! [`ClientConfig`], and exposes each lifecycle stage as its own call:
//!
//! | Call | Stage |
//! |------|-------|
//! | [`compute_task`](SealedComputeClient::compute_task) | fetch worker key, build, submit |
//! | [`get_task_record_status`](SealedComputeClient::get_task_record_status) | single ledger read |
//! | [`await_task_record`](SealedComputeClient::await_task_record) | poll until terminal |
//! | [`get_task_result`](SealedComputeClient::get_task_result) | fetch and verify |
//! | [`decrypt_task_result`](SealedComputeClient::decrypt_task_result) | decrypt |
//! | [`run_task`](SealedComputeClient::run_task) | all of the above, spawned |
//!
//! The client is cheap to clone; clones share the same backends.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use sealed_compute_types::{Address, Result, TaskDescriptor, TaskError, TaskRecord, TaskResult};

use crate::abi::TaskArg;
use crate::builder::{PendingTask, TaskBuilder, WorkerKey};
use crate::config::ClientConfig;
use crate::decryptor;
use crate::fetcher::ResultFetcher;
use crate::ledger::Ledger;
use crate::lifecycle::TaskLifecycle;
use crate::poller::StatusPoller;
use crate::worker::WorkerService;

/// Everything needed to run one task end to end.
///
/// # Examples
///
/// ```
/// use sealed_compute::client::TaskRequest;
/// use sealed_compute::types::{to_grains, Address};
/// use serde_json::json;
///
/// let request = TaskRequest::new("add(uint256,uint256)", Address::repeat_byte(1), Address::repeat_byte(2))
///     .with_arg(json!(24), "uint256")
///     .with_arg(json!(67), "uint256")
///     .with_gas_limit(1)
///     .with_gas_price(to_grains(1));
/// assert_eq!(request.args.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    /// Function signature, e.g. `add(uint256,uint256)`.
    pub fn_signature: String,
    /// Call arguments.
    pub args: Vec<TaskArg>,
    /// Target secret contract.
    pub contract: Address,
    /// Submitting account.
    pub sender: Address,
    /// Gas limit; the configured default when unset.
    pub gas_limit: Option<u64>,
    /// Gas price in grains; the configured default when unset.
    pub gas_price: Option<u128>,
}

impl TaskRequest {
    /// Creates a request without arguments.
    pub fn new(fn_signature: impl Into<String>, contract: Address, sender: Address) -> Self {
        Self {
            fn_signature: fn_signature.into(),
            args: Vec::new(),
            contract,
            sender,
            gas_limit: None,
            gas_price: None,
        }
    }

    /// Appends an argument.
    pub fn with_arg(mut self, value: serde_json::Value, abi_type: impl Into<String>) -> Self {
        self.args.push(TaskArg::new(value, abi_type));
        self
    }

    /// Sets the gas limit.
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Sets the gas price in grains.
    pub fn with_gas_price(mut self, gas_price: u128) -> Self {
        self.gas_price = Some(gas_price);
        self
    }
}

/// Client for the sealed-compute task lifecycle.
#[derive(Clone)]
pub struct SealedComputeClient {
    config: Arc<ClientConfig>,
    ledger: Arc<dyn Ledger>,
    worker: Arc<dyn WorkerService>,
    poller: StatusPoller,
    fetcher: ResultFetcher,
}

impl std::fmt::Debug for SealedComputeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedComputeClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SealedComputeClient {
    /// Creates a client after validating `config`.
    pub fn new(
        config: ClientConfig,
        ledger: Arc<dyn Ledger>,
        worker: Arc<dyn WorkerService>,
    ) -> Result<Self> {
        config.validate()?;
        let poller = StatusPoller::new(ledger.clone(), config.poll.clone(), config.status_codes);
        let fetcher = ResultFetcher::new(
            ledger.clone(),
            worker.clone(),
            config.retry.clone(),
            config.status_codes,
        );
        Ok(Self {
            config: Arc::new(config),
            ledger,
            worker,
            poller,
            fetcher,
        })
    }

    /// Creates a client talking to the Worker Service at
    /// `config.worker_url` over JSON-RPC.
    #[cfg(feature = "http-client")]
    pub fn over_http(config: ClientConfig, ledger: Arc<dyn Ledger>) -> Result<Self> {
        let worker = crate::worker::HttpWorkerService::from_config(&config)?;
        Self::new(config, ledger, Arc::new(worker))
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The ledger backend.
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    pub(crate) fn poller(&self) -> &StatusPoller {
        &self.poller
    }

    pub(crate) fn fetcher(&self) -> &ResultFetcher {
        &self.fetcher
    }

    /// Fetches the worker's encryption key and checks its signature,
    /// against `config.worker_address` when set.
    pub async fn worker_key(&self) -> Result<WorkerKey> {
        self.worker
            .get_encryption_key()
            .await?
            .verify(self.config.worker_address)
    }

    /// Builds and submits a task.
    ///
    /// Returns the submitted task with the ephemeral keys needed to decrypt
    /// its result.
    pub async fn compute_task(
        &self,
        fn_signature: &str,
        args: &[TaskArg],
        gas_limit: u64,
        gas_price: u128,
        sender: Address,
        target: Address,
    ) -> Result<PendingTask> {
        let worker = self.worker_key().await?;
        let task = TaskBuilder::for_contract(target).build(
            fn_signature,
            args,
            gas_limit,
            gas_price,
            sender,
            &worker,
        )?;

        let recorded = self.ledger.submit(task.descriptor()).await?;
        if recorded != task.task_id() {
            return Err(TaskError::submission(format!(
                "ledger recorded task as {recorded}, expected {}",
                task.task_id()
            )));
        }

        info!(
            task_id = %recorded,
            contract = ?target,
            worker = ?worker.address,
            gas_limit,
            "task submitted"
        );
        Ok(task)
    }

    pub(crate) async fn submit_request(&self, request: &TaskRequest) -> Result<PendingTask> {
        self.compute_task(
            &request.fn_signature,
            &request.args,
            request.gas_limit.unwrap_or(self.config.default_gas_limit),
            request
                .gas_price
                .unwrap_or_else(|| u128::from(self.config.default_gas_price)),
            request.sender,
            request.contract,
        )
        .await
    }

    /// Reads the task's ledger record once.
    pub async fn get_task_record_status(&self, descriptor: &TaskDescriptor) -> Result<TaskRecord> {
        self.poller.read_once(&descriptor.task_id).await
    }

    /// Polls the task's ledger record until it is terminal.
    pub async fn await_task_record(
        &self,
        descriptor: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord> {
        self.poller.await_terminal(&descriptor.task_id, cancel).await
    }

    /// Fetches and verifies the result of a settled task.
    pub async fn get_task_result(&self, descriptor: &TaskDescriptor) -> Result<TaskResult> {
        self.fetcher.fetch(descriptor).await
    }

    /// Verifies the worker signature on `result`, then decrypts it with the
    /// task's ephemeral keys.
    pub fn decrypt_task_result(&self, task: &PendingTask, result: TaskResult) -> Result<TaskResult> {
        decryptor::decrypt(result, task.keys(), task.descriptor())
    }

    /// Runs the whole lifecycle of `request` as a spawned task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn run_task(&self, request: TaskRequest) -> TaskLifecycle {
        TaskLifecycle::spawn(self.clone(), request)
    }
}
