//! Status polling.
//!
//! [`StatusPoller`] reads a task's ledger record until it reaches a terminal
//! status, enforcing the monotonic progression of [`EthStatus`] on every
//! observation:
//!
//! ```text
//! read ──► decode ──► same status ─────────► sleep ──► read ...
//!                 ├─► higher rank ─► notify ► sleep ──► read ...
//!                 ├─► terminal ────► notify ► return record
//!                 └─► lower rank / terminal switch / new block ► InconsistentState
//! ```
//!
//! The poller sleeps only between reads, never after the last one. Every read
//! and every sleep is raced against a [`CancellationToken`]; once it fires,
//! the loop resolves with [`TaskError::Cancelled`] and issues no further
//! reads.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sealed_compute_types::{EthStatus, Result, StatusCodes, TaskError, TaskId, TaskRecord};

use crate::config::PollConfig;
use crate::ledger::Ledger;

/// Polls ledger records until they settle.
#[derive(Clone)]
pub struct StatusPoller {
    ledger: Arc<dyn Ledger>,
    config: PollConfig,
    codes: StatusCodes,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("config", &self.config)
            .field("codes", &self.codes)
            .finish_non_exhaustive()
    }
}

impl StatusPoller {
    /// Creates a poller over `ledger`.
    pub fn new(ledger: Arc<dyn Ledger>, config: PollConfig, codes: StatusCodes) -> Self {
        Self {
            ledger,
            config,
            codes,
        }
    }

    /// The polling configuration.
    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Reads and decodes the current record once.
    pub async fn read_once(&self, task_id: &TaskId) -> Result<TaskRecord> {
        self.ledger
            .read_record(task_id)
            .await?
            .decode(*task_id, &self.codes)
    }

    /// Polls until `task_id` reaches a terminal status.
    ///
    /// # Errors
    ///
    /// - [`TaskError::Timeout`] after `max_attempts` non-terminal reads,
    ///   carrying the last observed status.
    /// - [`TaskError::InconsistentState`] if the status regresses, a terminal
    ///   status changes, or the record moves to another block.
    /// - [`TaskError::NotFound`] if the record does not exist or disappears.
    /// - [`TaskError::Cancelled`] once `cancel` fires.
    pub async fn await_terminal(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord> {
        self.await_terminal_observed(task_id, cancel, |_| {}).await
    }

    /// Like [`await_terminal`](Self::await_terminal), calling `on_change`
    /// with the record each time a new status is observed.
    pub async fn await_terminal_observed<F>(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
        mut on_change: F,
    ) -> Result<TaskRecord>
    where
        F: FnMut(&TaskRecord) + Send,
    {
        let cancelled = || TaskError::Cancelled {
            task_id: Some(*task_id),
        };
        let mut status = EthStatus::RecordCreated;
        let mut last: Option<TaskRecord> = None;

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }

            let record = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                read = self.read_once(task_id) => read?,
            };

            if let Err(e) = status.validate_progression(task_id, &record.eth_status) {
                warn!(task_id = %task_id, previous = %status, observed = %record.eth_status, "status regressed");
                return Err(e);
            }
            if let Some(previous) = last.filter(|p| p.block_number != record.block_number) {
                warn!(
                    task_id = %task_id,
                    previous_block = previous.block_number,
                    observed_block = record.block_number,
                    "task record moved blocks"
                );
                return Err(TaskError::InconsistentState {
                    task_id: *task_id,
                    previous: previous.eth_status,
                    observed: record.eth_status,
                });
            }

            debug!(task_id = %task_id, attempt, status = %record.eth_status, "polled task record");
            if last.map(|p| p.eth_status) != Some(record.eth_status) {
                on_change(&record);
            }
            status = record.eth_status;
            last = Some(record);

            if record.is_terminal() {
                info!(task_id = %task_id, status = %status, reads = attempt, "task record settled");
                return Ok(record);
            }

            if attempt < self.config.max_attempts {
                let delay = self.config.delay_after(attempt);
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(cancelled()),
                    () = tokio::time::sleep(delay) => {},
                }
            }
        }

        warn!(task_id = %task_id, attempts = self.config.max_attempts, last_status = %status, "polling timed out");
        Err(TaskError::Timeout {
            task_id: *task_id,
            attempts: self.config.max_attempts,
            last_status: status,
        })
    }

    /// Runs [`await_terminal`](Self::await_terminal) as its own tokio task.
    ///
    /// Dropping the returned handle cancels the loop.
    pub fn spawn(&self, task_id: TaskId) -> PollHandle {
        let cancel = CancellationToken::new();
        let poller = self.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { poller.await_terminal(&task_id, &token).await });
        PollHandle {
            task_id,
            cancel,
            handle: Some(handle),
        }
    }
}

/// Handle to a spawned poll loop.
#[derive(Debug)]
pub struct PollHandle {
    task_id: TaskId,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<TaskRecord>>>,
}

impl PollHandle {
    /// The task being polled.
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Requests cancellation. The loop stops at its next read or sleep.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the loop to finish.
    pub async fn join(mut self) -> Result<TaskRecord> {
        let Some(handle) = self.handle.take() else {
            return Err(TaskError::Cancelled {
                task_id: Some(self.task_id),
            });
        };
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TaskError::Cancelled {
                task_id: Some(self.task_id),
            }),
            Err(e) => Err(TaskError::Protocol(format!("poll task failed: {e}"))),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedger;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use sealed_compute_types::{LedgerRecord, TaskDescriptor};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Ledger returning a fixed list of raw codes, then repeating the last.
    struct Scripted {
        codes: Vec<i64>,
        reads: AtomicU32,
    }

    impl Scripted {
        fn new(codes: Vec<i64>) -> Arc<Self> {
            Arc::new(Self {
                codes,
                reads: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Ledger for Scripted {
        async fn submit(&self, descriptor: &TaskDescriptor) -> Result<TaskId> {
            Ok(descriptor.task_id)
        }

        async fn read_record(&self, _task_id: &TaskId) -> Result<LedgerRecord> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst) as usize;
            let code = self.codes[n.min(self.codes.len() - 1)];
            Ok(LedgerRecord {
                eth_status: code,
                block_number: 7,
            })
        }
    }

    const ID: TaskId = TaskId::new([0x42; 32]);

    fn poller(ledger: Arc<dyn Ledger>, max_attempts: u32) -> StatusPoller {
        StatusPoller::new(ledger, PollConfig::fixed(5, max_attempts), StatusCodes::default())
    }

    #[tokio::test]
    async fn test_observer_sees_each_status_once() {
        let ledger = Scripted::new(vec![0, 0, 1, 1, 3]);
        let mut seen = Vec::new();
        let record = poller(ledger.clone(), 10)
            .await_terminal_observed(&ID, &CancellationToken::new(), |r| seen.push(r.eth_status))
            .await
            .unwrap();
        assert_eq!(record.eth_status, EthStatus::Failed);
        assert_eq!(
            seen,
            vec![EthStatus::RecordCreated, EthStatus::InProgress, EthStatus::Failed]
        );
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_first_terminal_observation_returns() {
        let ledger = Scripted::new(vec![2, 3]);
        let record = poller(ledger.clone(), 10)
            .await_terminal(&ID, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(record.eth_status, EthStatus::ReceiptVerified);
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_code_is_reported() {
        let ledger = Scripted::new(vec![0, 9]);
        let err = poller(ledger, 10)
            .await_terminal(&ID, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::UnknownStatusCode { task_id: ID, code: 9 });
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_issues_no_reads() {
        let ledger = Scripted::new(vec![0]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = poller(ledger.clone(), 10)
            .await_terminal(&ID, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, TaskError::Cancelled { task_id: Some(ID) });
        assert_eq!(ledger.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_spawned_poll_can_be_cancelled() {
        let ledger = Scripted::new(vec![1]);
        let handle = poller(ledger, 1_000).spawn(ID);
        assert_eq!(handle.task_id(), ID);
        handle.cancel();
        assert!(matches!(
            handle.join().await,
            Err(TaskError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn test_block_change_is_inconsistent() {
        let ledger = Arc::new(InMemoryLedger::new());
        let descriptor = {
            use crate::builder::{TaskBuilder, WorkerKey};
            use crate::crypto::KeyPair;
            use sealed_compute_types::Address;

            let worker = KeyPair::generate();
            let key = WorkerKey::new(worker.address(), *worker.public_key());
            TaskBuilder::for_contract(Address::repeat_byte(1))
                .build("noop()", &[], 1, 0, Address::repeat_byte(2), &key)
                .unwrap()
                .into_parts()
                .0
        };
        let id = ledger.submit(&descriptor).await.unwrap();

        let poller = StatusPoller::new(
            ledger.clone(),
            PollConfig::fixed(20, 50),
            StatusCodes::default(),
        );
        let handle = poller.spawn(id);
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        ledger.move_to_block(&id, 99).unwrap();

        assert!(matches!(
            handle.join().await,
            Err(TaskError::InconsistentState { .. })
        ));
    }
}
