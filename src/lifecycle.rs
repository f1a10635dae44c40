//! End-to-end task lifecycle as a single cancellable tokio task.
//!
//! [`TaskLifecycle`] drives one task from submission to decrypted result:
//!
//! ```text
//! compute_task ─► Submitted ─► StatusChanged* ─► ResultFetched ─► Completed
//!       │               │              │                │
//!       └───────────────┴──────────────┴────────────────┴──► Failed
//! ```
//!
//! Events are written by the lifecycle task alone, in order, to an unbounded
//! channel, so a slow or absent reader never stalls the task and
//! `Submitted` always precedes the final `Completed` or `Failed`. Exactly one
//! final event is emitted.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use sealed_compute_types::{
    EngStatus, EthStatus, Result, TaskError, TaskId, TaskRecord, TaskResult,
};

use crate::client::{SealedComputeClient, TaskRequest};
use crate::decryptor;

/// Progress notification for a running task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// The ledger accepted the task.
    Submitted {
        /// Id the task was recorded under.
        task_id: TaskId,
    },
    /// A new on-chain status was observed.
    StatusChanged {
        /// The task.
        task_id: TaskId,
        /// Newly observed status.
        status: EthStatus,
        /// Block of the record.
        block_number: u64,
    },
    /// The worker result was fetched and its signature verified.
    ResultFetched {
        /// The task.
        task_id: TaskId,
        /// Worker-reported outcome.
        eng_status: EngStatus,
    },
    /// The result was decrypted. Final.
    Completed {
        /// The decrypted result.
        result: TaskResult,
    },
    /// The lifecycle stopped with an error. Final.
    Failed {
        /// The task, if it got as far as submission.
        task_id: Option<TaskId>,
        /// What went wrong.
        error: TaskError,
    },
}

impl TaskEvent {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

/// A running task.
///
/// Dropping the lifecycle cancels it.
#[derive(Debug)]
pub struct TaskLifecycle {
    events: mpsc::UnboundedReceiver<TaskEvent>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<Result<TaskResult>>>,
}

impl TaskLifecycle {
    pub(crate) fn spawn(client: SealedComputeClient, request: TaskRequest) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move { drive(client, request, token, tx).await });
        Self {
            events: rx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Next progress event, or `None` once the final event was consumed.
    pub async fn next_event(&mut self) -> Option<TaskEvent> {
        self.events.recv().await
    }

    /// Requests cancellation. The lifecycle ends with
    /// [`TaskError::Cancelled`] unless it already finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the lifecycle to finish and returns its result.
    pub async fn outcome(mut self) -> Result<TaskResult> {
        let Some(handle) = self.handle.take() else {
            return Err(TaskError::Cancelled { task_id: None });
        };
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TaskError::Cancelled { task_id: None }),
            Err(e) => Err(TaskError::Protocol(format!("task lifecycle failed: {e}"))),
        }
    }
}

impl Drop for TaskLifecycle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn drive(
    client: SealedComputeClient,
    request: TaskRequest,
    cancel: CancellationToken,
    events: mpsc::UnboundedSender<TaskEvent>,
) -> Result<TaskResult> {
    // The receiver may be gone; progress is best effort, the outcome is not.
    let emit = |event: TaskEvent| {
        let _ = events.send(event);
    };
    let mut submitted: Option<TaskId> = None;

    let outcome = async {
        let task = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TaskError::Cancelled { task_id: None }),
            task = client.submit_request(&request) => task?,
        };
        let task_id = task.task_id();
        submitted = Some(task_id);
        emit(TaskEvent::Submitted { task_id });

        client
            .poller()
            .await_terminal_observed(&task_id, &cancel, |record: &TaskRecord| {
                emit(TaskEvent::StatusChanged {
                    task_id,
                    status: record.eth_status,
                    block_number: record.block_number,
                });
            })
            .await?;

        let result = client
            .fetcher()
            .fetch_with_cancel(task.descriptor(), &cancel)
            .await?;
        emit(TaskEvent::ResultFetched {
            task_id,
            eng_status: result.eng_status,
        });

        decryptor::decrypt(result, task.keys(), task.descriptor())
    }
    .await;

    match &outcome {
        Ok(result) => {
            info!(task_id = %result.task_id, eng_status = %result.eng_status, "task completed");
            emit(TaskEvent::Completed {
                result: result.clone(),
            });
        },
        Err(error) => {
            warn!(task_id = ?submitted, %error, "task failed");
            emit(TaskEvent::Failed {
                task_id: submitted,
                error: error.clone(),
            });
        },
    }
    outcome
}
