//! Result fetching and verification.
//!
//! [`ResultFetcher::fetch`] only asks the Worker Service for a result once
//! the ledger record is terminal, retries transport failures with bounded
//! exponential backoff, and checks the worker's signature before handing the
//! result back. A result that fails verification is never returned and never
//! retried.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use sealed_compute_types::{
    Address, Result, StatusCodes, TaskDescriptor, TaskError, TaskId, TaskResult,
};

use crate::config::RetryConfig;
use crate::crypto;
use crate::ledger::Ledger;
use crate::worker::{WorkerResult, WorkerService};

/// Fetches and verifies task results.
#[derive(Clone)]
pub struct ResultFetcher {
    ledger: Arc<dyn Ledger>,
    worker: Arc<dyn WorkerService>,
    retry: RetryConfig,
    codes: StatusCodes,
}

impl std::fmt::Debug for ResultFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultFetcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ResultFetcher {
    /// Creates a fetcher.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        worker: Arc<dyn WorkerService>,
        retry: RetryConfig,
        codes: StatusCodes,
    ) -> Self {
        Self {
            ledger,
            worker,
            retry,
            codes,
        }
    }

    /// Fetches the verified, still encrypted result of `descriptor`.
    ///
    /// # Errors
    ///
    /// - [`TaskError::NotReady`] if the ledger record is not terminal.
    /// - [`TaskError::Transport`] once all retry attempts failed.
    /// - [`TaskError::Verification`] if the signature does not recover to
    ///   `descriptor.worker`.
    pub async fn fetch(&self, descriptor: &TaskDescriptor) -> Result<TaskResult> {
        self.fetch_with_cancel(descriptor, &CancellationToken::new())
            .await
    }

    /// Like [`fetch`](Self::fetch), aborting retries once `cancel` fires.
    pub async fn fetch_with_cancel(
        &self,
        descriptor: &TaskDescriptor,
        cancel: &CancellationToken,
    ) -> Result<TaskResult> {
        let task_id = descriptor.task_id;

        let record = self
            .ledger
            .read_record(&task_id)
            .await?
            .decode(task_id, &self.codes)?;
        if !record.is_terminal() {
            return Err(TaskError::NotReady {
                task_id,
                current_status: record.eth_status,
            });
        }

        let raw = self.get_with_retry(&task_id, cancel).await?;
        let result = raw.into_task_result(task_id);
        verify_result(&result, &descriptor.worker)?;
        debug!(task_id = %task_id, eng_status = %result.eng_status, "fetched verified result");
        Ok(result)
    }

    async fn get_with_retry(
        &self,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<WorkerResult> {
        let cancelled = || TaskError::Cancelled {
            task_id: Some(*task_id),
        };
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let outcome = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(cancelled()),
                outcome = self.worker.get_result(task_id) => outcome,
            };

            match outcome {
                Ok(result) => return Ok(result),
                Err(TaskError::Transport { message, .. }) if attempt >= max_attempts => {
                    warn!(task_id = %task_id, attempts = attempt, %message, "worker unreachable, giving up");
                    return Err(TaskError::Transport {
                        task_id: Some(*task_id),
                        attempts: attempt,
                        message,
                    });
                },
                Err(e) if e.is_retryable() => {
                    let delay = self.retry.jittered_delay(attempt);
                    warn!(
                        task_id = %task_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "worker request failed, retrying"
                    );
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => return Err(cancelled()),
                        () = tokio::time::sleep(delay) => {},
                    }
                },
                Err(e) => return Err(e),
            }
        }
    }
}

/// Checks that `result` was signed by `expected`.
///
/// The signed message is `encrypted_abi_encoded_outputs ‖ task_id`.
pub fn verify_result(result: &TaskResult, expected: &Address) -> Result<()> {
    let signer = crypto::recover_address(&result.signed_message(), &result.worker_task_sig)
        .map_err(|e| TaskError::Verification {
            task_id: result.task_id,
            reason: e.to_string(),
        })?;
    if &signer != expected {
        error!(task_id = %result.task_id, ?signer, ?expected, "result signed by unexpected worker");
        return Err(TaskError::Verification {
            task_id: result.task_id,
            reason: format!("signed by {signer:?}, expected {expected:?}"),
        });
    }
    Ok(())
}
