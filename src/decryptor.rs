//! Result decryption.
//!
//! Derives the task's symmetric key from its ephemeral secret and the worker
//! encryption key recorded in the descriptor, then opens the worker's
//! output. For `FAILED` results the plaintext is a UTF-8 error message, see
//! [`TaskResult::outcome`].
//!
//! A result is only opened once its signature checks out against the worker
//! recorded in the descriptor.

use tracing::debug;

use sealed_compute_types::{Result, TaskDescriptor, TaskError, TaskResult};

use crate::crypto::{self, KeyPair};
use crate::fetcher::verify_result;

/// Decrypts `result` with the task's ephemeral `keys`.
///
/// Returns the result with `decrypted_output` populated. A result not signed
/// by `descriptor.worker` fails with [`TaskError::Verification`] before any
/// decryption is attempted. Decryption failures are returned unchanged as
/// [`TaskError::Decryption`].
pub fn decrypt(
    mut result: TaskResult,
    keys: &KeyPair,
    descriptor: &TaskDescriptor,
) -> Result<TaskResult> {
    if result.task_id != descriptor.task_id {
        return Err(TaskError::decryption(format!(
            "result belongs to task {}, not {}",
            result.task_id, descriptor.task_id
        )));
    }
    verify_result(&result, &descriptor.worker)?;

    let worker_key = crypto::parse_public_key(&descriptor.worker_pub_key)?;
    let key = crypto::derive_shared_key(keys.secret_key(), &worker_key);
    let plaintext = crypto::decrypt(&key, &result.encrypted_abi_encoded_outputs)?;

    debug!(
        task_id = %result.task_id,
        eng_status = %result.eng_status,
        len = plaintext.len(),
        "decrypted task result"
    );
    result.decrypted_output = Some(plaintext);
    Ok(result)
}
