//! Ledger status codes and token units.

/// Number of grains in one ENG token (8 decimals).
pub const GRAINS_PER_ENG: u128 = 100_000_000;

/// Default on-chain code for a freshly created task record.
pub const RECORD_CREATED_CODE: i64 = 0;

/// Default on-chain code for a task picked up by a worker.
pub const IN_PROGRESS_CODE: i64 = 1;

/// Default on-chain code for a task whose receipt was verified.
pub const RECEIPT_VERIFIED_CODE: i64 = 2;

/// Default on-chain code for a failed task.
pub const FAILED_CODE: i64 = 3;

/// Converts a whole-token amount into grains.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::to_grains;
///
/// assert_eq!(to_grains(1), 100_000_000);
/// assert_eq!(to_grains(0), 0);
/// ```
pub fn to_grains(eng: u64) -> u128 {
    u128::from(eng) * GRAINS_PER_ENG
}
