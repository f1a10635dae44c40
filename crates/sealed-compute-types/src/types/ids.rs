//! Identifiers: [`TaskId`] and the ledger [`Address`].
//!
//! `TaskId` renders as `0x`-prefixed lowercase hex and (de)serializes as a
//! string. `Address` is the `ethers` 20-byte address.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TaskError;
use crate::hex::{decode_prefixed, encode_prefixed};

pub use ethers::types::Address;

/// Globally unique 32-byte task identifier.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::TaskId;
///
/// let id = TaskId::new([0xab; 32]);
/// let parsed: TaskId = id.to_string().parse().unwrap();
/// assert_eq!(parsed, id);
/// assert!(id.to_string().starts_with("0xabab"));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId([u8; 32]);

impl TaskId {
    /// Length of the identifier in bytes.
    pub const LEN: usize = 32;

    /// Wraps raw bytes.
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Builds the identifier from a slice of exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TaskError> {
        let array: [u8; 32] = bytes.try_into().map_err(|_| {
            TaskError::Protocol(format!("task id must be 32 bytes, got {}", bytes.len()))
        })?;
        Ok(Self(array))
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the `0x` hex rendering.
    pub fn to_hex(&self) -> String {
        encode_prefixed(&self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskId({})", self.to_hex())
    }
}

impl FromStr for TaskId {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = decode_prefixed(s)
            .map_err(|e| TaskError::Protocol(format!("invalid task id '{s}': {e}")))?;
        Self::from_slice(&bytes)
    }
}

impl AsRef<[u8]> for TaskId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for TaskId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Parses a hex address, with or without a `0x`/`0X` prefix.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::parse_address;
///
/// let addr = parse_address("0x00000000000000000000000000000000000000ff").unwrap();
/// assert_eq!(addr.as_bytes()[19], 0xff);
/// assert!(parse_address("0x1234").is_err());
/// ```
pub fn parse_address(text: &str) -> Result<Address, TaskError> {
    let bytes = decode_prefixed(text.trim())
        .map_err(|e| TaskError::Protocol(format!("invalid address '{text}': {e}")))?;
    if bytes.len() != Address::len_bytes() {
        return Err(TaskError::Protocol(format!(
            "address must be 20 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(Address::from_slice(&bytes))
}
