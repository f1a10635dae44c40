//! Serde helpers for `0x`-prefixed hex byte strings.
//!
//! Use with `#[serde(with = "sealed_compute_types::hex")]` on `Vec<u8>`
//! fields. Decoding accepts input with or without the `0x` prefix.

use serde::{Deserialize, Deserializer, Serializer};

/// Encodes bytes as a `0x`-prefixed lowercase hex string.
///
/// # Examples
///
/// ```
/// assert_eq!(sealed_compute_types::hex::encode_prefixed(&[0xde, 0xad]), "0xdead");
/// ```
pub fn encode_prefixed(bytes: &[u8]) -> String {
    format!("0x{}", ::hex::encode(bytes))
}

/// Decodes a hex string, with or without a `0x` prefix.
///
/// # Examples
///
/// ```
/// use sealed_compute_types::hex::decode_prefixed;
///
/// assert_eq!(decode_prefixed("0xdead").unwrap(), vec![0xde, 0xad]);
/// assert_eq!(decode_prefixed("beef").unwrap(), vec![0xbe, 0xef]);
/// assert!(decode_prefixed("0xzz").is_err());
/// ```
pub fn decode_prefixed(value: &str) -> Result<Vec<u8>, ::hex::FromHexError> {
    let trimmed = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    ::hex::decode(trimmed)
}

/// Serializes a byte slice as `0x` hex.
pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&encode_prefixed(bytes))
}

/// Deserializes `0x` hex into a byte vector.
pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    decode_prefixed(&raw).map_err(serde::de::Error::custom)
}
