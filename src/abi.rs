//! Solidity-style ABI encoding for task calls.
//!
//! Secret contracts are invoked by function signature, e.g.
//! `add(uint256,uint256)`, with arguments encoded the way Solidity does.
//! Signature parsing, head/tail layout and decoding come from
//! [`ethers::abi`]. This module maps JSON call arguments onto ABI tokens and
//! back, checking each value against its declared type.
//!
//! Argument values are [`serde_json::Value`]s paired with their declared type
//! ([`TaskArg`]). Large integers may be given as decimal or `0x` hex strings.
//!
//! Supported types: `uint<M>`, `int<M>`, `bool`, `address`, `bytes<M>`,
//! `bytes`, `string`. Arrays and tuples are rejected.
//!
//! # Examples
//!
//! ```
//! use sealed_compute::abi::{self, TaskArg};
//! use serde_json::json;
//!
//! let signature = abi::parse_signature("add(uint,uint)").unwrap();
//! assert_eq!(signature.canonical(), "add(uint256,uint256)");
//!
//! let encoded = abi::encode_args(
//!     &signature,
//!     &[TaskArg::new(json!(24), "uint256"), TaskArg::new(json!(67), "uint256")],
//! )
//! .unwrap();
//! assert_eq!(encoded.len(), 64);
//! assert_eq!(encoded[31], 24);
//! assert_eq!(encoded[63], 67);
//! ```

use std::fmt;

use ethers::abi::{HumanReadableParser, Token};
use ethers::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use sealed_compute_types::hex::{decode_prefixed, encode_prefixed};
use sealed_compute_types::{parse_address, Result, TaskError};

use crate::crypto::keccak256;

/// A single ABI parameter type.
pub use ethers::abi::ParamType as AbiType;

/// Rejects types outside the supported scalar set.
fn check_supported(ty: &AbiType) -> Result<()> {
    let supported = match ty {
        AbiType::Uint(bits) | AbiType::Int(bits) => *bits > 0 && *bits <= 256 && bits % 8 == 0,
        AbiType::FixedBytes(len) => (1..=32).contains(len),
        AbiType::Bool | AbiType::Address | AbiType::Bytes | AbiType::String => true,
        AbiType::Array(_) | AbiType::FixedArray(..) | AbiType::Tuple(_) => false,
    };
    if supported {
        Ok(())
    } else {
        Err(TaskError::encoding(format!("unsupported ABI type '{ty}'")))
    }
}

/// A parsed, canonicalized function signature.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    name: String,
    params: Vec<AbiType>,
}

// `ParamType` only derives `PartialEq`, but its equality is structural and total.
impl Eq for FunctionSignature {}

impl FunctionSignature {
    /// Function name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter types in declaration order.
    pub fn params(&self) -> &[AbiType] {
        &self.params
    }

    /// Canonical form with full type names and no whitespace.
    pub fn canonical(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ToString::to_string).collect();
        format!("{}({})", self.name, params.join(","))
    }

    /// First four bytes of keccak256 over the canonical form.
    pub fn selector(&self) -> [u8; 4] {
        let hash = keccak256(self.canonical().as_bytes());
        [hash[0], hash[1], hash[2], hash[3]]
    }
}

impl fmt::Display for FunctionSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

/// Parses `name(type,...)` into a [`FunctionSignature`].
pub fn parse_signature(signature: &str) -> Result<FunctionSignature> {
    let signature = signature.trim();
    let function = HumanReadableParser::parse_function(signature)
        .map_err(|e| TaskError::encoding(format!("invalid signature '{signature}': {e}")))?;
    if function.name.is_empty() {
        return Err(TaskError::encoding(format!(
            "missing function name in signature '{signature}'"
        )));
    }

    let params: Vec<AbiType> = function.inputs.into_iter().map(|param| param.kind).collect();
    for param in &params {
        check_supported(param)?;
    }

    Ok(FunctionSignature {
        name: function.name,
        params,
    })
}

/// Parses a single declared type such as `uint` or `bytes32`.
pub fn parse_type(declared: &str) -> Result<AbiType> {
    let mut params = parse_signature(&format!("arg({declared})"))?.params;
    match (params.pop(), params.is_empty()) {
        (Some(ty), true) => Ok(ty),
        _ => Err(TaskError::encoding(format!("expected one ABI type, got '{declared}'"))),
    }
}

/// Selector of a signature given as text.
pub fn selector(signature: &str) -> Result<[u8; 4]> {
    parse_signature(signature).map(|sig| sig.selector())
}

/// A call argument: a JSON value and its declared ABI type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskArg {
    /// The argument value.
    pub value: Value,
    /// Declared ABI type, e.g. `uint256`.
    pub abi_type: String,
}

impl TaskArg {
    /// Creates an argument.
    pub fn new(value: Value, abi_type: impl Into<String>) -> Self {
        Self {
            value,
            abi_type: abi_type.into(),
        }
    }
}

impl<T: Into<String>> From<(Value, T)> for TaskArg {
    fn from((value, abi_type): (Value, T)) -> Self {
        Self::new(value, abi_type)
    }
}

/// Encodes `args` for `signature`, checking arity and declared types.
pub fn encode_args(signature: &FunctionSignature, args: &[TaskArg]) -> Result<Vec<u8>> {
    if args.len() != signature.params.len() {
        return Err(TaskError::encoding(format!(
            "{} expects {} argument(s), got {}",
            signature.canonical(),
            signature.params.len(),
            args.len()
        )));
    }

    let mut values = Vec::with_capacity(args.len());
    for (index, (arg, expected)) in args.iter().zip(&signature.params).enumerate() {
        let declared = parse_type(&arg.abi_type)?;
        if declared != *expected {
            return Err(TaskError::encoding(format!(
                "argument {index} declared as {declared}, signature expects {expected}"
            )));
        }
        values.push(arg.value.clone());
    }

    encode(&signature.params, &values)
}

/// Encodes `values` as the ABI tuple `types`.
pub fn encode(types: &[AbiType], values: &[Value]) -> Result<Vec<u8>> {
    if types.len() != values.len() {
        return Err(TaskError::encoding(format!(
            "expected {} value(s), got {}",
            types.len(),
            values.len()
        )));
    }

    let tokens = types
        .iter()
        .zip(values)
        .enumerate()
        .map(|(index, (ty, value))| {
            tokenize(ty, value).map_err(|e| match e {
                TaskError::Encoding { reason } => {
                    TaskError::encoding(format!("argument {index} ({ty}): {reason}"))
                },
                other => other,
            })
        })
        .collect::<Result<Vec<Token>>>()?;

    Ok(ethers::abi::encode(&tokens))
}

fn tokenize(ty: &AbiType, value: &Value) -> Result<Token> {
    check_supported(ty)?;
    match ty {
        AbiType::Uint(bits) => {
            let (negative, magnitude) = sign_and_magnitude(value)?;
            if negative && !magnitude.is_zero() {
                return Err(TaskError::encoding("negative value for unsigned type"));
            }
            if magnitude.bits() > *bits {
                return Err(TaskError::encoding(format!("value exceeds uint{bits}")));
            }
            Ok(Token::Uint(magnitude))
        },
        AbiType::Int(bits) => {
            let (negative, magnitude) = sign_and_magnitude(value)?;
            let negative = negative && !magnitude.is_zero();
            let raw = if negative {
                magnitude.overflowing_neg().0
            } else {
                magnitude
            };
            // Two's complement fits in `bits` iff every bit from the sign bit
            // up is a copy of the sign.
            let high = raw >> (bits - 1);
            let sign_fill = if negative { U256::MAX >> (bits - 1) } else { U256::zero() };
            if high != sign_fill {
                return Err(TaskError::encoding(format!("value exceeds int{bits}")));
            }
            Ok(Token::Int(raw))
        },
        AbiType::Bool => match value {
            Value::Bool(flag) => Ok(Token::Bool(*flag)),
            other => Err(TaskError::encoding(format!("expected a boolean, got {other}"))),
        },
        AbiType::Address => {
            let text = value
                .as_str()
                .ok_or_else(|| TaskError::encoding(format!("expected an address string, got {value}")))?;
            parse_address(text)
                .map(Token::Address)
                .map_err(|_| TaskError::encoding(format!("invalid address '{text}'")))
        },
        AbiType::FixedBytes(len) => {
            let bytes = hex_value(value)?;
            if bytes.len() != *len {
                return Err(TaskError::encoding(format!(
                    "expected {len} byte(s), got {}",
                    bytes.len()
                )));
            }
            Ok(Token::FixedBytes(bytes))
        },
        AbiType::Bytes => hex_value(value).map(Token::Bytes),
        AbiType::String => match value {
            Value::String(text) => Ok(Token::String(text.clone())),
            other => Err(TaskError::encoding(format!("expected a string, got {other}"))),
        },
        AbiType::Array(_) | AbiType::FixedArray(..) | AbiType::Tuple(_) => {
            Err(TaskError::encoding(format!("unsupported ABI type '{ty}'")))
        },
    }
}

/// Decodes ABI-encoded `data` as the tuple `types`.
///
/// Integers that fit in 64 bits decode to JSON numbers, larger ones to
/// decimal strings. Addresses and byte strings decode to `0x` hex.
pub fn decode(types: &[AbiType], data: &[u8]) -> Result<Vec<Value>> {
    for ty in types {
        check_supported(ty)?;
    }
    ethers::abi::decode(types, data)
        .map_err(|e| TaskError::encoding(format!("cannot decode output: {e}")))?
        .into_iter()
        .map(token_value)
        .collect()
}

fn token_value(token: Token) -> Result<Value> {
    Ok(match token {
        Token::Uint(value) => unsigned_value(value),
        Token::Int(raw) => {
            if raw.bit(255) {
                let magnitude = raw.overflowing_neg().0;
                if magnitude.bits() < 64 {
                    Value::from(-(magnitude.low_u64() as i64))
                } else {
                    Value::String(format!("-{magnitude}"))
                }
            } else {
                unsigned_value(raw)
            }
        },
        Token::Bool(flag) => Value::Bool(flag),
        Token::Address(address) => Value::String(encode_prefixed(address.as_bytes())),
        Token::FixedBytes(bytes) | Token::Bytes(bytes) => Value::String(encode_prefixed(&bytes)),
        Token::String(text) => Value::String(text),
        other => return Err(TaskError::encoding(format!("unsupported decoded token {other}"))),
    })
}

fn unsigned_value(value: U256) -> Value {
    if value.bits() <= 64 {
        Value::from(value.low_u64())
    } else {
        Value::String(value.to_string())
    }
}

/// Splits a JSON integer into sign and magnitude.
fn sign_and_magnitude(value: &Value) -> Result<(bool, U256)> {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                Ok((false, U256::from(u)))
            } else if let Some(i) = n.as_i64() {
                Ok((i < 0, U256::from(i.unsigned_abs())))
            } else {
                Err(TaskError::encoding(format!("expected an integer, got {n}")))
            }
        },
        Value::String(text) => {
            let text = text.trim();
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let magnitude = parse_magnitude(digits)
                .ok_or_else(|| TaskError::encoding(format!("invalid integer '{text}'")))?;
            Ok((negative, magnitude))
        },
        other => Err(TaskError::encoding(format!("expected an integer, got {other}"))),
    }
}

fn parse_magnitude(text: &str) -> Option<U256> {
    if text.starts_with("0x") || text.starts_with("0X") {
        let bytes = decode_prefixed(text).ok()?;
        if bytes.is_empty() || bytes.len() > 32 {
            return None;
        }
        Some(U256::from_big_endian(&bytes))
    } else if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) {
        U256::from_dec_str(text).ok()
    } else {
        None
    }
}

fn hex_value(value: &Value) -> Result<Vec<u8>> {
    let text = value
        .as_str()
        .ok_or_else(|| TaskError::encoding(format!("expected a hex string, got {value}")))?;
    decode_prefixed(text).map_err(|e| TaskError::encoding(format!("invalid hex '{text}': {e}")))
}
