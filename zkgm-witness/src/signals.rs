//! Named input signals and their addressing inside the kernel.
//!
//! The kernel does not know signal names. Each name is hashed with 64-bit
//! FNV-1a and passed as two 32-bit halves; array signals are flattened and
//! their elements addressed by position under the same hash.

use std::str::FromStr;

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{Num, Zero};
use serde_json::Value;
use zkgm_common::{fr_to_biguint, Fr};

use crate::error::{Result, WitnessError};

const FNV_OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01B3;

pub fn fnv1a64(name: &str) -> u64 {
    name.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// `(msb, lsb)` halves of the signal name hash.
pub fn signal_hash(name: &str) -> (u32, u32) {
    let hash = fnv1a64(name);
    ((hash >> 32) as u32, hash as u32)
}

/// A scalar or an arbitrarily nested array of scalars.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignalValue {
    Scalar(BigInt),
    Array(Vec<SignalValue>),
}

impl SignalValue {
    /// Depth-first flattening, the order in which elements are assigned.
    pub fn flatten(&self) -> Vec<&BigInt> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a BigInt>) {
        match self {
            SignalValue::Scalar(value) => out.push(value),
            SignalValue::Array(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    /// Accepts JSON numbers, decimal or `0x` hex strings (optionally
    /// negative) and nested arrays of those.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Ok(SignalValue::Scalar(BigInt::from(v)))
                } else if let Some(v) = n.as_i64() {
                    Ok(SignalValue::Scalar(BigInt::from(v)))
                } else {
                    Err(WitnessError::InvalidInput(format!(
                        "non-integer number {}",
                        n
                    )))
                }
            }
            Value::String(s) => parse_scalar(s).map(SignalValue::Scalar),
            Value::Array(items) => items
                .iter()
                .map(SignalValue::from_json)
                .collect::<Result<Vec<_>>>()
                .map(SignalValue::Array),
            other => Err(WitnessError::InvalidInput(format!(
                "unsupported signal value {}",
                other
            ))),
        }
    }
}

fn parse_scalar(raw: &str) -> Result<BigInt> {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => BigUint::from_str_radix(hex, 16),
        None => BigUint::from_str(digits),
    }
    .map_err(|e| WitnessError::InvalidInput(format!("cannot parse {:?}: {}", raw, e)))?;

    let sign = if negative { Sign::Minus } else { Sign::Plus };
    Ok(BigInt::from_biguint(sign, magnitude))
}

impl From<u64> for SignalValue {
    fn from(value: u64) -> Self {
        SignalValue::Scalar(BigInt::from(value))
    }
}

impl From<&Fr> for SignalValue {
    fn from(value: &Fr) -> Self {
        SignalValue::Scalar(BigInt::from(fr_to_biguint(value)))
    }
}

impl<T: Into<SignalValue>> From<Vec<T>> for SignalValue {
    fn from(values: Vec<T>) -> Self {
        SignalValue::Array(values.into_iter().map(Into::into).collect())
    }
}

/// Ordered list of named inputs, applied to the kernel in insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignalInputs {
    entries: Vec<(String, SignalValue)>,
}

impl SignalInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `name`, replacing any earlier value under the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<SignalValue>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    /// Build from raw pairs without merging repeated names.
    pub fn from_pairs(entries: Vec<(String, SignalValue)>) -> Self {
        Self { entries }
    }

    /// A JSON object mapping signal names to values.
    pub fn from_json(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| WitnessError::InvalidInput("input must be a JSON object".into()))?;
        let mut inputs = Self::new();
        for (name, value) in object {
            inputs.insert(name.clone(), SignalValue::from_json(value)?);
        }
        Ok(inputs)
    }

    pub fn get(&self, name: &str) -> Option<&SignalValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SignalValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of scalar elements across all signals.
    pub fn element_count(&self) -> usize {
        self.entries.iter().map(|(_, v)| v.flatten().len()).sum()
    }
}

/// Reduce into `[0, prime)`, mapping negatives to their field representative.
pub fn normalize(value: &BigInt, prime: &BigUint) -> BigUint {
    let modulus = BigInt::from(prime.clone());
    let mut reduced = value % &modulus;
    if reduced.sign() == Sign::Minus {
        reduced += &modulus;
    }
    reduced.to_biguint().unwrap_or_else(BigUint::zero)
}

/// `n32` 32-bit words, least significant first.
pub fn to_words(value: &BigUint, n32: usize) -> Vec<u32> {
    let mut words = value.to_u32_digits();
    words.resize(n32, 0);
    words
}

pub fn from_words(words: &[u32]) -> BigUint {
    BigUint::new(words.to_vec())
}
