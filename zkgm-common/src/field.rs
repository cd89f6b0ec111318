//! Canonical encoding of arbitrary values into the BN254 scalar field.
//!
//! Two encodings live here:
//!
//! - [`encode`] reduces integers directly and hashes free-form text
//!   (`keccak256(utf8) >> 8`). It is used for private values such as the
//!   identity secret and for anything read from the membership feed.
//! - [`hash_to_field`] mirrors the verifier contract's `_hash(uint256)`:
//!   integers are ABI-encoded as a 32-byte word before hashing. Public
//!   `scope` and `message` signals must go through this one, otherwise the
//!   on-chain check recomputes a different value.

use std::fmt;

use ark_ff::{BigInteger, PrimeField, Zero};
use num_bigint::BigUint;
use num_traits::Num;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// BN254 scalar field element, the native field of the membership circuit.
pub type Fr = ark_bn254::Fr;

static MODULUS: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&Fr::MODULUS.to_bytes_be()));

/// Errors raised while turning user data into field elements.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("malformed hex value: {0}")]
    MalformedHex(String),

    #[error("malformed decimal value: {0}")]
    MalformedDecimal(String),

    #[error("value does not fit in a uint256 word: {0}")]
    Uint256Overflow(String),

    #[error("value is not a canonical field element (>= field modulus): {0}")]
    NotCanonical(String),
}

/// A value destined for the field, before encoding.
///
/// Serialized as a string; JSON numbers and strings are both accepted and
/// classified with [`FieldValue::parse`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Integer(BigUint),
    Text(String),
}

impl FieldValue {
    /// Classify a raw string.
    ///
    /// Plain decimal digits and `0x`-prefixed strings are integers; a `0x`
    /// prefix followed by non-hex characters is an error rather than text so
    /// that typos never silently become a different hash.
    pub fn parse(raw: &str) -> Result<Self, FieldError> {
        if let Some(hex_digits) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
            if hex_digits.is_empty() {
                return Err(FieldError::MalformedHex(raw.to_string()));
            }
            return BigUint::from_str_radix(hex_digits, 16)
                .map(FieldValue::Integer)
                .map_err(|_| FieldError::MalformedHex(raw.to_string()));
        }
        if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) {
            return BigUint::from_str_radix(raw, 10)
                .map(FieldValue::Integer)
                .map_err(|_| FieldError::MalformedDecimal(raw.to_string()));
        }
        Ok(FieldValue::Text(raw.to_string()))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, FieldValue::Integer(_))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::Integer(BigUint::from(value))
    }
}

impl From<BigUint> for FieldValue {
    fn from(value: BigUint) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(n) => write!(f, "{}", n),
            FieldValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

/// The BN254 scalar field modulus.
pub fn modulus() -> &'static BigUint {
    &MODULUS
}

/// Encode a value into the field.
///
/// Integers are reduced modulo the prime. Text is hashed with keccak256 and
/// shifted right by one byte before reduction, so the result always fits
/// strictly inside the field.
pub fn encode(value: &FieldValue) -> Fr {
    match value {
        FieldValue::Integer(n) => biguint_to_fr(n),
        FieldValue::Text(s) => keccak_shifted(s.as_bytes()),
    }
}

/// Encode a public signal the way the verifier contract does.
pub fn hash_to_field(value: &FieldValue) -> Result<Fr, FieldError> {
    match value {
        FieldValue::Integer(n) => {
            let word = uint256_word(n)?;
            Ok(keccak_shifted(&word))
        }
        FieldValue::Text(s) => Ok(keccak_shifted(s.as_bytes())),
    }
}

/// Big-endian 32-byte ABI word for an unsigned integer.
pub fn uint256_word(value: &BigUint) -> Result<[u8; 32], FieldError> {
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(FieldError::Uint256Overflow(value.to_string()));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

fn keccak_shifted(bytes: &[u8]) -> Fr {
    let digest = Keccak256::digest(bytes);
    let shifted = BigUint::from_bytes_be(&digest) >> 8u32;
    biguint_to_fr(&shifted)
}

pub fn biguint_to_fr(value: &BigUint) -> Fr {
    Fr::from_be_bytes_mod_order(&value.to_bytes_be())
}

pub fn fr_to_biguint(value: &Fr) -> BigUint {
    BigUint::from_bytes_be(&value.into_bigint().to_bytes_be())
}

pub fn fr_to_decimal(value: &Fr) -> String {
    fr_to_biguint(value).to_string()
}

/// Parse a decimal (or `0x` hex) string that must already be a field element.
pub fn parse_fr_decimal(raw: &str) -> Result<Fr, FieldError> {
    let trimmed = raw.trim();
    let value = match FieldValue::parse(trimmed)? {
        FieldValue::Integer(n) => n,
        FieldValue::Text(_) => return Err(FieldError::MalformedDecimal(raw.to_string())),
    };
    if &value >= modulus() {
        return Err(FieldError::NotCanonical(raw.to_string()));
    }
    Ok(biguint_to_fr(&value))
}

pub fn is_zero(value: &Fr) -> bool {
    value.is_zero()
}

impl Serialize for FieldValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Integer(n) => serializer.serialize_str(&n.to_string()),
            FieldValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        use serde::de::Error as _;

        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => FieldValue::parse(&s).map_err(D::Error::custom),
            serde_json::Value::Number(n) => n
                .as_u64()
                .map(FieldValue::from)
                .ok_or_else(|| D::Error::custom(format!("expected unsigned integer, got {}", n))),
            other => Err(D::Error::custom(format!("expected string or integer, got {}", other))),
        }
    }
}

/// Serde adapter encoding [`Fr`] as a decimal string.
///
/// Accepts decimal strings, `0x` hex strings and plain JSON numbers on input.
pub mod serde_fr {
    use super::{biguint_to_fr, fr_to_decimal, parse_fr_decimal, Fr};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(value: &Fr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fr_to_decimal(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fr, D::Error> {
        let value = Value::deserialize(deserializer)?;
        from_json(&value).map_err(D::Error::custom)
    }

    pub(crate) fn from_json(value: &Value) -> Result<Fr, String> {
        match value {
            Value::String(s) => parse_fr_decimal(s).map_err(|e| e.to_string()),
            Value::Number(n) => n
                .as_u64()
                .map(|v| biguint_to_fr(&num_bigint::BigUint::from(v)))
                .ok_or_else(|| format!("field element must be a non-negative integer, got {}", n)),
            other => Err(format!("expected field element, got {}", other)),
        }
    }

    pub mod vec {
        use super::{from_json, Fr};
        use crate::field::fr_to_decimal;
        use serde::{de::Error as _, ser::SerializeSeq, Deserialize, Deserializer, Serializer};
        use serde_json::Value;

        pub fn serialize<S: Serializer>(values: &[Fr], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(values.len()))?;
            for value in values {
                seq.serialize_element(&fr_to_decimal(value))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fr>, D::Error> {
            let values = Vec::<Value>::deserialize(deserializer)?;
            values
                .iter()
                .map(|v| from_json(v).map_err(D::Error::custom))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_classifies_values() {
        assert_eq!(FieldValue::parse("42").unwrap(), FieldValue::from(42u64));
        assert_eq!(FieldValue::parse("0x2a").unwrap(), FieldValue::from(42u64));
        assert_eq!(
            FieldValue::parse("hello world").unwrap(),
            FieldValue::Text("hello world".into())
        );
        assert_eq!(FieldValue::parse("").unwrap(), FieldValue::Text(String::new()));
    }

    #[test]
    fn parse_rejects_malformed_hex() {
        assert!(matches!(
            FieldValue::parse("0xnothex"),
            Err(FieldError::MalformedHex(_))
        ));
        assert!(matches!(FieldValue::parse("0x"), Err(FieldError::MalformedHex(_))));
    }

    #[test]
    fn integers_reduce_modulo_prime() {
        let p_plus_five = modulus() + BigUint::from(5u32);
        assert_eq!(encode(&FieldValue::Integer(p_plus_five)), Fr::from(5u64));
        assert_eq!(encode(&FieldValue::from(7u64)), Fr::from(7u64));
    }

    #[test]
    fn text_is_keccak_shifted() {
        let digest = Keccak256::digest(b"scope-a");
        let expected = BigUint::from_bytes_be(&digest) >> 8u32;
        assert_eq!(fr_to_biguint(&encode(&"scope-a".into())), expected);
    }

    #[test]
    fn hash_to_field_abi_encodes_integers() {
        let mut word = [0u8; 32];
        word[31] = 3;
        let expected = BigUint::from_bytes_be(&Keccak256::digest(word)) >> 8u32;
        assert_eq!(
            fr_to_biguint(&hash_to_field(&FieldValue::from(3u64)).unwrap()),
            expected
        );
        // The UTF-8 route for the same digits is a different value.
        assert_ne!(
            hash_to_field(&FieldValue::from(3u64)).unwrap(),
            hash_to_field(&FieldValue::Text("3".into())).unwrap()
        );
    }

    #[test]
    fn hash_to_field_rejects_oversized_integers() {
        let too_big = BigUint::from(1u8) << 256u32;
        assert!(matches!(
            hash_to_field(&FieldValue::Integer(too_big)),
            Err(FieldError::Uint256Overflow(_))
        ));
    }

    #[test]
    fn parse_fr_decimal_rejects_non_canonical() {
        let p = modulus().to_string();
        assert!(matches!(parse_fr_decimal(&p), Err(FieldError::NotCanonical(_))));
        assert_eq!(parse_fr_decimal("12").unwrap(), Fr::from(12u64));
        assert!(parse_fr_decimal("twelve").is_err());
    }

    proptest! {
        #[test]
        fn encode_is_deterministic_and_in_field(text in ".*", n in any::<u128>()) {
            let a = encode(&FieldValue::Text(text.clone()));
            let b = encode(&FieldValue::Text(text));
            prop_assert_eq!(a, b);
            prop_assert!(&fr_to_biguint(&a) < modulus());

            let big = BigUint::from(n) * BigUint::from(n) * BigUint::from(n);
            let c = encode(&FieldValue::Integer(big.clone()));
            prop_assert_eq!(fr_to_biguint(&c), big % modulus());
        }
    }
}
