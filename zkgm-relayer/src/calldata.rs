//! Groth16 proof packing and `verifyAccount` calldata.

use ethers::{
    abi::{self, Token},
    types::{Bytes, U256},
    utils::id,
};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

pub const VERIFY_ACCOUNT_SIGNATURE: &str =
    "verifyAccount(uint256,(uint256,uint256,uint256,uint256,uint256,uint256[8]))";

/// Groth16 proof in the JSON layout snarkjs and rapidsnark emit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
}

impl Groth16Proof {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| RelayError::InvalidProof(e.to_string()))
    }
}

/// Flatten a proof into the eight words the on-chain verifier expects.
///
/// The G2 point `b` has its coordinate pairs swapped:
/// `[a0, a1, b01, b00, b11, b10, c0, c1]`.
pub fn pack_groth16_proof(proof: &Groth16Proof) -> Result<[U256; 8]> {
    let a = |i: usize| coordinate(&proof.pi_a, i, "pi_a");
    let c = |i: usize| coordinate(&proof.pi_c, i, "pi_c");
    let b = |i: usize, j: usize| {
        let row = proof
            .pi_b
            .get(i)
            .ok_or_else(|| RelayError::InvalidProof(format!("pi_b is missing row {}", i)))?;
        coordinate(row, j, "pi_b")
    };

    Ok([
        a(0)?,
        a(1)?,
        b(0, 1)?,
        b(0, 0)?,
        b(1, 1)?,
        b(1, 0)?,
        c(0)?,
        c(1)?,
    ])
}

fn coordinate(values: &[String], index: usize, name: &str) -> Result<U256> {
    let raw = values
        .get(index)
        .ok_or_else(|| RelayError::InvalidProof(format!("{} is missing coordinate {}", name, index)))?;
    parse_uint(raw)
}

/// Parse a decimal or `0x`-prefixed hex string into a 256-bit word.
pub fn parse_uint(raw: &str) -> Result<U256> {
    let trimmed = raw.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) => U256::from_str_radix(hex, 16).ok(),
        None => U256::from_dec_str(trimmed).ok(),
    };
    parsed.ok_or_else(|| RelayError::InvalidProof(format!("not a uint256: {:?}", raw)))
}

/// Membership proof as the verifier contract takes it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SemaphoreProof {
    pub merkle_tree_depth: u64,
    pub merkle_tree_root: U256,
    pub nullifier: U256,
    /// Raw message; the contract hashes it into the field itself.
    pub message: U256,
    /// Raw scope; hashed on-chain like `message`.
    pub scope: U256,
    pub points: [U256; 8],
}

impl SemaphoreProof {
    /// Combine a prover's output with the public values it was made for.
    ///
    /// The circuit publishes `[root, nullifier, ...]`; only the first two are
    /// taken from the signals.
    pub fn from_prover_output(
        merkle_tree_depth: u64,
        proof: &Groth16Proof,
        public_signals: &[String],
        message: U256,
        scope: U256,
    ) -> Result<Self> {
        if public_signals.len() < 2 {
            return Err(RelayError::InvalidProof(format!(
                "expected at least 2 public signals, found {}",
                public_signals.len()
            )));
        }
        Ok(Self {
            merkle_tree_depth,
            merkle_tree_root: parse_uint(&public_signals[0])?,
            nullifier: parse_uint(&public_signals[1])?,
            message,
            scope,
            points: pack_groth16_proof(proof)?,
        })
    }

    fn to_token(&self) -> Token {
        Token::Tuple(vec![
            Token::Uint(U256::from(self.merkle_tree_depth)),
            Token::Uint(self.merkle_tree_root),
            Token::Uint(self.nullifier),
            Token::Uint(self.message),
            Token::Uint(self.scope),
            Token::FixedArray(self.points.iter().copied().map(Token::Uint).collect()),
        ])
    }
}

/// Calldata for `verifyAccount(groupId, proof)`.
pub fn encode_verify_account(group_id: u64, proof: &SemaphoreProof) -> Bytes {
    let mut data = id(VERIFY_ACCOUNT_SIGNATURE).to_vec();
    data.extend(abi::encode(&[Token::Uint(U256::from(group_id)), proof.to_token()]));
    Bytes::from(data)
}
