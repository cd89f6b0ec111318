//! Assembly of the membership circuit's input signals.

use serde::{Deserialize, Serialize};
use zkgm_common::{field::serde_fr, hash_to_field, FieldValue, Fr, MerkleProof};

use crate::{
    error::{Result, WitnessError},
    signals::{SignalInputs, SignalValue},
};

/// Deepest tree the membership circuits are compiled for.
pub const MAX_TREE_DEPTH: usize = 32;

/// Inputs of the membership circuit, named as the circuit names them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WitnessInput {
    #[serde(with = "serde_fr")]
    pub secret: Fr,
    /// Number of real siblings in the proof.
    pub merkle_proof_length: usize,
    pub merkle_proof_indices: Vec<u8>,
    #[serde(with = "serde_fr::vec")]
    pub merkle_proof_siblings: Vec<Fr>,
    #[serde(with = "serde_fr")]
    pub scope: Fr,
    #[serde(with = "serde_fr")]
    pub message: Fr,
}

impl WitnessInput {
    /// Tree depth the input was padded to.
    pub fn depth(&self) -> usize {
        self.merkle_proof_siblings.len()
    }

    pub fn to_signals(&self) -> SignalInputs {
        let mut signals = SignalInputs::new();
        signals.insert("secret", &self.secret);
        signals.insert("merkleProofLength", self.merkle_proof_length as u64);
        signals.insert(
            "merkleProofIndices",
            SignalValue::from(
                self.merkle_proof_indices
                    .iter()
                    .map(|bit| u64::from(*bit))
                    .collect::<Vec<_>>(),
            ),
        );
        signals.insert(
            "merkleProofSiblings",
            SignalValue::Array(self.merkle_proof_siblings.iter().map(SignalValue::from).collect()),
        );
        signals.insert("scope", &self.scope);
        signals.insert("message", &self.message);
        signals
    }
}

/// Builds [`WitnessInput`]s for a circuit of fixed or proof-derived depth.
#[derive(Clone, Copy, Debug, Default)]
pub struct CircuitInputAssembler {
    depth: Option<usize>,
}

impl CircuitInputAssembler {
    /// Pads to the proof's own length (at least one level).
    pub fn new() -> Self {
        Self::default()
    }

    /// Pads every proof to the depth the circuit was compiled for.
    pub fn with_depth(depth: usize) -> Result<Self> {
        check_depth_range(depth)?;
        Ok(Self { depth: Some(depth) })
    }

    pub fn fixed_depth(&self) -> Option<usize> {
        self.depth
    }

    /// Depth the given proof will be padded to.
    pub fn depth_for(&self, proof: &MerkleProof) -> Result<usize> {
        let real = proof.siblings.len();
        let depth = self.depth.unwrap_or_else(|| real.max(1));
        check_depth_range(depth)?;
        if depth < real {
            return Err(WitnessError::InvalidDepth {
                depth,
                reason: format!("proof has {} siblings", real),
            });
        }
        Ok(depth)
    }

    /// Combine the identity secret, its inclusion proof and the public scope
    /// and message into circuit inputs. Pure; no I/O.
    pub fn assemble(
        &self,
        secret: &Fr,
        proof: &MerkleProof,
        scope: &FieldValue,
        message: &FieldValue,
    ) -> Result<WitnessInput> {
        let depth = self.depth_for(proof)?;

        let merkle_proof_indices = (0..depth)
            .map(|i| if i < 64 { ((proof.index >> i) & 1) as u8 } else { 0 })
            .collect();
        let merkle_proof_siblings = (0..depth)
            .map(|i| proof.siblings.get(i).copied().unwrap_or_default())
            .collect();

        Ok(WitnessInput {
            secret: *secret,
            merkle_proof_length: proof.siblings.len(),
            merkle_proof_indices,
            merkle_proof_siblings,
            scope: hash_to_field(scope)?,
            message: hash_to_field(message)?,
        })
    }
}

fn check_depth_range(depth: usize) -> Result<()> {
    if !(1..=MAX_TREE_DEPTH).contains(&depth) {
        return Err(WitnessError::InvalidDepth {
            depth,
            reason: format!("supported depths are 1..={}", MAX_TREE_DEPTH),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn proof(index: u64, siblings: &[u64]) -> MerkleProof {
        MerkleProof {
            root: Fr::from(1u64),
            leaf: Fr::from(2u64),
            index,
            siblings: siblings.iter().map(|s| Fr::from(*s)).collect(),
        }
    }

    fn scope() -> FieldValue {
        FieldValue::from(32u64)
    }

    fn message() -> FieldValue {
        FieldValue::Text("hello".into())
    }

    #[test]
    fn pads_short_proofs_with_zero() {
        let assembler = CircuitInputAssembler::with_depth(4).unwrap();
        let input = assembler
            .assemble(&Fr::from(7u64), &proof(0b01, &[10, 11]), &scope(), &message())
            .unwrap();

        assert_eq!(input.merkle_proof_length, 2);
        assert_eq!(input.merkle_proof_indices, vec![1, 0, 0, 0]);
        assert_eq!(
            input.merkle_proof_siblings,
            vec![Fr::from(10u64), Fr::from(11u64), Fr::from(0u64), Fr::from(0u64)]
        );
        assert_eq!(input.depth(), 4);
    }

    #[test]
    fn proof_derived_depth_has_at_least_one_level() {
        let assembler = CircuitInputAssembler::new();
        let input = assembler
            .assemble(&Fr::from(7u64), &proof(0, &[]), &scope(), &message())
            .unwrap();
        assert_eq!(input.merkle_proof_length, 0);
        assert_eq!(input.merkle_proof_indices, vec![0]);
        assert_eq!(input.merkle_proof_siblings, vec![Fr::from(0u64)]);
    }

    #[test]
    fn rejects_depth_shorter_than_proof() {
        let assembler = CircuitInputAssembler::with_depth(1).unwrap();
        assert!(matches!(
            assembler.assemble(&Fr::from(7u64), &proof(0, &[1, 2]), &scope(), &message()),
            Err(WitnessError::InvalidDepth { depth: 1, .. })
        ));
        assert!(CircuitInputAssembler::with_depth(0).is_err());
        assert!(CircuitInputAssembler::with_depth(33).is_err());
    }

    #[test]
    fn public_values_are_hashed_into_the_field() {
        let input = CircuitInputAssembler::new()
            .assemble(&Fr::from(7u64), &proof(0, &[1]), &scope(), &message())
            .unwrap();
        assert_eq!(input.scope, hash_to_field(&scope()).unwrap());
        assert_eq!(input.message, hash_to_field(&message()).unwrap());
    }

    #[test]
    fn signals_use_circuit_names() {
        let input = CircuitInputAssembler::with_depth(2)
            .unwrap()
            .assemble(&Fr::from(7u64), &proof(1, &[5]), &scope(), &message())
            .unwrap();
        let signals = input.to_signals();
        let names: Vec<&str> = signals.iter().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec![
                "secret",
                "merkleProofLength",
                "merkleProofIndices",
                "merkleProofSiblings",
                "scope",
                "message"
            ]
        );
        assert_eq!(signals.element_count(), 8);
    }

    #[test]
    fn serializes_with_circuit_field_names() {
        let input = CircuitInputAssembler::with_depth(2)
            .unwrap()
            .assemble(&Fr::from(7u64), &proof(1, &[5]), &scope(), &message())
            .unwrap();
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["secret"], "7");
        assert_eq!(json["merkleProofLength"], 1);
        assert_eq!(json["merkleProofSiblings"][1], "0");
        let back: WitnessInput = serde_json::from_value(json).unwrap();
        assert_eq!(back, input);
    }

    proptest! {
        #[test]
        fn indices_are_bits_of_the_leaf_index(index in 0u64..(1 << 20), real in 0usize..20) {
            let siblings: Vec<u64> = (1..=real as u64).collect();
            let input = CircuitInputAssembler::with_depth(20)
                .unwrap()
                .assemble(&Fr::from(1u64), &proof(index, &siblings), &scope(), &message())
                .unwrap();
            prop_assert_eq!(input.merkle_proof_indices.len(), 20);
            prop_assert_eq!(input.merkle_proof_siblings.len(), 20);
            for (i, bit) in input.merkle_proof_indices.iter().enumerate() {
                prop_assert_eq!(u64::from(*bit), (index >> i) & 1);
            }
            for sibling in &input.merkle_proof_siblings[real..] {
                prop_assert_eq!(*sibling, Fr::from(0u64));
            }
        }

        #[test]
        fn assembly_is_deterministic(index in 0u64..16, secret in any::<u64>()) {
            let assembler = CircuitInputAssembler::with_depth(4).unwrap();
            let p = proof(index, &[3, 4, 5]);
            let a = assembler.assemble(&Fr::from(secret), &p, &scope(), &message()).unwrap();
            let b = assembler.assemble(&Fr::from(secret), &p, &scope(), &message()).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
