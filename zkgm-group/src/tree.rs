//! Lean incremental Merkle tree over Poseidon.
//!
//! The shape matches the on-chain tree: leaves are paired left to right, and a
//! node without a right sibling is promoted to the next level unchanged rather
//! than hashed with a zero. Depth is therefore `ceil(log2(size))` and a
//! single-leaf tree has the leaf as its root.

use ark_ff::Zero;
use light_poseidon::{Poseidon, PoseidonHasher};
use zkgm_common::{Fr, MerkleProof};

use crate::error::{GroupError, Result};

/// Two-to-one Poseidon with the circom parameter set (t = 3).
pub struct NodeHasher {
    poseidon: Poseidon<Fr>,
}

impl NodeHasher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            poseidon: Poseidon::<Fr>::new_circom(2)?,
        })
    }

    pub fn hash(&mut self, left: &Fr, right: &Fr) -> Result<Fr> {
        Ok(self.poseidon.hash(&[*left, *right])?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves, the last level holds the root.
    levels: Vec<Vec<Fr>>,
}

impl MerkleTree {
    pub fn from_leaves(leaves: Vec<Fr>) -> Result<Self> {
        let mut hasher = NodeHasher::new()?;
        let mut levels = vec![leaves];

        loop {
            let current = &levels[levels.len() - 1];
            if current.len() <= 1 {
                break;
            }
            let mut next = Vec::with_capacity((current.len() + 1) / 2);
            for pair in current.chunks(2) {
                match pair {
                    [left, right] => next.push(hasher.hash(left, right)?),
                    [only] => next.push(*only),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                }
            }
            levels.push(next);
        }

        Ok(Self { levels })
    }

    /// Root of the tree; zero for an empty tree, as the contract reports.
    pub fn root(&self) -> Fr {
        self.levels
            .last()
            .and_then(|level| level.first())
            .copied()
            .unwrap_or_else(Fr::zero)
    }

    pub fn depth(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn size(&self) -> u64 {
        self.levels[0].len() as u64
    }

    pub fn leaves(&self) -> &[Fr] {
        &self.levels[0]
    }

    pub fn generate_proof(&self, leaf_index: u64) -> Result<MerkleProof> {
        let size = self.size();
        if leaf_index >= size {
            return Err(GroupError::LeafOutOfRange {
                index: leaf_index,
                size,
            });
        }

        let mut siblings = Vec::with_capacity(self.depth());
        let mut path_index = 0u64;
        let mut index = leaf_index as usize;

        for level in &self.levels[..self.depth()] {
            let is_right = index & 1 == 1;
            let sibling_index = if is_right { index - 1 } else { index + 1 };
            if let Some(sibling) = level.get(sibling_index) {
                if is_right {
                    path_index |= 1 << siblings.len();
                }
                siblings.push(*sibling);
            }
            index >>= 1;
        }

        Ok(MerkleProof {
            root: self.root(),
            leaf: self.levels[0][leaf_index as usize],
            index: path_index,
            siblings,
        })
    }

    /// Climb from the leaf with the proof's path bits and compare to its root.
    pub fn verify_proof(proof: &MerkleProof) -> Result<bool> {
        let mut hasher = NodeHasher::new()?;
        let mut node = proof.leaf;
        for (level, sibling) in proof.siblings.iter().enumerate() {
            node = if (proof.index >> level) & 1 == 1 {
                hasher.hash(sibling, &node)?
            } else {
                hasher.hash(&node, sibling)?
            };
        }
        Ok(node == proof.root)
    }
}
