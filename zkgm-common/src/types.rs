//! Data model shared across the pipeline crates.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use crate::field::{serde_fr, Fr};

/// One entry of the membership feed.
///
/// `index` is assigned by the issuing authority and is the only valid
/// ordering. A removed member keeps its index with a zero commitment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipRecord {
    #[serde(deserialize_with = "u64_from_number_or_string")]
    pub index: u64,
    #[serde(rename = "identityCommitment", alias = "commitment", with = "serde_fr")]
    pub commitment: Fr,
}

impl MembershipRecord {
    pub fn new(index: u64, commitment: Fr) -> Self {
        Self { index, commitment }
    }

    pub fn is_removed(&self) -> bool {
        crate::field::is_zero(&self.commitment)
    }
}

/// Inclusion proof for a leaf of the lean incremental Merkle tree.
///
/// Levels where the node had no sibling are skipped, so `siblings.len()` may
/// be smaller than the tree depth. Bit `i` of `index` tells whether the node
/// was the right child at the `i`-th recorded sibling level.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    #[serde(with = "serde_fr")]
    pub root: Fr,
    #[serde(with = "serde_fr")]
    pub leaf: Fr,
    pub index: u64,
    #[serde(with = "serde_fr::vec")]
    pub siblings: Vec<Fr>,
}

/// Identifies a compiled circuit and its parameter set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CircuitIdentifier {
    pub family: String,
    #[serde(default)]
    pub parameters: Vec<u32>,
    pub version: String,
}

impl CircuitIdentifier {
    pub fn new(family: impl Into<String>, parameters: Vec<u32>, version: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            parameters,
            version: version.into(),
        }
    }

    /// Membership circuit for a given Merkle depth.
    pub fn semaphore(depth: u32, version: impl Into<String>) -> Self {
        Self::new("semaphore", vec![depth], version)
    }

    /// `family-p1-p2...`, the stem shared by both artifact files.
    pub fn file_stem(&self) -> String {
        let mut stem = self.family.clone();
        for param in &self.parameters {
            stem.push('-');
            stem.push_str(&param.to_string());
        }
        stem
    }
}

/// Local locations of the two binary artifacts a proof needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBundle {
    pub circuit_binary: PathBuf,
    pub proving_key: PathBuf,
}

/// Size and blake3 digest recorded for a cached artifact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFile {
    pub path: String,
    pub blake3: String,
    pub size: u64,
}

impl ArtifactFile {
    pub fn from_bytes(path: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            path: path.into(),
            blake3: hash_bytes_hex(bytes),
            size: bytes.len() as u64,
        }
    }

    pub fn resolve_path(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.path)
    }
}

pub fn hash_bytes_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn u64_from_number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    use serde::de::Error as _;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(D::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accepts_subgraph_shape() {
        let json = r#"{ "id": "x", "index": "3", "identityCommitment": "1234" }"#;
        let record: MembershipRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record, MembershipRecord::new(3, Fr::from(1234u64)));

        let json = r#"{ "index": 0, "commitment": "0" }"#;
        let record: MembershipRecord = serde_json::from_str(json).unwrap();
        assert!(record.is_removed());
    }

    #[test]
    fn record_rejects_out_of_field_commitment() {
        let json = format!(
            r#"{{ "index": 0, "identityCommitment": "{}" }}"#,
            crate::field::modulus()
        );
        assert!(serde_json::from_str::<MembershipRecord>(&json).is_err());
    }

    #[test]
    fn file_stem_joins_parameters() {
        assert_eq!(CircuitIdentifier::semaphore(20, "4.0.0").file_stem(), "semaphore-20");
        assert_eq!(CircuitIdentifier::new("poseidon", vec![], "1").file_stem(), "poseidon");
        assert_eq!(
            CircuitIdentifier::new("multi", vec![2, 16], "1").file_stem(),
            "multi-2-16"
        );
    }

    #[test]
    fn artifact_file_records_digest() {
        let file = ArtifactFile::from_bytes("semaphore-1.wasm", b"\0asm");
        assert_eq!(file.size, 4);
        assert_eq!(file.blake3, hash_bytes_hex(b"\0asm"));
        assert_eq!(
            file.resolve_path(Path::new("/cache")),
            PathBuf::from("/cache/semaphore-1.wasm")
        );
    }
}
