use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use zkgm_common::{fr_to_decimal, Fr, MembershipRecord};

/// WAT source of a depth-2 membership kernel speaking the circom runtime ABI.
pub const MOCK_KERNEL_WAT: &str = include_str!("../data/mock_kernel.wat");
pub const MOCK_KERNEL_DEPTH: usize = 2;
pub const MOCK_KERNEL_INPUT_SIZE: u32 = 8;
pub const MOCK_KERNEL_WITNESS_SIZE: u32 = 9;

const MOCK_INPUT_JSON: &str = include_str!("../data/mock_input.json");
const PROOF_JSON: &str = include_str!("../data/proof.json");
const PUBLIC_JSON: &str = include_str!("../data/public.json");

static FIXTURES: OnceCell<TestFixtures> = OnceCell::new();

/// Parsed sample data shared across test binaries.
pub struct TestFixtures {
    mock_input: Value,
    proof: Value,
    public_signals: Value,
}

impl TestFixtures {
    /// Complete input map for the mock kernel.
    pub fn mock_input(&self) -> &Value {
        &self.mock_input
    }

    /// Groth16 proof in snarkjs JSON layout.
    pub fn proof(&self) -> &Value {
        &self.proof
    }

    pub fn proof_json(&self) -> &'static str {
        PROOF_JSON
    }

    /// Public signals `[root, nullifier, message, scope]`.
    pub fn public_signals(&self) -> &Value {
        &self.public_signals
    }

    pub fn public_json(&self) -> &'static str {
        PUBLIC_JSON
    }
}

pub fn fixtures() -> &'static TestFixtures {
    FIXTURES.get_or_init(|| TestFixtures {
        mock_input: serde_json::from_str(MOCK_INPUT_JSON).expect("mock input fixture"),
        proof: serde_json::from_str(PROOF_JSON).expect("proof fixture"),
        public_signals: serde_json::from_str(PUBLIC_JSON).expect("public signals fixture"),
    })
}

pub fn mock_kernel() -> &'static [u8] {
    MOCK_KERNEL_WAT.as_bytes()
}

pub fn record(index: u64, commitment: u64) -> MembershipRecord {
    MembershipRecord::new(index, Fr::from(commitment))
}

/// Three members with the middle one removed: `[(0,5),(1,0),(2,9)]`.
pub fn sample_records() -> Vec<MembershipRecord> {
    vec![record(0, 5), record(1, 0), record(2, 9)]
}

/// `count` live members with commitments `1..=count`.
pub fn numbered_records(count: u64) -> Vec<MembershipRecord> {
    (0..count).map(|index| record(index, index + 1)).collect()
}

/// Subgraph GraphQL body answering a members query.
pub fn subgraph_response(records: &[MembershipRecord]) -> Value {
    let members: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "index": r.index.to_string(),
                "identityCommitment": fr_to_decimal(&r.commitment),
            })
        })
        .collect();
    json!({ "data": { "group": { "members": members } } })
}

/// Subgraph body for a group that was never indexed.
pub fn subgraph_missing_group() -> Value {
    json!({ "data": { "group": null } })
}
