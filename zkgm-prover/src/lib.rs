//! End-to-end membership proofs.
//!
//! [`ProofPipeline`] chains the other zkgm crates: rebuild the group, prove
//! membership, assemble circuit inputs, fetch artifacts, compute the witness,
//! hand it to a [`ProvingBackend`], and relay the result.

pub mod backend;
pub mod error;
pub mod pipeline;

pub use backend::{CommandProver, ProverOutput, ProvingBackend, PROOF_FILE, PUBLIC_FILE};
pub use error::{PipelineError, Result};
pub use pipeline::{
    onchain_uint, parse_target, MembershipRequest, PreparedWitness, ProofPipeline,
    SubmissionRequest, INPUT_FILE, WITNESS_FILE,
};
