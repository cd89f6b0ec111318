//! Fee-relayed submission of membership proofs.
//!
//! A prover's Groth16 output is packed into `verifyAccount` calldata
//! ([`calldata`]), handed to a relay that pays gas on the caller's behalf
//! ([`client`]), and the resulting relay task is polled until it settles
//! ([`submission`]).

pub mod calldata;
pub mod client;
pub mod error;
pub mod submission;
pub mod task;

pub use calldata::{
    encode_verify_account, pack_groth16_proof, parse_uint, Groth16Proof, SemaphoreProof,
    VERIFY_ACCOUNT_SIGNATURE,
};
pub use client::{GelatoRelay, RelayApi, RelayRequest};
pub use error::{RelayError, Result};
pub use submission::{parse_address, PollOutcome, ProofSubmissionClient, DEFAULT_POLL_INTERVAL};
pub use task::{RelayTask, TaskState, TaskStatus};
