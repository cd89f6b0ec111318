//! Witness computation for the membership circuit.
//!
//! [`CircuitInputAssembler`] turns a secret, an inclusion proof and the public
//! scope/message into named circuit inputs; [`Kernel`] runs the compiled
//! circuit over them and yields a [`WitnessVector`], which serializes to the
//! `wtns` container a Groth16 prover reads.

pub mod error;
pub mod inputs;
pub mod kernel;
pub mod signals;
pub mod wtns;

pub use error::{KernelFault, Result, WitnessError};
pub use inputs::{CircuitInputAssembler, WitnessInput, MAX_TREE_DEPTH};
pub use kernel::{Kernel, KernelOptions, KernelState, WitnessEngine};
pub use signals::{fnv1a64, signal_hash, SignalInputs, SignalValue};
pub use wtns::WitnessVector;
