//! Shared building blocks for the zkgm membership-proof pipeline.
//!
//! - [`field`]: encoding of scalars and strings into the BN254 field.
//! - [`types`]: membership records, Merkle proofs, circuit identifiers and
//!   artifact bundles.
//! - [`config`]: layered [`Settings`].

pub mod config;
pub mod field;
pub mod types;

pub use config::Settings;
pub use field::{
    biguint_to_fr, encode, fr_to_biguint, fr_to_decimal, hash_to_field, modulus,
    parse_fr_decimal, FieldError, FieldValue, Fr,
};
pub use types::{
    hash_bytes_hex, ArtifactBundle, ArtifactFile, CircuitIdentifier, MembershipRecord,
    MerkleProof,
};
