//! Membership reconstruction.
//!
//! Rebuilds a group's member list from the indexing service and the lean
//! incremental Merkle tree over it, exactly as the membership contract stores
//! it, and produces inclusion proofs for a member's commitment.

pub mod error;
pub mod feed;
pub mod group;
pub mod oracle;
pub mod tree;

pub use error::{GroupError, Result};
pub use feed::{MembershipFeed, SubgraphFeed};
pub use group::{Group, GroupReconstructor};
pub use oracle::{ContractOracle, MembershipOracle};
pub use tree::{MerkleTree, NodeHasher};
