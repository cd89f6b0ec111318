//! Group snapshots and the reconstructor that builds them from a feed.

use tracing::{debug, info, warn};
use zkgm_common::{fr_to_decimal, Fr, MembershipRecord, MerkleProof};

use crate::{
    error::{GroupError, Result},
    feed::MembershipFeed,
    oracle::MembershipOracle,
    tree::MerkleTree,
};

/// Read-only view of a group at one point in time.
///
/// A snapshot is rebuilt from the feed for every operation and never mutated,
/// so a membership change between two operations can never leave a stale tree
/// behind.
#[derive(Clone, Debug)]
pub struct Group {
    group_id: u64,
    records: Vec<MembershipRecord>,
    tree: MerkleTree,
}

impl Group {
    /// Sort records by index, check they are dense and build the tree.
    pub fn from_records(group_id: u64, mut records: Vec<MembershipRecord>) -> Result<Self> {
        records.sort_by_key(|record| record.index);

        for (position, record) in records.iter().enumerate() {
            let expected = position as u64;
            if record.index < expected {
                return Err(GroupError::DuplicateIndex(record.index));
            }
            if record.index > expected {
                return Err(GroupError::IndexGap {
                    expected,
                    found: record.index,
                });
            }
        }

        let leaves = records.iter().map(|record| record.commitment).collect();
        let tree = MerkleTree::from_leaves(leaves)?;

        Ok(Self {
            group_id,
            records,
            tree,
        })
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    pub fn records(&self) -> &[MembershipRecord] {
        &self.records
    }

    pub fn tree(&self) -> &MerkleTree {
        &self.tree
    }

    pub fn root(&self) -> Fr {
        self.tree.root()
    }

    /// Number of leaves, removed members included.
    pub fn size(&self) -> u64 {
        self.tree.size()
    }

    pub fn depth(&self) -> usize {
        self.tree.depth()
    }

    /// Members whose commitment has not been zeroed out.
    pub fn active_member_count(&self) -> usize {
        self.records.iter().filter(|r| !r.is_removed()).count()
    }

    /// Index of the unique live member holding `commitment`.
    ///
    /// Zero marks a removed slot and is never searchable.
    pub fn index_of(&self, commitment: &Fr) -> Result<u64> {
        if zkgm_common::field::is_zero(commitment) {
            return Err(GroupError::MemberNotFound);
        }
        let mut matches = self
            .records
            .iter()
            .filter(|record| &record.commitment == commitment);
        let first = matches.next().ok_or(GroupError::MemberNotFound)?;
        let extra = matches.count();
        if extra > 0 {
            return Err(GroupError::DuplicateMember(extra + 1));
        }
        Ok(first.index)
    }

    pub fn merkle_proof(&self, commitment: &Fr) -> Result<MerkleProof> {
        let index = self.index_of(commitment)?;
        self.tree.generate_proof(index)
    }

    /// Check the snapshot against the authoritative on-chain tree.
    pub async fn verify_against<O>(&self, oracle: &O) -> Result<()>
    where
        O: MembershipOracle + ?Sized,
    {
        let onchain_root = oracle.merkle_root(self.group_id).await?;
        if onchain_root != self.root() {
            warn!(
                group_id = self.group_id,
                "reconstructed root {} does not match on-chain root {}",
                fr_to_decimal(&self.root()),
                fr_to_decimal(&onchain_root)
            );
            return Err(GroupError::RootMismatch {
                local: fr_to_decimal(&self.root()),
                onchain: fr_to_decimal(&onchain_root),
            });
        }

        let onchain_size = oracle.merkle_size(self.group_id).await?;
        if onchain_size != self.size() {
            return Err(GroupError::SizeMismatch {
                local: self.size(),
                onchain: onchain_size,
            });
        }

        debug!(group_id = self.group_id, "merkle root matches on-chain tree");
        Ok(())
    }
}

/// Rebuilds groups from a membership feed.
pub struct GroupReconstructor<F> {
    feed: F,
}

impl<F: MembershipFeed> GroupReconstructor<F> {
    pub fn new(feed: F) -> Self {
        Self { feed }
    }

    pub fn feed(&self) -> &F {
        &self.feed
    }

    pub async fn build(&self, group_id: u64) -> Result<Group> {
        let records = self.feed.fetch_members(group_id).await?;
        let group = Group::from_records(group_id, records)?;
        info!(
            group_id,
            size = group.size(),
            active = group.active_member_count(),
            depth = group.depth(),
            "reconstructed group"
        );
        Ok(group)
    }

    /// Build and require the result to match the on-chain root and size.
    pub async fn build_verified<O>(&self, group_id: u64, oracle: &O) -> Result<Group>
    where
        O: MembershipOracle + ?Sized,
    {
        let group = self.build(group_id).await?;
        group.verify_against(oracle).await?;
        Ok(group)
    }

    pub async fn prove_membership(&self, group_id: u64, commitment: &Fr) -> Result<MerkleProof> {
        let group = self.build(group_id).await?;
        group.merkle_proof(commitment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn record(index: u64, commitment: u64) -> MembershipRecord {
        MembershipRecord::new(index, Fr::from(commitment))
    }

    struct StaticFeed(Vec<MembershipRecord>);

    #[async_trait]
    impl MembershipFeed for StaticFeed {
        async fn fetch_members(&self, _group_id: u64) -> Result<Vec<MembershipRecord>> {
            Ok(self.0.clone())
        }
    }

    struct FixedOracle {
        root: Fr,
        size: u64,
    }

    #[async_trait]
    impl MembershipOracle for FixedOracle {
        async fn merkle_root(&self, _group_id: u64) -> Result<Fr> {
            Ok(self.root)
        }

        async fn merkle_size(&self, _group_id: u64) -> Result<u64> {
            Ok(self.size)
        }
    }

    #[test]
    fn removed_member_keeps_its_slot() {
        let group =
            Group::from_records(1, vec![record(0, 5), record(1, 0), record(2, 9)]).unwrap();
        assert_eq!(group.size(), 3);
        assert_eq!(group.active_member_count(), 2);

        let proof = group.merkle_proof(&Fr::from(9u64)).unwrap();
        assert_eq!(proof.leaf, Fr::from(9u64));
        assert_eq!(group.index_of(&Fr::from(9u64)).unwrap(), 2);
        assert!(MerkleTree::verify_proof(&proof).unwrap());

        assert!(matches!(
            group.index_of(&Fr::from(0u64)),
            Err(GroupError::MemberNotFound)
        ));
    }

    #[test]
    fn zero_is_never_found_even_with_many_removed() {
        let group = Group::from_records(
            1,
            vec![record(0, 0), record(1, 0), record(2, 0), record(3, 4)],
        )
        .unwrap();
        assert!(matches!(
            group.merkle_proof(&Fr::from(0u64)),
            Err(GroupError::MemberNotFound)
        ));
    }

    #[test]
    fn unsorted_feed_is_sorted_by_index() {
        let sorted = Group::from_records(1, vec![record(0, 5), record(1, 6), record(2, 7)]).unwrap();
        let shuffled =
            Group::from_records(1, vec![record(2, 7), record(0, 5), record(1, 6)]).unwrap();
        assert_eq!(sorted.root(), shuffled.root());
        assert_eq!(shuffled.records()[0].index, 0);
    }

    #[test]
    fn gaps_and_duplicates_are_rejected() {
        assert!(matches!(
            Group::from_records(1, vec![record(0, 5), record(2, 6)]),
            Err(GroupError::IndexGap {
                expected: 1,
                found: 2
            })
        ));
        assert!(matches!(
            Group::from_records(1, vec![record(0, 5), record(0, 6)]),
            Err(GroupError::DuplicateIndex(0))
        ));
        assert!(matches!(
            Group::from_records(1, vec![record(1, 5)]),
            Err(GroupError::IndexGap {
                expected: 0,
                found: 1
            })
        ));
    }

    #[test]
    fn duplicate_live_commitment_is_ambiguous() {
        let group = Group::from_records(1, vec![record(0, 5), record(1, 5)]).unwrap();
        assert!(matches!(
            group.index_of(&Fr::from(5u64)),
            Err(GroupError::DuplicateMember(2))
        ));
    }

    #[tokio::test]
    async fn reconstructor_proves_membership() {
        let reconstructor =
            GroupReconstructor::new(StaticFeed(vec![record(1, 0), record(2, 9), record(0, 5)]));
        let proof = reconstructor
            .prove_membership(1, &Fr::from(9u64))
            .await
            .unwrap();
        assert!(MerkleTree::verify_proof(&proof).unwrap());
        assert!(matches!(
            reconstructor.prove_membership(1, &Fr::from(10u64)).await,
            Err(GroupError::MemberNotFound)
        ));
    }

    #[tokio::test]
    async fn build_verified_checks_root_and_size() {
        let records = vec![record(0, 1), record(1, 2)];
        let reconstructor = GroupReconstructor::new(StaticFeed(records));
        let good_root = reconstructor.build(1).await.unwrap().root();

        let ok = FixedOracle {
            root: good_root,
            size: 2,
        };
        assert!(reconstructor.build_verified(1, &ok).await.is_ok());

        let wrong_root = FixedOracle {
            root: Fr::from(3u64),
            size: 2,
        };
        assert!(matches!(
            reconstructor.build_verified(1, &wrong_root).await,
            Err(GroupError::RootMismatch { .. })
        ));

        let wrong_size = FixedOracle {
            root: good_root,
            size: 3,
        };
        assert!(matches!(
            reconstructor.build_verified(1, &wrong_size).await,
            Err(GroupError::SizeMismatch {
                local: 2,
                onchain: 3
            })
        ));
    }
}
