//! Positional binary Merkle tree over a batch of mining events.
//!
//! Level 0 holds the leaf digests in input order. Each next level pairs
//! nodes `(2i, 2i+1)`; an odd trailing node is hashed with itself rather than
//! promoted. The verifier mirrors that rule, so proofs are only valid for the
//! exact leaf order and leaf count they were cut from.

use crate::crypto;
use crate::{HexDigest, InclusionProof, LedgerError, MiningEvent, Result};

#[derive(Clone, Debug)]
pub struct MerkleTree {
    levels: Vec<Vec<HexDigest>>,
}

impl MerkleTree {
    /// Hash every event into a leaf and build all levels.
    pub fn from_events(events: &[MiningEvent]) -> Result<Self> {
        Self::from_leaves(events.iter().map(crypto::hash_event).collect())
    }

    pub fn from_leaves(leaves: Vec<HexDigest>) -> Result<Self> {
        if leaves.is_empty() {
            return Err(LedgerError::EmptyBatch);
        }

        let mut levels = vec![leaves];
        while let Some(current) = levels.last().filter(|level| level.len() > 1) {
            let next = current
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => crypto::hash_pair(left, right),
                    [single] => crypto::hash_pair(single, single),
                    _ => unreachable!("chunks(2) yields one or two nodes"),
                })
                .collect();
            levels.push(next);
        }

        Ok(Self { levels })
    }

    pub fn root(&self) -> &str {
        // from_leaves guarantees a non-empty top level
        &self.levels[self.levels.len() - 1][0]
    }

    pub fn leaves(&self) -> &[HexDigest] {
        &self.levels[0]
    }

    pub fn levels(&self) -> &[Vec<HexDigest>] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels[0].is_empty()
    }

    /// Number of proof entries for any leaf
    pub fn height(&self) -> usize {
        self.levels.len() - 1
    }

    pub fn prove(&self, index: usize) -> Result<InclusionProof> {
        if index >= self.len() {
            return Err(LedgerError::IndexOutOfRange { index, len: self.len() });
        }
        Ok(InclusionProof {
            leaf_index: index,
            siblings: proof_path(&self.levels, index),
        })
    }
}

/// Sibling digests for `index`, walking every level below the root.
/// A node with no right-hand sibling contributes itself.
pub fn proof_path(levels: &[Vec<HexDigest>], index: usize) -> Vec<HexDigest> {
    let mut siblings = Vec::with_capacity(levels.len().saturating_sub(1));
    let mut index = index;

    for level in levels.iter().take(levels.len().saturating_sub(1)) {
        let sibling = if index % 2 == 0 { index + 1 } else { index - 1 };
        match level.get(sibling).or_else(|| level.get(index)) {
            Some(node) => siblings.push(node.clone()),
            None => break,
        }
        index /= 2;
    }

    siblings
}

/// Recompute the root from a leaf and its siblings. The index must be the
/// one the proof was generated for; parity at each level decides left/right.
pub fn verify_proof(leaf: &str, siblings: &[HexDigest], index: usize, root: &str) -> bool {
    let mut current = leaf.to_owned();
    let mut index = index;

    for sibling in siblings {
        current = if index % 2 == 0 {
            crypto::hash_pair(&current, sibling)
        } else {
            crypto::hash_pair(sibling, &current)
        };
        index /= 2;
    }

    current == root
}

/// Verify an event against a root using a stored proof.
pub fn verify_event(event: &MiningEvent, proof: &InclusionProof, root: &str) -> bool {
    verify_proof(&crypto::hash_event(event), &proof.siblings, proof.leaf_index, root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_event, hash_pair, sha256_hex};

    fn leaves(n: usize) -> Vec<HexDigest> {
        (0..n).map(|i| sha256_hex(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn empty_batch_is_rejected() {
        assert!(matches!(MerkleTree::from_leaves(vec![]), Err(LedgerError::EmptyBatch)));
        assert!(matches!(MerkleTree::from_events(&[]), Err(LedgerError::EmptyBatch)));
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        assert_eq!(tree.root(), l[0]);
        assert_eq!(tree.height(), 0);

        let proof = tree.prove(0).unwrap();
        assert!(proof.siblings.is_empty());
        assert!(verify_proof(&l[0], &proof.siblings, 0, tree.root()));
    }

    #[test]
    fn odd_node_is_paired_with_itself() {
        let l = leaves(3);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();

        assert_eq!(tree.levels()[0].len(), 3);
        assert_eq!(tree.levels()[1].len(), 2);
        assert_eq!(tree.levels()[1][0], hash_pair(&l[0], &l[1]));
        assert_eq!(tree.levels()[1][1], hash_pair(&l[2], &l[2]));
        assert_ne!(tree.levels()[1][1], l[2]);

        let expected_root = hash_pair(&tree.levels()[1][0], &tree.levels()[1][1]);
        assert_eq!(tree.root(), expected_root);

        // the lone leaf's own digest stands in as its sibling
        let proof = tree.prove(2).unwrap();
        assert_eq!(proof.siblings[0], l[2]);
    }

    #[test]
    fn every_level_halves_rounding_up() {
        for n in 1..40usize {
            let tree = MerkleTree::from_leaves(leaves(n)).unwrap();
            for w in tree.levels().windows(2) {
                assert_eq!(w[1].len(), w[0].len().div_ceil(2));
            }
            assert_eq!(tree.levels().last().unwrap().len(), 1);
        }
    }

    #[test]
    fn all_indices_round_trip() {
        for n in 1..=17usize {
            let l = leaves(n);
            let tree = MerkleTree::from_leaves(l.clone()).unwrap();
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.prove(i).unwrap();
                assert_eq!(proof.siblings.len(), tree.height());
                assert!(verify_proof(leaf, &proof.siblings, i, tree.root()), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn wrong_index_does_not_verify() {
        let l = leaves(4);
        let tree = MerkleTree::from_leaves(l.clone()).unwrap();
        let proof = tree.prove(1).unwrap();
        assert!(!verify_proof(&l[1], &proof.siblings, 0, tree.root()));
        assert!(!verify_proof(&l[1], &proof.siblings, 3, tree.root()));
        assert!(!verify_proof(&l[1], &proof.siblings, usize::MAX, tree.root()));
    }

    #[test]
    fn out_of_range_index_errors() {
        let tree = MerkleTree::from_leaves(leaves(2)).unwrap();
        assert!(matches!(
            tree.prove(2),
            Err(LedgerError::IndexOutOfRange { index: 2, len: 2 })
        ));
        assert!(proof_path(tree.levels(), 9).is_empty());
    }

    #[test]
    fn two_event_scenario() {
        let events = vec![
            MiningEvent {
                id: "1".into(),
                wallet_address: "A".into(),
                challenge_id: "c1".into(),
                solution_hash: "h1".into(),
                points_awarded: 100,
                difficulty: 4,
                timestamp: 1000,
            },
            MiningEvent {
                id: "2".into(),
                wallet_address: "B".into(),
                challenge_id: "c2".into(),
                solution_hash: "h2".into(),
                points_awarded: 50,
                difficulty: 4,
                timestamp: 2000,
            },
        ];
        let tree = MerkleTree::from_events(&events).unwrap();
        let l0 = hash_event(&events[0]);
        let l1 = hash_event(&events[1]);

        assert_eq!(tree.leaves(), &[l0.clone(), l1.clone()]);
        assert_eq!(tree.root(), sha256_hex(format!("{l0}{l1}").as_bytes()));
        assert!(verify_event(&events[1], &tree.prove(1).unwrap(), tree.root()));
    }
}
