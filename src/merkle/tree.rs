//! Per-epoch sparse Merkle tree of depth 12 (`spec.md` §3/§4.D).
//!
//! Grounded on the teacher's `merkle/canonical_smt.rs` for the *shape* of
//! per-level zero-subtree substitution (a precomputed table indexed by
//! level) — not its RocksDB persistence, which this engine has no
//! equivalent of: the tree holds its leaves in memory and is rebuilt from
//! chunk snapshots fetched through `EpochForest::sync`.

use std::collections::BTreeMap;

use crate::poseidon::{hash_nodes, ZERO_HASHES};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const TREE_DEPTH: usize = 12;
pub const TREE_CAPACITY: u32 = 1 << TREE_DEPTH;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ForestError {
    #[error("epoch tree is at capacity")]
    EpochFull,
    #[error("epoch is not active")]
    EpochNotActive,
    #[error("unknown epoch")]
    UnknownEpoch,
    #[error("chunk snapshot is corrupt (reported count exceeds stored leaves)")]
    Corrupt,
}

pub type ForestResult<T> = Result<T, ForestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EpochState {
    Active,
    Frozen,
    Finalized,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf: [u8; 32],
    pub leaf_index: u32,
    pub epoch: u64,
    pub siblings: [[u8; 32]; TREE_DEPTH],
    pub root: [u8; 32],
}

#[derive(Debug, Clone)]
pub struct EpochTree {
    pub epoch: u64,
    pub state: EpochState,
    pub next_index: u32,
    pub leaves: BTreeMap<u32, [u8; 32]>,
    pub root_history: Vec<[u8; 32]>,
    pub final_root: Option<[u8; 32]>,
}

impl EpochTree {
    pub fn new(epoch: u64) -> Self {
        Self {
            epoch,
            state: EpochState::Active,
            next_index: 0,
            leaves: BTreeMap::new(),
            root_history: Vec::new(),
            final_root: None,
        }
    }

    fn child_at(&self, level: usize, index: u32) -> [u8; 32] {
        if level == 0 {
            return self.leaves.get(&index).copied().unwrap_or(ZERO_HASHES[0]);
        }
        self.level_value(level, index)
    }

    /// Bottom-up combine for a node at `level` (0 = leaves), `index` within
    /// that level. Missing right neighbor uses the precomputed zero-hash.
    fn level_value(&self, level: usize, index: u32) -> [u8; 32] {
        if level == 0 {
            return self.leaves.get(&index).copied().unwrap_or(ZERO_HASHES[0]);
        }
        let left = self.child_at(level - 1, index * 2);
        let right_index = index * 2 + 1;
        let right = if self.has_any_leaf_under(level - 1, right_index) {
            self.child_at(level - 1, right_index)
        } else {
            ZERO_HASHES[level - 1]
        };
        hash_nodes(&left, &right)
    }

    fn has_any_leaf_under(&self, level: usize, index: u32) -> bool {
        if self.leaves.is_empty() {
            return false;
        }
        let span = 1u32 << level;
        let start = index * span;
        let end = start + span;
        self.leaves.range(start..end.min(TREE_CAPACITY)).next().is_some()
    }

    pub fn compute_root(&self) -> [u8; 32] {
        if let Some(root) = self.final_root {
            return root;
        }
        self.level_value(TREE_DEPTH, 0)
    }

    pub fn insert(&mut self, leaf: [u8; 32]) -> ForestResult<(u32, [u8; 32])> {
        if self.state != EpochState::Active {
            return Err(ForestError::EpochNotActive);
        }
        if self.next_index >= TREE_CAPACITY {
            return Err(ForestError::EpochFull);
        }
        let index = self.next_index;
        self.leaves.insert(index, leaf);
        self.next_index += 1;
        let root = self.compute_root();
        self.root_history.push(root);
        Ok((index, root))
    }

    /// Batch variant: defers root recomputation to a single push at the end.
    pub fn insert_many(&mut self, leaves: &[[u8; 32]]) -> ForestResult<[u8; 32]> {
        if self.state != EpochState::Active && !leaves.is_empty() {
            return Err(ForestError::EpochNotActive);
        }
        for leaf in leaves {
            if self.next_index >= TREE_CAPACITY {
                return Err(ForestError::EpochFull);
            }
            self.leaves.insert(self.next_index, *leaf);
            self.next_index += 1;
        }
        let root = self.compute_root();
        self.root_history.push(root);
        Ok(root)
    }

    pub fn get_proof(&self, leaf_index: u32) -> MerkleProof {
        let mut siblings = [[0u8; 32]; TREE_DEPTH];
        let mut index = leaf_index;
        for (level, sibling) in siblings.iter_mut().enumerate() {
            let sibling_index = index ^ 1;
            *sibling = if self.has_any_leaf_under(level, sibling_index) || level == 0 {
                self.child_at(level, sibling_index)
            } else {
                ZERO_HASHES[level]
            };
            index /= 2;
        }
        MerkleProof {
            leaf: self.leaves.get(&leaf_index).copied().unwrap_or(ZERO_HASHES[0]),
            leaf_index,
            epoch: self.epoch,
            siblings,
            root: self.compute_root(),
        }
    }

    pub fn verify_proof(proof: &MerkleProof) -> bool {
        let mut current = proof.leaf;
        let mut index = proof.leaf_index;
        for sibling in &proof.siblings {
            current = if index & 1 == 0 {
                hash_nodes(&current, sibling)
            } else {
                hash_nodes(sibling, &current)
            };
            index /= 2;
        }
        current == proof.root
    }

    pub fn is_known_root(&self, root: &[u8; 32]) -> bool {
        self.final_root.as_ref() == Some(root) || self.root_history.contains(root)
    }

    pub fn find_leaf(&self, commitment: &[u8; 32]) -> Option<u32> {
        self.leaves
            .iter()
            .find(|(_, leaf)| *leaf == commitment)
            .map(|(index, _)| *index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_verify_round_trip() {
        let mut tree = EpochTree::new(1);
        for i in 0..7u8 {
            tree.insert([i; 32]).unwrap();
        }
        for i in 0..7u32 {
            let proof = tree.get_proof(i);
            assert!(EpochTree::verify_proof(&proof), "index {i}");
            assert_eq!(proof.root, tree.compute_root());
        }
    }

    #[test]
    fn insert_beyond_capacity_fails() {
        let mut tree = EpochTree::new(1);
        tree.next_index = TREE_CAPACITY;
        assert_eq!(tree.insert([1u8; 32]).unwrap_err(), ForestError::EpochFull);
    }

    #[test]
    fn insert_requires_active_state() {
        let mut tree = EpochTree::new(1);
        tree.state = EpochState::Frozen;
        assert_eq!(
            tree.insert([1u8; 32]).unwrap_err(),
            ForestError::EpochNotActive
        );
    }

    #[test]
    fn final_root_overrides_computed_root() {
        let mut tree = EpochTree::new(1);
        tree.insert([1u8; 32]).unwrap();
        tree.final_root = Some([0xEE; 32]);
        assert_eq!(tree.compute_root(), [0xEE; 32]);
    }

    #[test]
    fn is_known_root_checks_history_and_final() {
        let mut tree = EpochTree::new(1);
        let (_, root) = tree.insert([1u8; 32]).unwrap();
        assert!(tree.is_known_root(&root));
        assert!(!tree.is_known_root(&[0xAB; 32]));
    }

    #[test]
    fn insert_many_defers_root_push() {
        let mut tree = EpochTree::new(1);
        let leaves: Vec<[u8; 32]> = (0..5u8).map(|i| [i; 32]).collect();
        let root = tree.insert_many(&leaves).unwrap();
        assert_eq!(tree.root_history.len(), 1);
        assert_eq!(root, tree.compute_root());
    }
}
