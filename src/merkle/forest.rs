//! `EpochForest` (`spec.md` §4.D): a mapping from epoch to `EpochTree`, plus
//! the active epoch, reconstructed from on-chain chunked leaf storage
//! through an injected `ChainReader` capability.

use std::collections::HashMap;

use super::tree::{EpochState, EpochTree, ForestError, ForestResult};

pub const CHUNK_SIZE: u32 = 256;
const PREVIOUS_EPOCHS_TO_SYNC: u64 = 5;

/// Epoch metadata as read from the chain — separate from the leaves
/// themselves, which arrive in `LeafChunk`s.
#[derive(Debug, Clone)]
pub struct EpochHeader {
    pub state: EpochState,
    pub final_root: Option<[u8; 32]>,
    pub leaf_count: u32,
}

#[derive(Debug, Clone)]
pub struct LeafChunk {
    pub leaves: Vec<[u8; 32]>,
}

/// The narrow interface the forest needs from chain state — deliberately
/// small so callers can back it with RPC, a local cache, or a test double
/// (`spec.md` §9: "a trait/interface" in place of dynamically-typed RPC
/// program handles).
pub trait ChainReader {
    fn epoch_header(&self, epoch: u64) -> Option<EpochHeader>;
    fn leaf_chunk(&self, epoch: u64, chunk_index: u32) -> Option<LeafChunk>;
    fn active_epoch(&self) -> u64;
}

pub struct EpochForest {
    trees: HashMap<u64, EpochTree>,
    active_epoch: u64,
}

impl EpochForest {
    pub fn new() -> Self {
        Self {
            trees: HashMap::new(),
            active_epoch: 0,
        }
    }

    pub fn active_epoch(&self) -> u64 {
        self.active_epoch
    }

    pub fn get_or_create(&mut self, epoch: u64) -> &mut EpochTree {
        self.trees.entry(epoch).or_insert_with(|| EpochTree::new(epoch))
    }

    pub fn get(&self, epoch: u64) -> Option<&EpochTree> {
        self.trees.get(&epoch)
    }

    /// For the active epoch and each of the last `PREVIOUS_EPOCHS_TO_SYNC`
    /// previous epochs, fetch persisted chunked leaves and `insert_many` in
    /// contiguous order. Epoch state/`final_root` come from the header.
    pub fn sync(&mut self, reader: &dyn ChainReader) -> ForestResult<()> {
        self.active_epoch = reader.active_epoch();
        let oldest = self.active_epoch.saturating_sub(PREVIOUS_EPOCHS_TO_SYNC);
        for epoch in oldest..=self.active_epoch {
            self.sync_epoch_with(epoch, reader)?;
        }
        Ok(())
    }

    pub fn sync_epoch(&mut self, epoch: u64, reader: &dyn ChainReader) -> ForestResult<()> {
        self.sync_epoch_with(epoch, reader)
    }

    fn sync_epoch_with(&mut self, epoch: u64, reader: &dyn ChainReader) -> ForestResult<()> {
        let Some(header) = reader.epoch_header(epoch) else {
            // Absent epoch yields an empty tree.
            self.get_or_create(epoch);
            return Ok(());
        };

        let mut leaves = Vec::with_capacity(header.leaf_count as usize);
        let mut chunk_index = 0u32;
        while leaves.len() < header.leaf_count as usize {
            let Some(chunk) = reader.leaf_chunk(epoch, chunk_index) else {
                break;
            };
            leaves.extend(chunk.leaves);
            chunk_index += 1;
        }
        // The header's declared `leaf_count` exceeded what chunk storage
        // actually yielded: a truncated chunk, treated as corruption.
        if leaves.len() < header.leaf_count as usize {
            return Err(ForestError::Corrupt);
        }
        leaves.truncate(header.leaf_count as usize);

        let tree = self.trees.entry(epoch).or_insert_with(|| EpochTree::new(epoch));
        tree.state = EpochState::Active;
        tree.leaves.clear();
        tree.next_index = 0;
        tree.root_history.clear();
        tree.insert_many(&leaves)?;
        tree.state = header.state;
        tree.final_root = header.final_root;
        Ok(())
    }

    pub fn find_commitment(&self, commitment: &[u8; 32]) -> Option<(u64, u32)> {
        for (epoch, tree) in &self.trees {
            if let Some(index) = tree.find_leaf(commitment) {
                return Some((*epoch, index));
            }
        }
        None
    }
}

impl Default for EpochForest {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    struct FakeReader {
        headers: Map<u64, EpochHeader>,
        chunks: Map<(u64, u32), LeafChunk>,
        active: u64,
    }

    impl ChainReader for FakeReader {
        fn epoch_header(&self, epoch: u64) -> Option<EpochHeader> {
            self.headers.get(&epoch).cloned()
        }
        fn leaf_chunk(&self, epoch: u64, chunk_index: u32) -> Option<LeafChunk> {
            self.chunks.get(&(epoch, chunk_index)).cloned()
        }
        fn active_epoch(&self) -> u64 {
            self.active
        }
    }

    #[test]
    fn sync_reconstructs_tree_from_chunks() {
        let mut headers = Map::new();
        headers.insert(
            3,
            EpochHeader {
                state: EpochState::Active,
                final_root: None,
                leaf_count: 3,
            },
        );
        let mut chunks = Map::new();
        chunks.insert((3, 0), LeafChunk { leaves: vec![[1u8; 32], [2u8; 32], [3u8; 32]] });
        let reader = FakeReader { headers, chunks, active: 3 };

        let mut forest = EpochForest::new();
        forest.sync(&reader).unwrap();

        let tree = forest.get(3).unwrap();
        assert_eq!(tree.next_index, 3);
        assert_eq!(tree.find_leaf(&[2u8; 32]), Some(1));
    }

    #[test]
    fn sync_absent_epoch_yields_empty_tree() {
        let reader = FakeReader { headers: Map::new(), chunks: Map::new(), active: 0 };
        let mut forest = EpochForest::new();
        forest.sync_epoch(9, &reader).unwrap();
        assert_eq!(forest.get(9).unwrap().next_index, 0);
    }

    #[test]
    fn truncated_chunk_is_corruption() {
        let mut headers = Map::new();
        headers.insert(
            1,
            EpochHeader {
                state: EpochState::Active,
                final_root: None,
                leaf_count: 5,
            },
        );
        let mut chunks = Map::new();
        chunks.insert((1, 0), LeafChunk { leaves: vec![[1u8; 32], [2u8; 32]] });
        let reader = FakeReader { headers, chunks, active: 1 };

        let mut forest = EpochForest::new();
        assert_eq!(
            forest.sync_epoch(1, &reader).unwrap_err(),
            ForestError::Corrupt
        );
    }
}
