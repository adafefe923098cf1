pub mod forest;
pub mod tree;

pub use forest::{ChainReader, EpochForest, EpochHeader, LeafChunk, CHUNK_SIZE};
pub use tree::{EpochState, EpochTree, ForestError, ForestResult, MerkleProof, TREE_CAPACITY, TREE_DEPTH};
