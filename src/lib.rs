//! Client-side engine for a privacy-preserving UTXO pool: key derivation,
//! note lifecycle, an epoch-segmented sparse Merkle forest, Poseidon
//! hashing over BN254, witness assembly for the withdraw/transfer/renew
//! circuits, and an encrypted persistent note store.

pub mod client;
pub mod config;
pub mod error;
pub mod field;
pub mod keys;
pub mod logger;
pub mod merkle;
pub mod note;
pub mod poseidon;
pub mod scanner;
pub mod store;
pub mod witness;

pub use client::{Client, ClientError, ClientResult, DepositPayload, RequestSubmitter, TransactionSource};
pub use config::EngineConfig;
pub use error::EngineError;
pub use keys::{KeyError, KeyResult, KeySet};
pub use logger::{default_logger, Logger};
pub use merkle::{ChainReader, EpochForest, EpochState, EpochTree, MerkleProof};
pub use note::{Note, NoteManager};
pub use scanner::Scanner;
pub use store::{EncryptedFileStore, InMemoryStore, NoteStore, NoteStoreSnapshot};
pub use witness::{CircuitKind, Prover, RequestBuilder};
