//! Top-level error aggregation.

use thiserror::Error;

use crate::field::FieldError;
use crate::keys::KeyError;
use crate::merkle::ForestError;
use crate::note::crypto::NoteCryptoError;
use crate::note::manager::NoteManagerError;
use crate::poseidon::PoseidonError;
use crate::scanner::ScannerError;
use crate::store::StoreError;
use crate::witness::WitnessError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Field(#[from] FieldError),
    #[error(transparent)]
    Poseidon(#[from] PoseidonError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    NoteCrypto(#[from] NoteCryptoError),
    #[error(transparent)]
    Forest(#[from] ForestError),
    #[error(transparent)]
    NoteManager(#[from] NoteManagerError),
    #[error(transparent)]
    Scanner(#[from] ScannerError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Witness(#[from] WitnessError),
}
