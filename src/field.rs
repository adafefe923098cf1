//! BN254 scalar field helpers.
//!
//! All field elements the rest of the crate passes around are plain
//! `[u8; 32]` big-endian byte arrays; this module is the only place that
//! touches `ark_ff`/`ark_bn254` directly to reduce them modulo the scalar
//! prime `p`.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FieldError {
    #[error("value is not a valid field element")]
    NotInField,
}

pub type FieldResult<T> = Result<T, FieldError>;

/// Reduce a big-endian byte slice (at most 32 bytes) modulo `p` and return
/// the canonical 32-byte big-endian representative.
pub fn reduce_be(bytes: &[u8]) -> [u8; 32] {
    let fr = Fr::from_be_bytes_mod_order(bytes);
    to_be_bytes(&fr)
}

pub fn to_be_bytes(fr: &Fr) -> [u8; 32] {
    let mut out = [0u8; 32];
    let be = fr.into_bigint().to_bytes_be();
    // `to_bytes_be` is at most 32 bytes for BN254's Fr; left-pad with zeros.
    out[32 - be.len()..].copy_from_slice(&be);
    out
}

/// Parse exactly 32 big-endian bytes as a field element, rejecting values
/// that are not already canonically reduced (`>= p`).
pub fn from_canonical_be(bytes: &[u8; 32]) -> FieldResult<Fr> {
    let fr = Fr::from_be_bytes_mod_order(bytes);
    if &to_be_bytes(&fr) != bytes {
        return Err(FieldError::NotInField);
    }
    Ok(fr)
}

/// Encode a `u64` as the low 8 bytes of a little-endian 32-byte field input,
/// per `spec.md` §4.C's fixed encoding for `epoch`/`leaf_index` in the
/// nullifier.
pub fn u64_as_le_field_bytes(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..8].copy_from_slice(&value.to_le_bytes());
    out
}
