//! `WitnessBuilder` / `RequestBuilder` (`spec.md` §4.G): signal tables for
//! the three circuits, the `Prover` capability boundary, and on-chain
//! request assembly.
//!
//! Grounded on the teacher's pattern of feature-gated mock implementations
//! (`relayer/tree_service.rs`'s `verify_proof`) for `MockProver`, kept
//! explicit and opt-in (`MOCK_PROOFS=1`) rather than silently always-on.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::MerkleOrder;
use crate::field::reduce_be;
use crate::merkle::{MerkleProof, TREE_DEPTH};
use crate::note::Note;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WitnessError {
    #[error("a note used as witness input lacks epoch/leaf_index")]
    NoteMissingEpochOrIndex,
    #[error("circuit artifacts unavailable")]
    ArtifactsUnavailable,
    #[error("prover failed: {0}")]
    ProverFailed(String),
    #[error("an input note's epoch has already expired")]
    ExpiredEpoch,
    #[error("an input nullifier marker already exists on-chain")]
    DoubleSpend,
}

pub type WitnessResult<T> = Result<T, WitnessError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitKind {
    Withdraw,
    Transfer,
    Renew,
}

/// `merkle_indices[i] = (leaf_index >> i) & 1`, flipped under the
/// "left-is-one" convention; reversed (with the sibling path) under
/// top-down orientation.
pub fn merkle_indices(leaf_index: u32, left_is_one: bool) -> [u8; TREE_DEPTH] {
    let mut bits = [0u8; TREE_DEPTH];
    for (i, bit) in bits.iter_mut().enumerate() {
        let raw = ((leaf_index >> i) & 1) as u8;
        *bit = if left_is_one { 1 - raw } else { raw };
    }
    bits
}

fn orient(siblings: [[u8; 32]; TREE_DEPTH], indices: [u8; TREE_DEPTH], order: MerkleOrder) -> (Vec<[u8; 32]>, Vec<u8>) {
    match order {
        MerkleOrder::BottomUp => (siblings.to_vec(), indices.to_vec()),
        MerkleOrder::TopDown => {
            let mut s = siblings.to_vec();
            let mut i = indices.to_vec();
            s.reverse();
            i.reverse();
            (s, i)
        }
    }
}

pub fn pool_id_field(pool_id: &[u8; 32]) -> [u8; 32] {
    reduce_be(pool_id)
}

/// Public signals in exact order: `merkle_root, nullifier, amount, epoch,
/// tx_anchor, pool_id, chain_id` (`spec.md` §4.G.1).
#[derive(Debug, Clone)]
pub struct WithdrawSignals {
    pub path_elements: Vec<[u8; 32]>,
    pub path_indices: Vec<u8>,
    pub public_inputs: [[u8; 32]; 7],
}

pub fn build_withdraw_signals(
    note: &Note,
    nullifier_key: &[u8; 32],
    proof: &MerkleProof,
    pool_id: [u8; 32],
    chain_id: [u8; 32],
    tx_anchor: [u8; 32],
    order: MerkleOrder,
    left_is_one: bool,
) -> WitnessResult<WithdrawSignals> {
    let (epoch, leaf_index) = note
        .epoch
        .zip(note.leaf_index)
        .ok_or(WitnessError::NoteMissingEpochOrIndex)?;

    let nullifier = note
        .recompute_nullifier(nullifier_key)
        .ok_or(WitnessError::NoteMissingEpochOrIndex)?;

    let indices = merkle_indices(leaf_index, left_is_one);
    let (path_elements, path_indices) = orient(proof.siblings, indices, order);

    let public_inputs = [
        proof.root,
        nullifier,
        crate::field::u64_as_le_field_bytes(note.value),
        crate::field::u64_as_le_field_bytes(epoch),
        tx_anchor,
        pool_id_field(&pool_id),
        chain_id,
    ];

    Ok(WithdrawSignals {
        path_elements,
        path_indices,
        public_inputs,
    })
}

/// A canonical dummy note used to fill an unused transfer input/output slot:
/// `value=0`, all-zero owner/randomness, known zero commitment.
pub fn dummy_note() -> Note {
    Note::new(0, [0u8; 32], [0u8; 32], [0u8; 32], None)
}

/// Public signals in exact order: `merkle_root, nullifier_1, nullifier_2,
/// output_commitment_1, output_commitment_2, tx_anchor, pool_id, chain_id`
/// (`spec.md` §4.G.2).
#[derive(Debug, Clone)]
pub struct TransferSignals {
    pub public_inputs: [[u8; 32]; 8],
}

pub fn build_transfer_signals(
    inputs: [&Note; 2],
    nullifier_key: &[u8; 32],
    input_proofs: [Option<&MerkleProof>; 2],
    outputs: [&Note; 2],
    pool_id: [u8; 32],
    chain_id: [u8; 32],
    tx_anchor: [u8; 32],
) -> WitnessResult<TransferSignals> {
    let value_in: u64 = inputs.iter().map(|n| n.value).sum();
    let value_out: u64 = outputs.iter().map(|n| n.value).sum();
    debug_assert_eq!(value_in, value_out, "transfer must preserve value");

    let nullifiers: Vec<[u8; 32]> = inputs
        .iter()
        .map(|n| {
            if n.value == 0 {
                Ok([0u8; 32])
            } else {
                n.recompute_nullifier(nullifier_key)
                    .ok_or(WitnessError::NoteMissingEpochOrIndex)
            }
        })
        .collect::<WitnessResult<_>>()?;

    let root = input_proofs
        .iter()
        .flatten()
        .next()
        .map(|p| p.root)
        .unwrap_or([0u8; 32]);

    let public_inputs = [
        root,
        nullifiers[0],
        nullifiers[1],
        outputs[0].commitment,
        outputs[1].commitment,
        tx_anchor,
        pool_id_field(&pool_id),
        chain_id,
    ];

    Ok(TransferSignals { public_inputs })
}

/// Public signals in exact order: `old_root, nullifier, new_commitment,
/// old_epoch, new_epoch, tx_anchor, pool_id, chain_id` (`spec.md` §4.G.3).
#[derive(Debug, Clone)]
pub struct RenewSignals {
    pub public_inputs: [[u8; 32]; 8],
}

pub fn build_renew_signals(
    old_note: &Note,
    new_note: &Note,
    nullifier_key: &[u8; 32],
    old_proof: &MerkleProof,
    pool_id: [u8; 32],
    chain_id: [u8; 32],
    tx_anchor: [u8; 32],
) -> WitnessResult<RenewSignals> {
    let old_epoch = old_note.epoch.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
    let new_epoch = new_note
        .epoch
        .unwrap_or(old_epoch.saturating_add(1));
    let nullifier = old_note
        .recompute_nullifier(nullifier_key)
        .ok_or(WitnessError::NoteMissingEpochOrIndex)?;

    let public_inputs = [
        old_proof.root,
        nullifier,
        new_note.commitment,
        crate::field::u64_as_le_field_bytes(old_epoch),
        crate::field::u64_as_le_field_bytes(new_epoch),
        tx_anchor,
        pool_id_field(&pool_id),
        chain_id,
    ];

    Ok(RenewSignals { public_inputs })
}

/// 256-byte proof layout is fixed: `pi_a(64) || pi_b(128) || pi_c(64)`.
pub const PROOF_LEN: usize = 256;

#[derive(Debug, Clone)]
pub struct ProofBundle {
    pub proof_bytes: [u8; PROOF_LEN],
    pub public_inputs: Vec<[u8; 32]>,
}

/// External Groth16-style prover capability (`spec.md` §4.G.4). Public
/// inputs MUST come directly from the implementation's output, never
/// recomputed locally, to guarantee byte-exact verifier compatibility.
pub trait Prover {
    fn prove(&self, circuit: CircuitKind, public_inputs: &[[u8; 32]]) -> WitnessResult<ProofBundle>;
}

/// `MOCK_PROOFS=1` implementation: zeroed proof bytes, canonical public
/// inputs passed through untouched. Tests only.
pub struct MockProver;

impl Prover for MockProver {
    fn prove(&self, _circuit: CircuitKind, public_inputs: &[[u8; 32]]) -> WitnessResult<ProofBundle> {
        Ok(ProofBundle {
            proof_bytes: [0u8; PROOF_LEN],
            public_inputs: public_inputs.to_vec(),
        })
    }
}

fn domain_hash(domain: &[u8], parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// Per-circuit trailing fields appended to `public_inputs` in the on-chain
/// request byte layout (`spec.md` §6): `amount, epoch, leaf_index` for
/// withdraw; analogous `(epoch, leaf_index)` tuples for transfer/renew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailingFields {
    Withdraw { amount: u64, epoch: u64, leaf_index: u32 },
    Transfer { input_epochs: [u64; 2], input_leaf_indices: [u32; 2] },
    Renew { old_epoch: u64, old_leaf_index: u32 },
}

impl TrailingFields {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TrailingFields::Withdraw { amount, epoch, leaf_index } => {
                out.extend_from_slice(&amount.to_le_bytes());
                out.extend_from_slice(&epoch.to_le_bytes());
                out.extend_from_slice(&leaf_index.to_le_bytes());
            }
            TrailingFields::Transfer { input_epochs, input_leaf_indices } => {
                for (epoch, leaf_index) in input_epochs.iter().zip(input_leaf_indices.iter()) {
                    out.extend_from_slice(&epoch.to_le_bytes());
                    out.extend_from_slice(&leaf_index.to_le_bytes());
                }
            }
            TrailingFields::Renew { old_epoch, old_leaf_index } => {
                out.extend_from_slice(&old_epoch.to_le_bytes());
                out.extend_from_slice(&old_leaf_index.to_le_bytes());
            }
        }
        out
    }
}

/// The narrow on-chain read `RequestBuilder` needs to fail a request early
/// rather than submit a doomed proof (`spec.md` §4.G.4).
pub trait NullifierMarketProbe {
    fn nullifier_marker_exists(&self, pool_id: &[u8; 32], epoch: u64, nullifier: &[u8; 32]) -> bool;
}

/// Assembles the on-chain-bound request payload: epoch tree address per
/// involved epoch, a nullifier marker address per input nullifier, a
/// leaf-chunk address per output, and (for renew) both epoch handles.
pub struct RequestBuilder;

#[derive(Debug, Clone)]
pub struct Request {
    pub proof_bytes: [u8; PROOF_LEN],
    pub public_inputs: Vec<[u8; 32]>,
    pub epoch_tree_addresses: Vec<[u8; 32]>,
    pub nullifier_marker_addresses: Vec<[u8; 32]>,
    pub leaf_chunk_addresses: Vec<[u8; 32]>,
    pub trailing: TrailingFields,
}

impl RequestBuilder {
    pub fn epoch_tree_address(pool_id: &[u8; 32], epoch: u64) -> [u8; 32] {
        domain_hash(b"epoch_tree", &[pool_id, &epoch.to_le_bytes()])
    }

    pub fn nullifier_marker_address(pool_id: &[u8; 32], epoch: u64, nullifier: &[u8; 32]) -> [u8; 32] {
        domain_hash(b"nullifier_marker", &[pool_id, &epoch.to_le_bytes(), nullifier])
    }

    pub fn leaf_chunk_address(pool_id: &[u8; 32], output_epoch: u64, next_leaf_index: u32) -> [u8; 32] {
        let chunk = next_leaf_index / crate::merkle::CHUNK_SIZE;
        domain_hash(b"leaf_chunk", &[pool_id, &output_epoch.to_le_bytes(), &chunk.to_le_bytes()])
    }

    /// Fails early (`spec.md` §4.G.4) if any input note lacks
    /// `epoch`/`leaf_index`, any input note's epoch has already expired, or
    /// any input nullifier marker already exists on-chain — before
    /// assembling addresses for a request that can never land.
    #[allow(clippy::too_many_arguments)]
    pub fn build(
        chain: &dyn NullifierMarketProbe,
        input_notes: &[&Note],
        bundle: ProofBundle,
        pool_id: &[u8; 32],
        epochs: &[u64],
        input_nullifiers: &[(u64, [u8; 32])],
        output_next_indices: &[(u64, u32)],
        trailing: TrailingFields,
    ) -> WitnessResult<Request> {
        for note in input_notes {
            if note.epoch.is_none() || note.leaf_index.is_none() {
                return Err(WitnessError::NoteMissingEpochOrIndex);
            }
            if note.expired {
                return Err(WitnessError::ExpiredEpoch);
            }
        }
        for (epoch, nullifier) in input_nullifiers {
            if chain.nullifier_marker_exists(pool_id, *epoch, nullifier) {
                return Err(WitnessError::DoubleSpend);
            }
        }

        Ok(Request {
            proof_bytes: bundle.proof_bytes,
            public_inputs: bundle.public_inputs,
            epoch_tree_addresses: epochs.iter().map(|e| Self::epoch_tree_address(pool_id, *e)).collect(),
            nullifier_marker_addresses: input_nullifiers
                .iter()
                .map(|(epoch, n)| Self::nullifier_marker_address(pool_id, *epoch, n))
                .collect(),
            leaf_chunk_addresses: output_next_indices
                .iter()
                .map(|(epoch, idx)| Self::leaf_chunk_address(pool_id, *epoch, *idx))
                .collect(),
            trailing,
        })
    }
}
