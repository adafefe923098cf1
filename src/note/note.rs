//! The `Note` struct (`spec.md` §3) — grounded on the teacher's
//! `utxo/note.rs` for its fixed-array serde idiom, re-fielded per spec.
//! Bigints serialize as decimal strings and byte arrays as hex (`spec.md`
//! §3), via `serde_with`'s `DisplayFromStr`/`hex::Hex` adapters.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};

use crate::poseidon::{hash_nodes, poseidon4};

pub type AssetId = [u8; 32];
pub type ShieldedAddress = [u8; 32];

pub const NULL_NULLIFIER: [u8; 32] = [0u8; 32];

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Note {
    #[serde_as(as = "DisplayFromStr")]
    pub value: u64,
    #[serde_as(as = "Hex")]
    pub token: AssetId,
    #[serde_as(as = "Hex")]
    pub owner: ShieldedAddress,
    #[serde_as(as = "Hex")]
    pub randomness: [u8; 32],
    #[serde_as(as = "Hex")]
    pub blinding: [u8; 32],
    pub memo: Option<String>,

    #[serde_as(as = "Hex")]
    pub commitment: [u8; 32],
    pub epoch: Option<u64>,
    pub leaf_index: Option<u32>,
    #[serde_as(as = "Hex")]
    pub nullifier: [u8; 32],

    pub spent: bool,
    pub expired: bool,
}

pub fn value_be32(value: u64) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[24..].copy_from_slice(&value.to_be_bytes());
    out
}

/// `Poseidon4(value_be32, owner, randomness)` — a single width-4 (3-input)
/// permutation binds all three fields directly (`spec.md` §4.C).
pub fn compute_commitment(value: u64, owner: &ShieldedAddress, randomness: &[u8; 32]) -> [u8; 32] {
    poseidon4(&value_be32(value), owner, randomness)
}

impl Note {
    /// Construct a brand-new note with a freshly chosen `randomness`,
    /// `blinding = randomness`, and the commitment derived per §3/§4.C.
    /// `epoch`/`leaf_index`/`nullifier` are unset until confirmation.
    pub fn new(
        value: u64,
        token: AssetId,
        owner: ShieldedAddress,
        randomness: [u8; 32],
        memo: Option<String>,
    ) -> Self {
        let commitment = compute_commitment(value, &owner, &randomness);
        Self {
            value,
            token,
            owner,
            randomness,
            blinding: randomness,
            memo,
            commitment,
            epoch: None,
            leaf_index: None,
            nullifier: NULL_NULLIFIER,
            spent: false,
            expired: false,
        }
    }

    pub fn recompute_commitment(&self) -> [u8; 32] {
        compute_commitment(self.value, &self.owner, &self.randomness)
    }

    /// Only valid once `epoch` and `leaf_index` are known (`spec.md` §3).
    pub fn recompute_nullifier(&self, nullifier_key: &[u8; 32]) -> Option<[u8; 32]> {
        let epoch = self.epoch?;
        let leaf_index = self.leaf_index?;
        Some(compute_nullifier(
            &self.commitment,
            nullifier_key,
            epoch,
            leaf_index as u64,
        ))
    }

    pub fn is_confirmed(&self) -> bool {
        self.epoch.is_some() && self.leaf_index.is_some()
    }
}

/// Binds a spend to `(commitment, nullifier_key, epoch, leaf_index)` —
/// logically four inputs, one more than the widest available primitive
/// (width 4, three inputs). Collapsed in two steps: `tmp =
/// hash_nodes(commitment, nullifier_key)` (width 3), then `poseidon4(tmp,
/// epoch_le32, leaf_index_le32)` (width 4). `epoch`/`leaf_index` are written
/// little-endian into the low bytes of a 32-byte field input (`spec.md`
/// §4.C) — this fixed encoding must match the circuit. See DESIGN.md for
/// why this decomposition was chosen over alternatives.
pub fn compute_nullifier(
    commitment: &[u8; 32],
    nullifier_key: &[u8; 32],
    epoch: u64,
    leaf_index: u64,
) -> [u8; 32] {
    let epoch_bytes = crate::field::u64_as_le_field_bytes(epoch);
    let leaf_bytes = crate::field::u64_as_le_field_bytes(leaf_index);
    let tmp = hash_nodes(commitment, nullifier_key);
    poseidon4(&tmp, &epoch_bytes, &leaf_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commitment_is_deterministic_and_sensitive_to_inputs() {
        let owner = [0xAAu8; 32];
        let randomness = [0xBBu8; 32];
        let c1 = compute_commitment(123456789, &owner, &randomness);
        let c2 = compute_commitment(123456789, &owner, &randomness);
        assert_eq!(c1, c2);

        let c_value = compute_commitment(123456790, &owner, &randomness);
        assert_ne!(c1, c_value);

        let mut owner2 = owner;
        owner2[0] ^= 1;
        let c_owner = compute_commitment(123456789, &owner2, &randomness);
        assert_ne!(c1, c_owner);

        let mut randomness2 = randomness;
        randomness2[0] ^= 1;
        let c_rand = compute_commitment(123456789, &owner, &randomness2);
        assert_ne!(c1, c_rand);
    }

    #[test]
    fn nullifier_is_epoch_and_index_scoped() {
        let commitment = [1u8; 32];
        let key = [2u8; 32];
        let n_0_0 = compute_nullifier(&commitment, &key, 1, 0);
        let n_0_1 = compute_nullifier(&commitment, &key, 1, 1);
        let n_1_0 = compute_nullifier(&commitment, &key, 2, 0);
        assert_ne!(n_0_0, n_0_1);
        assert_ne!(n_0_0, n_1_0);
        assert_ne!(n_0_1, n_1_0);
    }

    #[test]
    fn new_note_has_matching_blinding_and_commitment() {
        let note = Note::new(1000, [3u8; 32], [4u8; 32], [5u8; 32], None);
        assert_eq!(note.blinding, note.randomness);
        assert_eq!(note.commitment, note.recompute_commitment());
        assert!(!note.is_confirmed());
    }

    #[test]
    fn json_encodes_value_as_decimal_string_and_bytes_as_hex() {
        let note = Note::new(1000, [0xABu8; 32], [0xCDu8; 32], [0xEFu8; 32], None);
        let json: serde_json::Value = serde_json::to_value(&note).unwrap();
        assert_eq!(json["value"], serde_json::Value::String("1000".to_string()));
        assert_eq!(json["token"], serde_json::Value::String("ab".repeat(32)));
        assert_eq!(json["owner"], serde_json::Value::String("cd".repeat(32)));

        let round_tripped: Note = serde_json::from_value(json).unwrap();
        assert_eq!(round_tripped, note);
    }
}
