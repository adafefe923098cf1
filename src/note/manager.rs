//! `NoteManager` (`spec.md` §4.E): confirmed/pending note tables, epoch-aware
//! balance, selection, renewal detection.
//!
//! Table ownership and the single-writer guard are grounded on §5's
//! shared-resource policy and the teacher's use of `parking_lot` for its
//! cache/accounting structures.

use parking_lot::Mutex;
use rand::RngCore;
use std::collections::HashMap;
use thiserror::Error;

use super::note::{compute_commitment, AssetId, Note, ShieldedAddress};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteManagerError {
    #[error("insufficient balance to cover the requested spend")]
    InsufficientBalance,
    #[error("fewer notes available than the requested minimum count")]
    InsufficientNoteCount,
}

pub type NoteManagerResult<T> = Result<T, NoteManagerError>;

#[derive(Debug, Clone, Default)]
pub struct BalanceInfo {
    pub total: u128,
    pub spendable: u128,
    pub pending: u128,
    pub expiring: u128,
    pub expired: u128,
    pub confirmed_count: usize,
    pub pending_count: usize,
}

struct Tables {
    confirmed: HashMap<[u8; 32], Note>,
    pending: HashMap<[u8; 32], Note>,
    current_epoch: u64,
}

/// Epochs within this many of `current_epoch` (but not yet past it) are
/// "expiring"; notes too old to still spend are "expired" and excluded from
/// `balance()`.
const EXPIRING_WARNING_EPOCHS: u64 = 2;

pub struct NoteManager {
    inner: Mutex<Tables>,
    expiry_epochs: u64,
}

impl NoteManager {
    pub fn new(expiry_epochs: u64) -> Self {
        Self {
            inner: Mutex::new(Tables {
                confirmed: HashMap::new(),
                pending: HashMap::new(),
                current_epoch: 0,
            }),
            expiry_epochs,
        }
    }

    pub fn set_current_epoch(&self, epoch: u64) {
        let mut t = self.inner.lock();
        t.current_epoch = epoch;
        let expiry_epochs = self.expiry_epochs;
        for note in t.confirmed.values_mut() {
            if let Some(note_epoch) = note.epoch {
                note.expired = note_epoch + expiry_epochs <= epoch && note_epoch < epoch;
            }
        }
    }

    pub fn current_epoch(&self) -> u64 {
        self.inner.lock().current_epoch
    }

    /// Idempotent on commitment; fills in missing `epoch`/`leaf_index` on an
    /// existing match and removes any matching pending entry.
    pub fn add_confirmed(&self, mut note: Note) {
        let mut t = self.inner.lock();
        t.pending.remove(&note.commitment);
        if let Some(existing) = t.confirmed.get_mut(&note.commitment) {
            if existing.epoch.is_none() {
                existing.epoch = note.epoch;
            }
            if existing.leaf_index.is_none() {
                existing.leaf_index = note.leaf_index;
            }
            return;
        }
        if note.nullifier == super::note::NULL_NULLIFIER {
            note.nullifier = [0u8; 32];
        }
        t.confirmed.insert(note.commitment, note);
    }

    pub fn add_pending(&self, note: Note) {
        let mut t = self.inner.lock();
        t.pending.entry(note.commitment).or_insert(note);
    }

    /// Writes a freshly recomputed nullifier onto a confirmed note
    /// (`spec.md` §5 "nullifier recompute on change", run once `epoch`/
    /// `leaf_index` are known after confirmation).
    pub fn set_nullifier(&self, commitment: &[u8; 32], nullifier: [u8; 32]) -> bool {
        let mut t = self.inner.lock();
        if let Some(note) = t.confirmed.get_mut(commitment) {
            note.nullifier = nullifier;
            return true;
        }
        false
    }

    pub fn mark_spent(&self, commitment: &[u8; 32]) -> bool {
        let mut t = self.inner.lock();
        if let Some(note) = t.confirmed.get_mut(commitment) {
            note.spent = true;
            return true;
        }
        false
    }

    pub fn mark_spent_by_nullifier(&self, nullifier: &[u8; 32], epoch: Option<u64>) -> bool {
        let mut t = self.inner.lock();
        for note in t.confirmed.values_mut() {
            if &note.nullifier != nullifier {
                continue;
            }
            if let Some(e) = epoch {
                if note.epoch != Some(e) {
                    continue;
                }
            }
            note.spent = true;
            return true;
        }
        false
    }

    /// Chooses fresh uniform randomness, tags the note to the current
    /// epoch tentatively; `leaf_index`/`nullifier` remain unset until
    /// `recompute_nullifier` runs after confirmation.
    pub fn create_note(
        &self,
        value: u64,
        token: AssetId,
        owner: ShieldedAddress,
        memo: Option<String>,
    ) -> Note {
        let mut randomness = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut randomness);
        let commitment = compute_commitment(value, &owner, &randomness);
        let current_epoch = self.inner.lock().current_epoch;
        Note {
            value,
            token,
            owner,
            randomness,
            blinding: randomness,
            memo,
            commitment,
            epoch: Some(current_epoch),
            leaf_index: None,
            nullifier: super::note::NULL_NULLIFIER,
            spent: false,
            expired: false,
        }
    }

    fn unspent_unexpired(t: &Tables) -> Vec<Note> {
        t.confirmed
            .values()
            .filter(|n| !n.spent && !n.expired)
            .cloned()
            .collect()
    }

    /// Greedy selection: ascending epoch (oldest first, to encourage
    /// renewal), descending value within an epoch. Stops once the
    /// cumulative sum covers `amount` and `min_notes` notes are selected.
    pub fn select_for_spend(&self, amount: u64, min_notes: usize) -> NoteManagerResult<Vec<Note>> {
        let t = self.inner.lock();
        let mut candidates = Self::unspent_unexpired(&t);
        candidates.sort_by(|a, b| {
            a.epoch
                .unwrap_or(u64::MAX)
                .cmp(&b.epoch.unwrap_or(u64::MAX))
                .then(b.value.cmp(&a.value))
        });

        let mut selected = Vec::new();
        let mut sum: u128 = 0;
        for note in candidates {
            if sum >= amount as u128 && selected.len() >= min_notes {
                break;
            }
            sum += note.value as u128;
            selected.push(note);
        }

        if sum < amount as u128 {
            return Err(NoteManagerError::InsufficientBalance);
        }
        if selected.len() < min_notes {
            return Err(NoteManagerError::InsufficientNoteCount);
        }
        Ok(selected)
    }

    /// Notes tagged "expiring" (within `EXPIRING_WARNING_EPOCHS` of
    /// expiry), ordered by ascending epoch, truncated to `max_notes`.
    pub fn select_for_renewal(&self, max_notes: usize) -> Vec<Note> {
        let t = self.inner.lock();
        let current = t.current_epoch;
        let expiry_epochs = self.expiry_epochs;
        let mut expiring: Vec<Note> = t
            .confirmed
            .values()
            .filter(|n| !n.spent && !n.expired)
            .filter(|n| {
                n.epoch.is_some_and(|e| {
                    let expiry_at = e + expiry_epochs;
                    current + EXPIRING_WARNING_EPOCHS >= expiry_at && current < expiry_at
                })
            })
            .cloned()
            .collect();
        expiring.sort_by_key(|n| n.epoch.unwrap_or(u64::MAX));
        expiring.truncate(max_notes);
        expiring
    }

    pub fn balance(&self) -> u128 {
        let t = self.inner.lock();
        t.confirmed
            .values()
            .filter(|n| !n.spent && !n.expired)
            .map(|n| n.value as u128)
            .sum()
    }

    /// `total` is always exactly `spendable + pending + expiring` (spent and
    /// expired notes fall out of all three and are excluded from `total`),
    /// so the balance invariant holds unconditionally rather than by
    /// coincidence of which notes happen to be present.
    pub fn balance_info(&self) -> BalanceInfo {
        let t = self.inner.lock();
        let mut info = BalanceInfo {
            confirmed_count: t.confirmed.len(),
            pending_count: t.pending.len(),
            ..Default::default()
        };
        let current = t.current_epoch;
        let expiry_epochs = self.expiry_epochs;
        for note in t.confirmed.values() {
            if note.spent {
                continue;
            }
            let value = note.value as u128;
            if note.expired {
                info.expired += value;
                continue;
            }
            let is_expiring = note.epoch.is_some_and(|e| {
                let expiry_at = e + expiry_epochs;
                current + EXPIRING_WARNING_EPOCHS >= expiry_at && current < expiry_at
            });
            if is_expiring {
                info.expiring += value;
            } else {
                info.spendable += value;
            }
        }
        info.pending = t.pending.values().map(|n| n.value as u128).sum();
        info.total = info.spendable + info.pending + info.expiring;
        info
    }

    pub fn confirmed_notes(&self) -> Vec<Note> {
        self.inner.lock().confirmed.values().cloned().collect()
    }

    pub fn pending_notes(&self) -> Vec<Note> {
        self.inner.lock().pending.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(epoch: u64, value: u64) -> Note {
        let mut randomness = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut randomness);
        let owner = [1u8; 32];
        let commitment = compute_commitment(value, &owner, &randomness);
        Note {
            value,
            token: [0u8; 32],
            owner,
            randomness,
            blinding: randomness,
            memo: None,
            commitment,
            epoch: Some(epoch),
            leaf_index: Some(0),
            nullifier: [0u8; 32],
            spent: false,
            expired: false,
        }
    }

    #[test]
    fn greedy_selection_prefers_oldest_epoch_first() {
        let mgr = NoteManager::new(1000);
        mgr.add_confirmed(note(1, 1000));
        mgr.add_confirmed(note(1, 2000));
        mgr.add_confirmed(note(2, 3000));

        let selected = mgr.select_for_spend(4000, 1).unwrap();
        let sum: u64 = selected.iter().map(|n| n.value).sum();
        assert!(sum >= 4000);
        assert!(selected.iter().any(|n| n.epoch == Some(1)));
    }

    #[test]
    fn insufficient_balance_is_reported() {
        let mgr = NoteManager::new(1000);
        mgr.add_confirmed(note(1, 100));
        assert_eq!(
            mgr.select_for_spend(1000, 1).unwrap_err(),
            NoteManagerError::InsufficientBalance
        );
    }

    #[test]
    fn balance_invariant_holds() {
        let mgr = NoteManager::new(5);
        mgr.add_confirmed(note(1, 1000));
        mgr.add_confirmed(note(2, 2000));
        mgr.set_current_epoch(3);

        let info = mgr.balance_info();
        assert_eq!(info.spendable + info.pending + info.expiring, info.total);
        assert_eq!(mgr.balance() + info.expired, info.total - info.pending);
    }

    #[test]
    fn balance_invariant_holds_with_a_spent_note() {
        let mgr = NoteManager::new(1000);
        let n = note(1, 1000);
        mgr.add_confirmed(n.clone());
        mgr.mark_spent(&n.commitment);

        let info = mgr.balance_info();
        assert_eq!(info.spendable + info.pending + info.expiring, info.total);
        assert_eq!(info.total, 0);
    }

    #[test]
    fn set_nullifier_updates_a_confirmed_note() {
        let mgr = NoteManager::new(1000);
        let n = note(1, 500);
        mgr.add_confirmed(n.clone());
        assert!(mgr.set_nullifier(&n.commitment, [9u8; 32]));
        assert_eq!(mgr.confirmed_notes()[0].nullifier, [9u8; 32]);
        assert!(!mgr.set_nullifier(&[0xFFu8; 32], [9u8; 32]));
    }

    #[test]
    fn add_confirmed_removes_matching_pending() {
        let mgr = NoteManager::new(1000);
        let n = note(1, 500);
        mgr.add_pending(n.clone());
        assert_eq!(mgr.pending_notes().len(), 1);
        mgr.add_confirmed(n);
        assert_eq!(mgr.pending_notes().len(), 0);
        assert_eq!(mgr.confirmed_notes().len(), 1);
    }

    #[test]
    fn mark_spent_by_nullifier_respects_epoch_scope() {
        let mgr = NoteManager::new(1000);
        let mut n = note(1, 500);
        n.nullifier = [7u8; 32];
        mgr.add_confirmed(n);
        assert!(!mgr.mark_spent_by_nullifier(&[7u8; 32], Some(2)));
        assert!(mgr.mark_spent_by_nullifier(&[7u8; 32], Some(1)));
    }
}
