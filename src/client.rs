//! `Client` (`spec.md` §2/§5): the engine facade that sequences one
//! `deposit`/`transfer`/`withdraw`/`renew` call as forest sync → note
//! selection → witness build → prove → request assembly → submit →
//! post-confirm rescan → forest re-sync → nullifier recompute on change.
//!
//! Grounded on the teacher's top-level client/wallet types that own a
//! `NoteManager`-equivalent table plus a prover handle and wire the
//! individual components (key derivation, scanning, witness building)
//! into the four user-facing operations; the two on-chain edges
//! (`submit`, historical record fetch) are out of scope per `spec.md` §1
//! ("network RPC framing") and are consumed through narrow capability
//! traits, the same pattern as `ChainReader` and `Prover`.

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::keys::KeySet;
use crate::logger::{default_logger, Logger};
use crate::merkle::{ChainReader, EpochForest, EpochTree, MerkleProof};
use crate::note::{encrypt_note, AssetId, Note, NoteManager, ShieldedAddress};
use crate::scanner::Scanner;
use crate::witness::{
    build_renew_signals, build_transfer_signals, build_withdraw_signals, dummy_note, CircuitKind,
    NullifierMarketProbe, ProofBundle, Prover, Request, RequestBuilder, TrailingFields, WitnessError,
};

/// The chain-submission half of the `Prover`/`ChainReader` capability
/// trio: takes an assembled payload, returns the transaction signature
/// used for the immediate post-confirm rescan (`spec.md` §4.F
/// `rescan(signature)`).
pub trait RequestSubmitter {
    fn submit_deposit(&self, payload: &DepositPayload) -> ClientResult<[u8; 32]>;
    fn submit_request(&self, request: &Request) -> ClientResult<[u8; 32]>;
}

/// The historical-record-fetch half of the transport boundary: feeds the
/// scanner the records a submitted transaction produced, or the last
/// `limit` pool transactions on wallet re-open.
pub trait TransactionSource {
    fn fetch_transaction_records(&self, signature: &[u8; 32]) -> Vec<Vec<u8>>;
    fn fetch_recent_records(&self, limit: usize) -> Vec<Vec<u8>>;
}

#[derive(Debug, Clone)]
pub struct DepositPayload {
    pub commitment: [u8; 32],
    pub amount: u64,
    pub token: AssetId,
    pub enc_note: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    NoteManager(#[from] crate::note::NoteManagerError),
    #[error(transparent)]
    Forest(#[from] crate::merkle::ForestError),
    #[error(transparent)]
    Witness(#[from] WitnessError),
    #[error(transparent)]
    NoteCrypto(#[from] crate::note::NoteCryptoError),
    #[error("no merkle proof available for the spent note")]
    MissingMerkleProof,
    #[error("submission failed: {0}")]
    SubmissionFailed(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

/// The owning facade: a `NoteManager`, the epoch-segmented forest, a
/// `Scanner` wired to the same note table, the holder's keys, and the
/// injected `Prover`. One `Client` per wallet/session.
pub struct Client {
    notes: Arc<NoteManager>,
    forest: EpochForest,
    scanner: Scanner,
    keys: KeySet,
    prover: Box<dyn Prover>,
    config: EngineConfig,
    logger: Arc<dyn Logger>,
}

impl Client {
    pub fn new(
        keys: KeySet,
        prover: Box<dyn Prover>,
        config: EngineConfig,
        expiry_epochs: u64,
        logger: Option<Arc<dyn Logger>>,
    ) -> Self {
        let logger = logger.unwrap_or_else(default_logger);
        let notes = Arc::new(NoteManager::new(expiry_epochs));
        let scanner = Scanner::new(notes.clone(), keys.viewing_key, logger.clone());
        Self {
            notes,
            forest: EpochForest::new(),
            scanner,
            keys,
            prover,
            config,
            logger,
        }
    }

    pub fn notes(&self) -> &Arc<NoteManager> {
        &self.notes
    }

    pub fn forest(&self) -> &EpochForest {
        &self.forest
    }

    /// Recomputes and persists the nullifier for every confirmed note that
    /// now has `epoch`/`leaf_index` but still carries the null sentinel —
    /// the "nullifier recompute on change" step of `spec.md` §5, run after
    /// every confirming rescan.
    fn recompute_confirmed_nullifiers(&self) {
        for note in self.notes.confirmed_notes() {
            if note.nullifier != crate::note::note::NULL_NULLIFIER {
                continue;
            }
            if let Some(nullifier) = note.recompute_nullifier(&self.keys.nullifier_key) {
                self.notes.set_nullifier(&note.commitment, nullifier);
            }
        }
    }

    fn rescan_and_resync(
        &mut self,
        chain: &dyn ChainReader,
        txs: &dyn TransactionSource,
        signature: &[u8; 32],
    ) -> ClientResult<()> {
        let records = txs.fetch_transaction_records(signature);
        self.scanner.process_stream(&records);
        self.forest.sync(chain)?;
        self.recompute_confirmed_nullifiers();
        Ok(())
    }

    /// Replays the last `limit` pool transactions — used on wallet re-open
    /// rather than after a submission of our own.
    pub fn scan_history(&mut self, chain: &dyn ChainReader, txs: &dyn TransactionSource, limit: usize) -> ClientResult<()> {
        self.forest.sync(chain)?;
        let records = txs.fetch_recent_records(limit);
        self.scanner.process_stream(&records);
        self.recompute_confirmed_nullifiers();
        Ok(())
    }

    /// Creates a new note for `value`/`token`, submits the deposit, and
    /// replays the resulting confirmation. No circuit is involved — a
    /// deposit has no proof per `spec.md` §4.G.
    pub fn deposit(
        &mut self,
        chain: &dyn ChainReader,
        submitter: &dyn RequestSubmitter,
        txs: &dyn TransactionSource,
        value: u64,
        token: AssetId,
        memo: Option<String>,
    ) -> ClientResult<[u8; 32]> {
        self.forest.sync(chain)?;

        let note = self.notes.create_note(value, token, self.keys.shielded_address, memo);
        self.logger.info(&format!("depositing {value} into a new note {:?}", note.commitment));
        self.notes.add_pending(note.clone());

        let enc_note = encrypt_note(&note, &self.keys.viewing_key)?;
        let payload = DepositPayload {
            commitment: note.commitment,
            amount: value,
            token,
            enc_note,
        };

        let signature = submitter
            .submit_deposit(&payload)
            .map_err(|e| ClientError::SubmissionFailed(e.to_string()))?;
        self.rescan_and_resync(chain, txs, &signature)?;
        Ok(note.commitment)
    }

    fn merkle_proof(&self, note: &Note) -> ClientResult<MerkleProof> {
        let epoch = note.epoch.ok_or(ClientError::MissingMerkleProof)?;
        let leaf_index = note.leaf_index.ok_or(ClientError::MissingMerkleProof)?;
        let tree: &EpochTree = self.forest.get(epoch).ok_or(ClientError::MissingMerkleProof)?;
        Ok(tree.get_proof(leaf_index))
    }

    /// Spends a single note to a transparent recipient.
    #[allow(clippy::too_many_arguments)]
    pub fn withdraw(
        &mut self,
        chain: &dyn ChainReader,
        nullifiers: &dyn NullifierMarketProbe,
        submitter: &dyn RequestSubmitter,
        txs: &dyn TransactionSource,
        note: &Note,
        pool_id: [u8; 32],
        chain_id: [u8; 32],
        tx_anchor: [u8; 32],
    ) -> ClientResult<[u8; 32]> {
        self.forest.sync(chain)?;
        let proof = self.merkle_proof(note)?;

        let signals = build_withdraw_signals(
            note,
            &self.keys.nullifier_key,
            &proof,
            pool_id,
            chain_id,
            tx_anchor,
            self.config.merkle_order,
            self.config.merkle_left_is_one,
        )?;
        let bundle: ProofBundle = self.prover.prove(CircuitKind::Withdraw, &signals.public_inputs)?;

        let epoch = note.epoch.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
        let leaf_index = note.leaf_index.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
        let nullifier = note
            .recompute_nullifier(&self.keys.nullifier_key)
            .ok_or(WitnessError::NoteMissingEpochOrIndex)?;

        let request = RequestBuilder::build(
            nullifiers,
            &[note],
            bundle,
            &pool_id,
            &[epoch],
            &[(epoch, nullifier)],
            &[],
            TrailingFields::Withdraw { amount: note.value, epoch, leaf_index },
        )?;

        let signature = submitter
            .submit_request(&request)
            .map_err(|e| ClientError::SubmissionFailed(e.to_string()))?;
        self.notes.mark_spent(&note.commitment);
        self.logger.info(&format!("withdraw submitted, signature {:?}", signature));
        self.rescan_and_resync(chain, txs, &signature)?;
        Ok(signature)
    }

    /// Spends up to two input notes and creates up to two output notes of
    /// equal total value, as a private transfer.
    #[allow(clippy::too_many_arguments)]
    pub fn transfer(
        &mut self,
        chain: &dyn ChainReader,
        nullifiers: &dyn NullifierMarketProbe,
        submitter: &dyn RequestSubmitter,
        txs: &dyn TransactionSource,
        inputs: [&Note; 2],
        outputs: [(u64, ShieldedAddress); 2],
        pool_id: [u8; 32],
        chain_id: [u8; 32],
        tx_anchor: [u8; 32],
    ) -> ClientResult<[u8; 32]> {
        self.forest.sync(chain)?;

        let proofs: Vec<Option<MerkleProof>> = inputs
            .iter()
            .map(|n| if n.value == 0 { Ok(None) } else { self.merkle_proof(n).map(Some) })
            .collect::<ClientResult<_>>()?;
        let proof_refs = [proofs[0].as_ref(), proofs[1].as_ref()];

        let dummy = dummy_note();
        let output_notes: Vec<Note> = outputs
            .iter()
            .map(|(value, owner)| self.notes.create_note(*value, inputs[0].token, *owner, None))
            .collect();
        let output_refs = [&output_notes[0], &output_notes[1]];

        let signals = build_transfer_signals(
            inputs,
            &self.keys.nullifier_key,
            proof_refs,
            output_refs,
            pool_id,
            chain_id,
            tx_anchor,
        )?;
        let bundle = self.prover.prove(CircuitKind::Transfer, &signals.public_inputs)?;

        let mut input_epochs = [0u64; 2];
        let mut input_leaf_indices = [0u32; 2];
        let mut input_nullifiers = Vec::new();
        for (i, note) in inputs.iter().enumerate() {
            if note.value == 0 {
                continue;
            }
            let epoch = note.epoch.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
            let leaf_index = note.leaf_index.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
            let nullifier = note
                .recompute_nullifier(&self.keys.nullifier_key)
                .ok_or(WitnessError::NoteMissingEpochOrIndex)?;
            input_epochs[i] = epoch;
            input_leaf_indices[i] = leaf_index;
            input_nullifiers.push((epoch, nullifier));
        }
        let _ = &dummy;

        for output in &output_notes {
            self.notes.add_pending(output.clone());
        }

        let request = RequestBuilder::build(
            nullifiers,
            &inputs,
            bundle,
            &pool_id,
            input_epochs.as_ref(),
            &input_nullifiers,
            &[],
            TrailingFields::Transfer { input_epochs, input_leaf_indices },
        )?;

        let signature = submitter
            .submit_request(&request)
            .map_err(|e| ClientError::SubmissionFailed(e.to_string()))?;
        for note in inputs.iter() {
            if note.value != 0 {
                self.notes.mark_spent(&note.commitment);
            }
        }
        self.logger.info(&format!("transfer submitted, signature {:?}", signature));
        self.rescan_and_resync(chain, txs, &signature)?;
        Ok(signature)
    }

    /// Migrates `note` from its current epoch to the forest's active
    /// epoch without changing its value.
    #[allow(clippy::too_many_arguments)]
    pub fn renew(
        &mut self,
        chain: &dyn ChainReader,
        nullifiers: &dyn NullifierMarketProbe,
        submitter: &dyn RequestSubmitter,
        txs: &dyn TransactionSource,
        note: &Note,
        pool_id: [u8; 32],
        chain_id: [u8; 32],
        tx_anchor: [u8; 32],
    ) -> ClientResult<[u8; 32]> {
        self.forest.sync(chain)?;
        let proof = self.merkle_proof(note)?;

        let new_epoch = self.forest.active_epoch();
        let new_note = self.notes.create_note(note.value, note.token, note.owner, note.memo.clone());
        let mut new_note = new_note;
        new_note.epoch = Some(new_epoch);

        let signals = build_renew_signals(
            note,
            &new_note,
            &self.keys.nullifier_key,
            &proof,
            pool_id,
            chain_id,
            tx_anchor,
        )?;
        let bundle = self.prover.prove(CircuitKind::Renew, &signals.public_inputs)?;

        let old_epoch = note.epoch.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
        let old_leaf_index = note.leaf_index.ok_or(WitnessError::NoteMissingEpochOrIndex)?;
        let old_nullifier = note
            .recompute_nullifier(&self.keys.nullifier_key)
            .ok_or(WitnessError::NoteMissingEpochOrIndex)?;

        self.notes.add_pending(new_note.clone());

        let request = RequestBuilder::build(
            nullifiers,
            &[note],
            bundle,
            &pool_id,
            &[old_epoch, new_epoch],
            &[(old_epoch, old_nullifier)],
            &[(new_epoch, 0)],
            TrailingFields::Renew { old_epoch, old_leaf_index },
        )?;

        let signature = submitter
            .submit_request(&request)
            .map_err(|e| ClientError::SubmissionFailed(e.to_string()))?;
        self.notes.mark_spent(&note.commitment);
        self.logger.info(&format!("renew submitted, signature {:?}", signature));
        self.rescan_and_resync(chain, txs, &signature)?;
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merkle::{EpochHeader, LeafChunk};
    use crate::scanner::events::{encode_deposit, DepositEvent};
    use crate::witness::MockProver;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FakeChain {
        active: u64,
    }

    impl ChainReader for FakeChain {
        fn epoch_header(&self, _epoch: u64) -> Option<EpochHeader> {
            None
        }
        fn leaf_chunk(&self, _epoch: u64, _chunk_index: u32) -> Option<LeafChunk> {
            None
        }
        fn active_epoch(&self) -> u64 {
            self.active
        }
    }

    struct FakeNullifiers;
    impl NullifierMarketProbe for FakeNullifiers {
        fn nullifier_marker_exists(&self, _pool_id: &[u8; 32], _epoch: u64, _nullifier: &[u8; 32]) -> bool {
            false
        }
    }

    /// Records the submitted deposit and hands back a scripted
    /// confirmation record on the very next rescan, mimicking the chain
    /// program assigning `epoch`/`leaf_index` to the just-deposited note.
    struct FakeSubmitter {
        records: Mutex<HashMap<[u8; 32], Vec<u8>>>,
    }

    impl RequestSubmitter for FakeSubmitter {
        fn submit_deposit(&self, payload: &DepositPayload) -> ClientResult<[u8; 32]> {
            let signature = [0xABu8; 32];
            let record = encode_deposit(&DepositEvent {
                epoch: 1,
                pool_id: [0u8; 32],
                commitment: payload.commitment,
                leaf_index: 0,
                new_root: [0u8; 32],
                enc_note: payload.enc_note.clone(),
            });
            self.records.lock().unwrap().insert(signature, record);
            Ok(signature)
        }
        fn submit_request(&self, _request: &Request) -> ClientResult<[u8; 32]> {
            Ok([0xCDu8; 32])
        }
    }

    impl TransactionSource for FakeSubmitter {
        fn fetch_transaction_records(&self, signature: &[u8; 32]) -> Vec<Vec<u8>> {
            self.records
                .lock()
                .unwrap()
                .get(signature)
                .cloned()
                .into_iter()
                .collect()
        }
        fn fetch_recent_records(&self, _limit: usize) -> Vec<Vec<u8>> {
            Vec::new()
        }
    }

    fn client() -> Client {
        let keys = KeySet::from_seed(&[3u8; 32]).unwrap();
        Client::new(keys, Box::new(MockProver), EngineConfig::default(), 1000, None)
    }

    struct FakeChainWithLeaf {
        epoch: u64,
        leaf: [u8; 32],
    }

    impl ChainReader for FakeChainWithLeaf {
        fn epoch_header(&self, epoch: u64) -> Option<EpochHeader> {
            if epoch == self.epoch {
                Some(EpochHeader { state: crate::merkle::EpochState::Active, final_root: None, leaf_count: 1 })
            } else {
                None
            }
        }
        fn leaf_chunk(&self, epoch: u64, chunk_index: u32) -> Option<LeafChunk> {
            if epoch == self.epoch && chunk_index == 0 {
                Some(LeafChunk { leaves: vec![self.leaf] })
            } else {
                None
            }
        }
        fn active_epoch(&self) -> u64 {
            self.epoch
        }
    }

    #[test]
    fn deposit_confirms_and_recomputes_the_nullifier() {
        let mut c = client();
        let chain = FakeChain { active: 1 };
        let submitter = FakeSubmitter { records: Mutex::new(HashMap::new()) };

        let commitment = c.deposit(&chain, &submitter, &submitter, 1000, [0u8; 32], None).unwrap();

        let confirmed = c.notes.confirmed_notes();
        assert_eq!(confirmed.len(), 1);
        assert_eq!(confirmed[0].commitment, commitment);
        assert_eq!(confirmed[0].epoch, Some(1));
        assert_eq!(confirmed[0].leaf_index, Some(0));
        assert_ne!(confirmed[0].nullifier, crate::note::note::NULL_NULLIFIER);
        assert_eq!(
            confirmed[0].nullifier,
            confirmed[0].recompute_nullifier(&c.keys.nullifier_key).unwrap()
        );
    }

    #[test]
    fn withdraw_marks_spent_and_rejects_double_spend() {
        let mut c = client();
        let mut note = Note::new(100, [0u8; 32], c.keys.shielded_address, [2u8; 32], None);
        note.epoch = Some(1);
        note.leaf_index = Some(0);
        note.nullifier = note.recompute_nullifier(&c.keys.nullifier_key).unwrap();
        c.notes.add_confirmed(note.clone());

        let chain = FakeChainWithLeaf { epoch: 1, leaf: note.commitment };
        let nullifiers = FakeNullifiers;
        let submitter = FakeSubmitter { records: Mutex::new(HashMap::new()) };

        let signature = c
            .withdraw(&chain, &nullifiers, &submitter, &submitter, &note, [0u8; 32], [0u8; 32], [0u8; 32])
            .unwrap();
        assert_eq!(signature, [0xCDu8; 32]);
        assert!(c.notes.confirmed_notes().iter().find(|n| n.commitment == note.commitment).unwrap().spent);
    }
}
