//! Tagged event record wire format (`spec.md` §4.F/§6).

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireFormatError {
    #[error("record too short for its tag or declared fields")]
    Truncated,
    #[error("unknown event tag")]
    UnknownTag,
}

fn event_tag(name: &str) -> [u8; 8] {
    let mut hasher = Sha256::new();
    hasher.update(b"event:");
    hasher.update(name.as_bytes());
    let digest = hasher.finalize();
    let mut tag = [0u8; 8];
    tag.copy_from_slice(&digest[..8]);
    tag
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositEvent {
    pub epoch: u64,
    pub pool_id: [u8; 32],
    pub commitment: [u8; 32],
    pub leaf_index: u64,
    pub new_root: [u8; 32],
    pub enc_note: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawEvent {
    pub epoch: u64,
    pub pool_id: [u8; 32],
    pub nullifier: [u8; 32],
    pub amount: u64,
    pub recipient: [u8; 32],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    pub output_epoch: u64,
    pub pool_id: [u8; 32],
    pub nullifiers: Vec<[u8; 32]>,
    pub input_epochs: Vec<u64>,
    pub commitments: Vec<[u8; 32]>,
    pub leaf_indices: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenewEvent {
    pub old_epoch: u64,
    pub new_epoch: u64,
    pub pool_id: [u8; 32],
    pub old_nullifier: [u8; 32],
    pub new_commitment: [u8; 32],
    pub new_leaf_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochRolloverEvent {
    pub old_epoch: u64,
    pub new_epoch: u64,
    pub slot: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochFinalizedEvent {
    pub epoch: u64,
    pub final_root: [u8; 32],
    pub slot: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventRecord {
    Deposit(DepositEvent),
    Withdraw(WithdrawEvent),
    Transfer(TransferEvent),
    Renew(RenewEvent),
    EpochRollover(EpochRolloverEvent),
    EpochFinalized(EpochFinalizedEvent),
}

fn read_u64(bytes: &[u8], offset: usize) -> Result<u64, WireFormatError> {
    bytes
        .get(offset..offset + 8)
        .and_then(|s| s.try_into().ok())
        .map(u64::from_le_bytes)
        .ok_or(WireFormatError::Truncated)
}

fn read_32(bytes: &[u8], offset: usize) -> Result<[u8; 32], WireFormatError> {
    bytes
        .get(offset..offset + 32)
        .and_then(|s| s.try_into().ok())
        .ok_or(WireFormatError::Truncated)
}

fn read_len_prefixed(bytes: &[u8], offset: usize) -> Result<(Vec<u8>, usize), WireFormatError> {
    let len = read_u32(bytes, offset)? as usize;
    let start = offset + 4;
    let data = bytes
        .get(start..start + len)
        .ok_or(WireFormatError::Truncated)?
        .to_vec();
    Ok((data, start + len))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32, WireFormatError> {
    bytes
        .get(offset..offset + 4)
        .and_then(|s| s.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or(WireFormatError::Truncated)
}

fn read_vec32(bytes: &[u8], offset: usize) -> Result<(Vec<[u8; 32]>, usize), WireFormatError> {
    let count = read_u32(bytes, offset)? as usize;
    let mut pos = offset + 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_32(bytes, pos)?);
        pos += 32;
    }
    Ok((out, pos))
}

fn read_vec64(bytes: &[u8], offset: usize) -> Result<(Vec<u64>, usize), WireFormatError> {
    let count = read_u32(bytes, offset)? as usize;
    let mut pos = offset + 4;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        out.push(read_u64(bytes, pos)?);
        pos += 8;
    }
    Ok((out, pos))
}

/// Decode `tag(8) || payload` into the matching `EventRecord`. Unknown tags
/// and malformed payloads are reported so callers can skip-and-log rather
/// than treat them as fatal (`spec.md` §4.F).
pub fn decode_record(bytes: &[u8]) -> Result<EventRecord, WireFormatError> {
    if bytes.len() < 8 {
        return Err(WireFormatError::Truncated);
    }
    let tag = &bytes[..8];
    let payload = &bytes[8..];

    if tag == event_tag("DepositEvent") {
        let epoch = read_u64(payload, 0)?;
        let pool_id = read_32(payload, 8)?;
        let commitment = read_32(payload, 40)?;
        let leaf_index = read_u64(payload, 72)?;
        let new_root = read_32(payload, 80)?;
        let (enc_note, _) = read_len_prefixed(payload, 112)?;
        Ok(EventRecord::Deposit(DepositEvent {
            epoch,
            pool_id,
            commitment,
            leaf_index,
            new_root,
            enc_note,
        }))
    } else if tag == event_tag("WithdrawEvent") {
        let epoch = read_u64(payload, 0)?;
        let pool_id = read_32(payload, 8)?;
        let nullifier = read_32(payload, 40)?;
        let amount = read_u64(payload, 72)?;
        let recipient = read_32(payload, 80)?;
        Ok(EventRecord::Withdraw(WithdrawEvent {
            epoch,
            pool_id,
            nullifier,
            amount,
            recipient,
        }))
    } else if tag == event_tag("TransferEvent") {
        let output_epoch = read_u64(payload, 0)?;
        let pool_id = read_32(payload, 8)?;
        let (nullifiers, pos) = read_vec32(payload, 40)?;
        let (input_epochs, pos) = read_vec64(payload, pos)?;
        let (commitments, pos) = read_vec32(payload, pos)?;
        let (leaf_indices, _) = read_vec64(payload, pos)?;
        Ok(EventRecord::Transfer(TransferEvent {
            output_epoch,
            pool_id,
            nullifiers,
            input_epochs,
            commitments,
            leaf_indices,
        }))
    } else if tag == event_tag("RenewEvent") {
        let old_epoch = read_u64(payload, 0)?;
        let new_epoch = read_u64(payload, 8)?;
        let pool_id = read_32(payload, 16)?;
        let old_nullifier = read_32(payload, 48)?;
        let new_commitment = read_32(payload, 80)?;
        let new_leaf_index = read_u64(payload, 112)?;
        Ok(EventRecord::Renew(RenewEvent {
            old_epoch,
            new_epoch,
            pool_id,
            old_nullifier,
            new_commitment,
            new_leaf_index,
        }))
    } else if tag == event_tag("EpochRolloverEvent") {
        let old_epoch = read_u64(payload, 0)?;
        let new_epoch = read_u64(payload, 8)?;
        let slot = read_u64(payload, 16)?;
        Ok(EventRecord::EpochRollover(EpochRolloverEvent {
            old_epoch,
            new_epoch,
            slot,
        }))
    } else if tag == event_tag("EpochFinalizedEvent") {
        let epoch = read_u64(payload, 0)?;
        let final_root = read_32(payload, 8)?;
        let slot = read_u64(payload, 40)?;
        Ok(EventRecord::EpochFinalized(EpochFinalizedEvent {
            epoch,
            final_root,
            slot,
        }))
    } else {
        Err(WireFormatError::UnknownTag)
    }
}

pub fn encode_deposit(event: &DepositEvent) -> Vec<u8> {
    let mut out = event_tag("DepositEvent").to_vec();
    out.extend_from_slice(&event.epoch.to_le_bytes());
    out.extend_from_slice(&event.pool_id);
    out.extend_from_slice(&event.commitment);
    out.extend_from_slice(&event.leaf_index.to_le_bytes());
    out.extend_from_slice(&event.new_root);
    out.extend_from_slice(&(event.enc_note.len() as u32).to_le_bytes());
    out.extend_from_slice(&event.enc_note);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_round_trips() {
        let event = DepositEvent {
            epoch: 7,
            pool_id: [1u8; 32],
            commitment: [2u8; 32],
            leaf_index: 42,
            new_root: [3u8; 32],
            enc_note: vec![9, 9, 9],
        };
        let bytes = encode_deposit(&event);
        match decode_record(&bytes).unwrap() {
            EventRecord::Deposit(decoded) => assert_eq!(decoded, event),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_tag_is_reported() {
        let bytes = [0u8; 16];
        assert_eq!(decode_record(&bytes).unwrap_err(), WireFormatError::UnknownTag);
    }

    #[test]
    fn truncated_record_is_reported() {
        let tag = event_tag("DepositEvent");
        assert_eq!(decode_record(&tag).unwrap_err(), WireFormatError::Truncated);
    }
}
