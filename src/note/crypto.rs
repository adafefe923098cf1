//! Note encryption (`spec.md` §4.C): XSalsa20-Poly1305 keyed directly by the
//! recipient's 32-byte viewing key.
//!
//! Grounded on the teacher's `crypto/ecies.rs` for module shape
//! (`encrypt`/`decrypt` associated functions, random-nonce generation,
//! fail-closed error mapping) but not its ECDH mechanics — this spec keys
//! encryption symmetrically off the viewing key rather than an ephemeral
//! shared secret, matching the pack's `Robert-MacWha-railgun-rs` use of
//! `xsalsa20poly1305` for the same role.

use rand::rngs::OsRng;
use thiserror::Error;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, XSalsa20Poly1305};

use super::note::{AssetId, Note, ShieldedAddress};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NoteCryptoError {
    #[error("note is not addressed to this viewing key")]
    NotMine,
    #[error("malformed note payload")]
    Malformed,
}

pub type NoteCryptoResult<T> = Result<T, NoteCryptoError>;

/// Exactly 130 + memo_len bytes: `value(32 BE) || token(32) || owner(32) ||
/// blinding(32) || memo_len(u16 LE) || memo_utf8`.
fn canonical_serialize(note: &Note) -> Vec<u8> {
    let memo_bytes = note.memo.as_deref().unwrap_or("").as_bytes();
    let mut out = Vec::with_capacity(130 + memo_bytes.len());
    out.extend_from_slice(&super::note::value_be32(note.value));
    out.extend_from_slice(&note.token);
    out.extend_from_slice(&note.owner);
    out.extend_from_slice(&note.blinding);
    out.extend_from_slice(&(memo_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(memo_bytes);
    out
}

fn canonical_deserialize(bytes: &[u8]) -> NoteCryptoResult<(u64, AssetId, ShieldedAddress, [u8; 32], Option<String>)> {
    if bytes.len() < 130 {
        return Err(NoteCryptoError::Malformed);
    }
    let mut value_be = [0u8; 32];
    value_be.copy_from_slice(&bytes[0..32]);
    if value_be[..24].iter().any(|&b| b != 0) {
        return Err(NoteCryptoError::Malformed);
    }
    let mut value_le8 = [0u8; 8];
    value_le8.copy_from_slice(&value_be[24..32]);
    let value = u64::from_be_bytes(value_le8);

    let mut token = [0u8; 32];
    token.copy_from_slice(&bytes[32..64]);
    let mut owner = [0u8; 32];
    owner.copy_from_slice(&bytes[64..96]);
    let mut blinding = [0u8; 32];
    blinding.copy_from_slice(&bytes[96..128]);

    let memo_len = u16::from_le_bytes([bytes[128], bytes[129]]) as usize;
    if bytes.len() != 130 + memo_len {
        return Err(NoteCryptoError::Malformed);
    }
    let memo = if memo_len == 0 {
        None
    } else {
        Some(
            String::from_utf8(bytes[130..130 + memo_len].to_vec())
                .map_err(|_| NoteCryptoError::Malformed)?,
        )
    };

    Ok((value, token, owner, blinding, memo))
}

/// File format: `nonce(24) || ciphertext`.
pub fn encrypt_note(note: &Note, viewing_key: &[u8; 32]) -> NoteCryptoResult<Vec<u8>> {
    let plaintext = canonical_serialize(note);
    let cipher = XSalsa20Poly1305::new(Key::from_slice(viewing_key));
    let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_slice())
        .map_err(|_| NoteCryptoError::Malformed)?;

    let mut out = Vec::with_capacity(24 + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt and reconstruct a `Note` (unconfirmed: `epoch`/`leaf_index`
/// unset, `nullifier` unset). Authentication failure fails closed as
/// `NotMine`, matching any-key-tried scanning semantics.
pub fn decrypt_note(sealed: &[u8], viewing_key: &[u8; 32]) -> NoteCryptoResult<Note> {
    if sealed.len() < 24 {
        return Err(NoteCryptoError::Malformed);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(24);
    let cipher = XSalsa20Poly1305::new(Key::from_slice(viewing_key));
    let plaintext = cipher
        .decrypt(nonce_bytes.into(), ciphertext)
        .map_err(|_| NoteCryptoError::NotMine)?;

    let (value, token, owner, blinding, memo) = canonical_deserialize(&plaintext)?;
    let mut note = Note::new(value, token, owner, blinding, memo);
    note.blinding = blinding;
    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_correct_key() {
        let key = [9u8; 32];
        let note = Note::new(1000, [1u8; 32], [2u8; 32], [3u8; 32], Some("hi".into()));
        let sealed = encrypt_note(&note, &key).unwrap();
        let decrypted = decrypt_note(&sealed, &key).unwrap();
        assert_eq!(decrypted.value, note.value);
        assert_eq!(decrypted.token, note.token);
        assert_eq!(decrypted.owner, note.owner);
        assert_eq!(decrypted.blinding, note.blinding);
        assert_eq!(decrypted.memo, note.memo);
        assert_eq!(decrypted.commitment, note.commitment);
    }

    #[test]
    fn wrong_key_fails_closed() {
        let key = [9u8; 32];
        let wrong = [8u8; 32];
        let note = Note::new(500, [1u8; 32], [2u8; 32], [3u8; 32], None);
        let sealed = encrypt_note(&note, &key).unwrap();
        assert_eq!(decrypt_note(&sealed, &wrong).unwrap_err(), NoteCryptoError::NotMine);
    }

    #[test]
    fn note_with_no_memo_round_trips() {
        let key = [1u8; 32];
        let note = Note::new(1, [0u8; 32], [0u8; 32], [0u8; 32], None);
        let sealed = encrypt_note(&note, &key).unwrap();
        let decrypted = decrypt_note(&sealed, &key).unwrap();
        assert_eq!(decrypted.memo, None);
    }
}
