//! Deterministic key derivation: seed → spending/viewing/nullifier keys and
//! shielded address (`spec.md` §4.B).
//!
//! Grounded on the teacher's `crypto/key_derivation.rs` for error naming
//! (`KeyDerivationFailed`, `InvalidSeedLength`) but not its mechanics — that
//! file implements BIP32-over-secp256k1, a different curve from the
//! SLIP-0010 collapse this spec calls for.

use bip39::Mnemonic;
use sha2::{Digest, Sha256};
use slip10::BIP32Path;
use std::str::FromStr as _;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("invalid BIP39 mnemonic")]
    InvalidMnemonic,
    #[error("seed must be exactly 32 bytes")]
    InvalidSeedLength,
    #[error("address must decode to exactly 32 bytes")]
    InvalidAddress,
}

pub type KeyResult<T> = Result<T, KeyError>;

const DERIVATION_PATH: &str = "m/44'/501'/0'/0'";

/// The four 32-byte values derived from a seed, plus the base58-encodable
/// shielded address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    pub seed: [u8; 32],
    pub spending_key: [u8; 32],
    pub viewing_key: [u8; 32],
    pub nullifier_key: [u8; 32],
    pub shielded_address: [u8; 32],
}

fn domain_hash(domain: &[u8], data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    hasher.finalize().into()
}

impl KeySet {
    fn from_seed32(seed: [u8; 32]) -> Self {
        let spending_key = domain_hash(b"spending", &seed);
        let viewing_key = domain_hash(b"viewing", &seed);
        let nullifier_key = domain_hash(b"nullifier", &seed);
        let shielded_address = domain_hash(b"address", &spending_key);
        Self {
            seed,
            spending_key,
            viewing_key,
            nullifier_key,
            shielded_address,
        }
    }

    /// Generate a fresh 128-bit BIP39 mnemonic, derive its 64-byte PBKDF2
    /// seed (empty passphrase), and collapse to 32 bytes via SLIP-0010
    /// along `m/44'/501'/0'/0'`.
    pub fn generate() -> KeyResult<(Mnemonic, Self)> {
        let mnemonic = Mnemonic::generate(12).map_err(|_| KeyError::InvalidMnemonic)?;
        let keyset = Self::from_mnemonic_unchecked(&mnemonic)?;
        Ok((mnemonic, keyset))
    }

    pub fn from_mnemonic(phrase: &str) -> KeyResult<Self> {
        let mnemonic = Mnemonic::parse(phrase).map_err(|_| KeyError::InvalidMnemonic)?;
        Self::from_mnemonic_unchecked(&mnemonic)
    }

    fn from_mnemonic_unchecked(mnemonic: &Mnemonic) -> KeyResult<Self> {
        let seed64 = mnemonic.to_seed("");
        let path = BIP32Path::from_str(DERIVATION_PATH).map_err(|_| KeyError::InvalidMnemonic)?;
        let derived = slip10::derive_key_from_path(&seed64, slip10::Curve::Ed25519, &path)
            .map_err(|_| KeyError::InvalidMnemonic)?;
        Ok(Self::from_seed32(derived.key))
    }

    pub fn from_seed(bytes: &[u8]) -> KeyResult<Self> {
        let seed: [u8; 32] = bytes
            .try_into()
            .map_err(|_| KeyError::InvalidSeedLength)?;
        Ok(Self::from_seed32(seed))
    }

    pub fn encode_address(&self) -> String {
        bs58::encode(&self.shielded_address).into_string()
    }

    pub fn decode_address(s: &str) -> KeyResult<[u8; 32]> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|_| KeyError::InvalidAddress)?;
        bytes.try_into().map_err(|_| KeyError::InvalidAddress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_seed_rejects_wrong_length() {
        assert_eq!(
            KeySet::from_seed(&[0u8; 31]).unwrap_err(),
            KeyError::InvalidSeedLength
        );
    }

    #[test]
    fn from_seed_is_deterministic() {
        let a = KeySet::from_seed(&[7u8; 32]).unwrap();
        let b = KeySet::from_seed(&[7u8; 32]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn derived_keys_are_distinct() {
        let k = KeySet::from_seed(&[1u8; 32]).unwrap();
        assert_ne!(k.spending_key, k.viewing_key);
        assert_ne!(k.viewing_key, k.nullifier_key);
        assert_ne!(k.spending_key, k.shielded_address);
    }

    #[test]
    fn address_round_trips_through_base58() {
        let k = KeySet::from_seed(&[9u8; 32]).unwrap();
        let encoded = k.encode_address();
        let decoded = KeySet::decode_address(&encoded).unwrap();
        assert_eq!(decoded, k.shielded_address);
    }

    #[test]
    fn decode_address_rejects_wrong_length() {
        let encoded = bs58::encode(&[1u8; 10]).into_string();
        assert_eq!(
            KeySet::decode_address(&encoded).unwrap_err(),
            KeyError::InvalidAddress
        );
    }

    #[test]
    fn generate_round_trips_through_mnemonic() {
        let (mnemonic, keyset) = KeySet::generate().unwrap();
        let restored = KeySet::from_mnemonic(&mnemonic.to_string()).unwrap();
        assert_eq!(keyset, restored);
    }

    #[test]
    fn invalid_mnemonic_is_rejected() {
        assert_eq!(
            KeySet::from_mnemonic("not a valid mnemonic phrase at all").unwrap_err(),
            KeyError::InvalidMnemonic
        );
    }
}
