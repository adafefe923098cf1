//! Encrypted persistent note store (`spec.md` §4.E persistence / §5 / §6).
//!
//! File format: `nonce(24) || ciphertext`, ciphertext an XSalsa20-Poly1305
//! seal of UTF-8 JSON of `NoteStoreSnapshot` under the 32-byte viewing key.
//! The on-disk store uses an advisory directory lock (atomic `mkdir
//! .lock`) with stale-lock eviction and atomic write-temp-then-rename,
//! grounded on the teacher's use of `parking_lot`/atomic-batch patterns in
//! `database/batch_writer.rs` for write safety, generalized here to a
//! filesystem rather than RocksDB.

use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xsalsa20poly1305::aead::{Aead, KeyInit};
use xsalsa20poly1305::{Key, XSalsa20Poly1305};

use crate::note::Note;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("stored data is corrupt or truncated")]
    StoreCorrupt,
    #[error("timed out acquiring the store's advisory lock")]
    LockTimeout,
    #[error("wrong encryption key")]
    WrongEncryptionKey,
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteStoreSnapshot {
    pub version: u32,
    pub updated_at: u64,
    pub current_epoch: u64,
    pub notes: Vec<Note>,
    pub pending_notes: Vec<Note>,
}

impl NoteStoreSnapshot {
    pub fn new(current_epoch: u64, notes: Vec<Note>, pending_notes: Vec<Note>, now: u64) -> Self {
        Self {
            version: 1,
            updated_at: now,
            current_epoch,
            notes,
            pending_notes,
        }
    }
}

pub trait NoteStore {
    fn save(&mut self, snapshot: &NoteStoreSnapshot) -> StoreResult<()>;
    fn load(&self) -> Option<NoteStoreSnapshot>;
}

/// Synchronous, in-memory reference implementation — used by tests and as
/// the model the real file store's round-trip is checked against.
#[derive(Default)]
pub struct InMemoryStore {
    data: Option<NoteStoreSnapshot>,
}

impl NoteStore for InMemoryStore {
    fn save(&mut self, snapshot: &NoteStoreSnapshot) -> StoreResult<()> {
        self.data = Some(snapshot.clone());
        Ok(())
    }

    fn load(&self) -> Option<NoteStoreSnapshot> {
        self.data.clone()
    }
}

const LOCK_STALE_AFTER: Duration = Duration::from_secs(5);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EncryptedFileStore {
    path: PathBuf,
    viewing_key: [u8; 32],
}

impl EncryptedFileStore {
    pub fn new(path: impl Into<PathBuf>, viewing_key: [u8; 32]) -> Self {
        Self { path: path.into(), viewing_key }
    }

    fn lock_path(&self) -> PathBuf {
        let mut p = self.path.clone();
        p.set_extension("lock");
        p
    }

    fn acquire_lock(&self) -> StoreResult<LockGuard> {
        let lock_path = self.lock_path();
        let deadline = SystemTime::now() + LOCK_TIMEOUT;
        loop {
            match fs::create_dir(&lock_path) {
                Ok(()) => return Ok(LockGuard { path: lock_path }),
                Err(_) => {
                    if let Ok(meta) = fs::metadata(&lock_path) {
                        if let Ok(modified) = meta.modified() {
                            if modified.elapsed().unwrap_or_default() > LOCK_STALE_AFTER {
                                let _ = fs::remove_dir(&lock_path);
                                continue;
                            }
                        }
                    }
                    if SystemTime::now() >= deadline {
                        return Err(StoreError::LockTimeout);
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
            }
        }
    }
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir(&self.path);
    }
}

impl NoteStore for EncryptedFileStore {
    fn save(&mut self, snapshot: &NoteStoreSnapshot) -> StoreResult<()> {
        let _lock = self.acquire_lock()?;
        let json = serde_json::to_vec(snapshot).map_err(|_| StoreError::StoreCorrupt)?;

        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.viewing_key));
        let nonce = XSalsa20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, json.as_slice())
            .map_err(|_| StoreError::StoreCorrupt)?;

        let mut out = Vec::with_capacity(24 + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);

        write_atomic(&self.path, &out).map_err(|_| StoreError::StoreCorrupt)
    }

    fn load(&self) -> Option<NoteStoreSnapshot> {
        let bytes = fs::read(&self.path).ok()?;
        if bytes.len() < 24 {
            return None;
        }
        let (nonce, ciphertext) = bytes.split_at(24);
        let cipher = XSalsa20Poly1305::new(Key::from_slice(&self.viewing_key));
        let plaintext = cipher.decrypt(nonce.into(), ciphertext).ok()?;
        serde_json::from_slice(&plaintext).ok()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp_path = dir.to_path_buf();
    tmp_path.push(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ));

    {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)
}

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_snapshot() -> NoteStoreSnapshot {
        let note = Note::new(1000, [0u8; 32], [1u8; 32], [2u8; 32], None);
        let pending = Note::new(50, [0u8; 32], [3u8; 32], [4u8; 32], None);
        NoteStoreSnapshot::new(42, vec![note], vec![pending], 1_700_000_000)
    }

    #[test]
    fn in_memory_round_trip() {
        let mut store = InMemoryStore::default();
        let mut snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();
        snapshot.notes[0].value = 999999; // mutate input after save
        let loaded = store.load().unwrap();
        assert_eq!(loaded.notes[0].value, 1000);
        assert_eq!(loaded, store.load().unwrap());
    }

    #[test]
    fn file_store_round_trips_with_correct_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.store");
        let key = [1u8; 32];
        let mut store = EncryptedFileStore::new(&path, key);
        let snapshot = sample_snapshot();
        store.save(&snapshot).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, snapshot);
    }

    #[test]
    fn file_store_wrong_key_returns_none_not_plaintext() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.store");
        let mut store = EncryptedFileStore::new(&path, [1u8; 32]);
        store.save(&sample_snapshot()).unwrap();

        let wrong_key_store = EncryptedFileStore::new(&path, [2u8; 32]);
        assert!(wrong_key_store.load().is_none());

        let on_disk = fs::read(&path).unwrap();
        assert!(serde_json::from_slice::<serde_json::Value>(&on_disk).is_err());
    }

    #[test]
    fn load_missing_file_returns_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.store");
        let store = EncryptedFileStore::new(&path, [1u8; 32]);
        assert!(store.load().is_none());
    }
}
