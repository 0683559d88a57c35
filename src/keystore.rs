//! The keystore abstraction and its reference implementation.
//!
//! The core protocol treats the keystore as an external collaborator: it
//! only needs to enumerate known public keys (for the emitter, via
//! [`Keystore::snapshot`]) and check whether a blinded entry matches one of
//! them (for the listener, via [`Keystore::accepted_challenge`]). This
//! module supplies a concrete, file-backed implementation keyed on raw
//! 32-byte public keys.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::blind::blind;
use crate::constants::BEACON_MEMBER_SIZE;
use crate::error::{BeaconError, Result};
use crate::hash::Hasher;

/// A raw 32-byte public key. Opaque to the core crate — it never interprets
/// the bytes, only blinds and compares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublicKey(pub [u8; BEACON_MEMBER_SIZE]);

impl PublicKey {
    pub fn as_bytes(&self) -> &[u8; BEACON_MEMBER_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let bytes = hex::decode(s).ok()?;
        let arr: [u8; BEACON_MEMBER_SIZE] = bytes.try_into().ok()?;
        Some(PublicKey(arr))
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        PublicKey::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid public key hex"))
    }
}

/// A single keystore record: a public key plus an opaque display tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    pub pubkey: PublicKey,
    pub tag: Option<String>,
}

/// The interface the core protocol consumes.
pub trait Keystore: Send + Sync {
    /// Snapshot every locally-trusted key, for the emitter's mask (C3) to
    /// batch across packet pairs. Must be a stable copy: later mutation of
    /// the keystore must not perturb a batch already in flight.
    fn snapshot(&self) -> Vec<KeyEntry>;

    /// Test whether `entry` (a blinded value received on the wire) matches
    /// any locally-known key under `challenge`. Returns the matching key and
    /// its tag on success. The default implementation does the naive
    /// O(n) scan; a backing store with an
    /// index may override this for speed without changing semantics.
    fn accepted_challenge(
        &self,
        entry: &[u8; BEACON_MEMBER_SIZE],
        challenge: u64,
        hasher: &dyn Hasher,
    ) -> Option<KeyEntry> {
        self.snapshot().into_iter().find(|candidate| {
            &blind(hasher, challenge, candidate.pubkey.as_bytes()) == entry
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct KeystoreFile {
    keys: Vec<KeyEntry>,
}

/// A JSON-file-backed keystore, guarded by an [`RwLock`] so the CLI's
/// `keygen` path can add keys concurrently with a running emitter or
/// listener.
pub struct FileKeystore {
    path: PathBuf,
    keys: RwLock<HashMap<PublicKey, Option<String>>>,
}

impl FileKeystore {
    /// Loads the keystore from `path`, creating an empty one if the file
    /// does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let keys = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|source| BeaconError::KeystoreIo {
                path: path.display().to_string(),
                source,
            })?;
            let file: KeystoreFile =
                serde_json::from_str(&raw).map_err(|source| BeaconError::KeystoreDecode {
                    path: path.display().to_string(),
                    source,
                })?;
            file.keys
                .into_iter()
                .map(|e| (e.pubkey, e.tag))
                .collect()
        } else {
            HashMap::new()
        };

        Ok(FileKeystore {
            path,
            keys: RwLock::new(keys),
        })
    }

    /// Adds or updates a key with an optional display tag, persisting
    /// immediately.
    pub fn add(&self, pubkey: PublicKey, tag: Option<String>) -> Result<()> {
        self.keys.write().unwrap().insert(pubkey, tag);
        self.persist()
    }

    pub fn remove(&self, pubkey: &PublicKey) -> Result<bool> {
        let removed = self.keys.write().unwrap().remove(pubkey).is_some();
        if removed {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.keys.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist(&self) -> Result<()> {
        let keys = self.keys.read().unwrap();
        let file = KeystoreFile {
            keys: keys
                .iter()
                .map(|(pubkey, tag)| KeyEntry {
                    pubkey: *pubkey,
                    tag: tag.clone(),
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&file).expect("keystore serialization is infallible");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| BeaconError::KeystoreIo {
                path: self.path.display().to_string(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| BeaconError::KeystoreIo {
            path: self.path.display().to_string(),
            source,
        })
    }
}

impl Keystore for FileKeystore {
    fn snapshot(&self) -> Vec<KeyEntry> {
        self.keys
            .read()
            .unwrap()
            .iter()
            .map(|(pubkey, tag)| KeyEntry {
                pubkey: *pubkey,
                tag: tag.clone(),
            })
            .collect()
    }
}

/// A simple in-memory keystore, useful for tests and for callers who don't
/// want file persistence.
#[derive(Default)]
pub struct MemoryKeystore {
    keys: RwLock<Vec<KeyEntry>>,
}

impl MemoryKeystore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_keys(keys: Vec<KeyEntry>) -> Self {
        MemoryKeystore {
            keys: RwLock::new(keys),
        }
    }

    pub fn insert(&self, pubkey: PublicKey, tag: Option<String>) {
        self.keys.write().unwrap().push(KeyEntry { pubkey, tag });
    }
}

impl Keystore for MemoryKeystore {
    fn snapshot(&self) -> Vec<KeyEntry> {
        self.keys.read().unwrap().clone()
    }
}
