//! Keystore mask iterator (C3): a restartable cursor over the local
//! keystore, used by the emitter to batch keys across packet pairs.

use crate::constants::BEACON_KEY_CAP;
use crate::keystore::{KeyEntry, Keystore};

/// A restartable cursor over a snapshot of the keystore.
///
/// On first use after construction or [`KeystoreMask::reset`], the mask
/// snapshots the keystore once; every subsequent [`KeystoreMask::next`]
/// advances through that frozen snapshot. This guarantees that packet A and
/// packet B of one pair — and every pair across one full cycle — see the
/// same ordered key set, even if the keystore is mutated concurrently.
pub struct KeystoreMask {
    snapshot: Option<Vec<KeyEntry>>,
    cursor: usize,
}

impl KeystoreMask {
    pub fn new() -> Self {
        KeystoreMask {
            snapshot: None,
            cursor: 0,
        }
    }

    /// Frees the current snapshot. The next call to [`KeystoreMask::next`]
    /// or [`KeystoreMask::next_batch`] will re-snapshot the keystore.
    pub fn reset(&mut self) {
        self.snapshot = None;
        self.cursor = 0;
    }

    fn ensure_snapshot(&mut self, keystore: &dyn Keystore) {
        if self.snapshot.is_none() {
            self.snapshot = Some(keystore.snapshot());
            self.cursor = 0;
        }
    }

    /// Returns the next single key, snapshotting the keystore first if
    /// needed.
    pub fn next(&mut self, keystore: &dyn Keystore) -> Option<KeyEntry> {
        self.ensure_snapshot(keystore);
        let snapshot = self.snapshot.as_ref().unwrap();
        let entry = snapshot.get(self.cursor).cloned();
        if entry.is_some() {
            self.cursor += 1;
        }
        entry
    }

    /// Draws up to [`BEACON_KEY_CAP`] keys from the cursor in one call,
    /// advancing past them. Returns an empty vec once the snapshot is
    /// exhausted.
    pub fn next_batch(&mut self, keystore: &dyn Keystore) -> Vec<KeyEntry> {
        self.ensure_snapshot(keystore);
        let snapshot = self.snapshot.as_ref().unwrap();
        let end = (self.cursor + BEACON_KEY_CAP).min(snapshot.len());
        let batch = snapshot[self.cursor..end].to_vec();
        self.cursor = end;
        batch
    }

    /// True once every key in the current snapshot has been drawn.
    pub fn is_exhausted(&self) -> bool {
        match &self.snapshot {
            Some(snap) => self.cursor >= snap.len(),
            None => false,
        }
    }
}

impl Default for KeystoreMask {
    fn default() -> Self {
        Self::new()
    }
}
