//! Recognizer (C6): scans a paired entry section against the local
//! keystore and reports matches to an observer.

use crate::constants::BEACON_MEMBER_SIZE;
use crate::hash::Hasher;
use crate::keystore::{KeyEntry, Keystore};

/// Receives recognized peers as the listener processes completed pairs.
///
/// A trait object rather than a bare function pointer, so a caller can carry
/// whatever state it needs (a channel sender, a UI handle, a counter)
/// without the recognizer knowing about it.
pub trait BeaconObserver: Send {
    fn on_beacon(&mut self, matched: &KeyEntry, challenge: u64);
}

/// An observer that forwards matches onto an async channel, for callers that
/// want to consume recognitions outside the listener's task.
pub struct MpscBeaconObserver {
    sender: tokio::sync::mpsc::UnboundedSender<(KeyEntry, u64)>,
}

impl MpscBeaconObserver {
    pub fn new(sender: tokio::sync::mpsc::UnboundedSender<(KeyEntry, u64)>) -> Self {
        MpscBeaconObserver { sender }
    }
}

impl BeaconObserver for MpscBeaconObserver {
    fn on_beacon(&mut self, matched: &KeyEntry, challenge: u64) {
        // A full or dropped receiver means nobody is listening anymore;
        // that's the caller's business, not ours.
        let _ = self.sender.send((matched.clone(), challenge));
    }
}

/// Scans every entry in `entries` (a flat run of `BEACON_MEMBER_SIZE`-byte
/// blinded values, as produced by a completed [`crate::tracker::PairTracker`]
/// pair) against `keystore`, invoking `observer` for each match.
///
/// Returns the number of matches found.
pub fn scan(
    entries: &[u8],
    challenge: u64,
    keystore: &dyn Keystore,
    hasher: &dyn Hasher,
    observer: &mut dyn BeaconObserver,
) -> usize {
    let mut matches = 0;
    for chunk in entries.chunks_exact(BEACON_MEMBER_SIZE) {
        let entry: [u8; BEACON_MEMBER_SIZE] = chunk
            .try_into()
            .expect("chunks_exact(BEACON_MEMBER_SIZE) yields exactly-sized chunks");
        if let Some(matched) = keystore.accepted_challenge(&entry, challenge, hasher) {
            observer.on_beacon(&matched, challenge);
            matches += 1;
        }
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blind::blind;
    use crate::hash::Blake3Hasher;
    use crate::keystore::{MemoryKeystore, PublicKey};

    struct RecordingObserver {
        seen: Vec<(String, u64)>,
    }

    impl BeaconObserver for RecordingObserver {
        fn on_beacon(&mut self, matched: &KeyEntry, challenge: u64) {
            self.seen
                .push((matched.tag.clone().unwrap_or_default(), challenge));
        }
    }

    fn key(byte: u8) -> PublicKey {
        PublicKey([byte; BEACON_MEMBER_SIZE])
    }

    #[test]
    fn scan_finds_known_key_among_foreign_entries() {
        let ks = MemoryKeystore::new();
        ks.insert(key(1), Some("alice".into()));
        let h = Blake3Hasher;

        let mut entries = Vec::new();
        entries.extend_from_slice(&blind(&h, 50, &key(9).0)); // unknown
        entries.extend_from_slice(&blind(&h, 50, &key(1).0)); // alice

        let mut observer = RecordingObserver { seen: Vec::new() };
        let matches = scan(&entries, 50, &ks, &h, &mut observer);

        assert_eq!(matches, 1);
        assert_eq!(observer.seen, vec![("alice".to_string(), 50)]);
    }

    #[test]
    fn scan_with_no_local_keys_finds_nothing() {
        let ks = MemoryKeystore::new();
        let h = Blake3Hasher;
        let entries = blind(&h, 1, &key(1).0);
        let mut observer = RecordingObserver { seen: Vec::new() };
        assert_eq!(scan(&entries, 1, &ks, &h, &mut observer), 0);
        assert!(observer.seen.is_empty());
    }

    #[test]
    fn mpsc_observer_forwards_matches() {
        let ks = MemoryKeystore::new();
        ks.insert(key(2), Some("bob".into()));
        let h = Blake3Hasher;
        let entries = blind(&h, 5, &key(2).0);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut observer = MpscBeaconObserver::new(tx);
        assert_eq!(scan(&entries, 5, &ks, &h, &mut observer), 1);

        let (matched, challenge) = rx.try_recv().unwrap();
        assert_eq!(matched.pubkey, key(2));
        assert_eq!(challenge, 5);
    }
}
