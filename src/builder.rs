//! Beacon builder (C4): constructs packet pairs (A, B) advertising the next
//! batch of local keys.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::blind::blind;
use crate::codec::encode_packet;
use crate::constants::BEACON_MEMBER_SIZE;
use crate::hash::Hasher;
use crate::keystore::{KeyEntry, Keystore};
use crate::mask::KeystoreMask;

/// One built packet pair, plus the tags of the keys it advertises (for
/// logging/diagnostics — not part of the wire format).
pub struct BeaconPair {
    pub packet_a: Vec<u8>,
    pub packet_b: Vec<u8>,
    pub challenge: u64,
    pub entries: Vec<KeyEntry>,
}

/// Draws the next batch from `mask` and builds a packet pair over it.
///
/// Returns `None` when the batch is empty (the mask's snapshot is
/// exhausted) — the caller is expected to reset the mask and sleep before
/// starting a new cycle.
pub fn build_pair(
    mask: &mut KeystoreMask,
    keystore: &dyn Keystore,
    hasher: &dyn Hasher,
) -> Option<BeaconPair> {
    let batch = mask.next_batch(keystore);
    if batch.is_empty() {
        return None;
    }

    // u64::MAX would make challenge+1 overflow and produce an unpairable
    // broadcast (the listener requires strict c+1, no wraparound); redraw
    // rather than emit a pair that can never validate.
    let (challenge, challenge_next) = loop {
        let c = draw_challenge();
        if let Some(next) = c.checked_add(1) {
            break (c, next);
        }
    };

    let mut entries_a = Vec::with_capacity(batch.len() * BEACON_MEMBER_SIZE);
    let mut entries_b = Vec::with_capacity(batch.len() * BEACON_MEMBER_SIZE);
    for entry in &batch {
        entries_a.extend_from_slice(&blind(hasher, challenge, entry.pubkey.as_bytes()));
        entries_b.extend_from_slice(&blind(hasher, challenge_next, entry.pubkey.as_bytes()));
    }

    let packet_a = encode_packet(challenge, &entries_a, hasher);
    let packet_b = encode_packet(challenge_next, &entries_b, hasher);

    Some(BeaconPair {
        packet_a,
        packet_b,
        challenge,
        entries: batch,
    })
}

/// Draws a fresh challenge from a cryptographically secure RNG. Predictable
/// challenges would let an attacker precompute expected entries for a
/// target key.
fn draw_challenge() -> u64 {
    OsRng.next_u64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_packet;
    use crate::hash::Blake3Hasher;
    use crate::keystore::{MemoryKeystore, PublicKey};

    fn key(byte: u8) -> PublicKey {
        PublicKey([byte; BEACON_MEMBER_SIZE])
    }

    #[test]
    fn empty_keystore_yields_no_pair() {
        let ks = MemoryKeystore::new();
        let mut mask = KeystoreMask::new();
        assert!(build_pair(&mut mask, &ks, &Blake3Hasher).is_none());
    }

    #[test]
    fn pair_challenges_are_consecutive() {
        let ks = MemoryKeystore::new();
        ks.insert(key(1), None);
        let mut mask = KeystoreMask::new();
        let pair = build_pair(&mut mask, &ks, &Blake3Hasher).unwrap();
        let a = decode_packet(&pair.packet_a).unwrap();
        let b = decode_packet(&pair.packet_b).unwrap();
        assert_eq!(b.challenge, a.challenge + 1);
        assert_eq!(pair.challenge, a.challenge);
    }

    #[test]
    fn pair_entries_blind_the_same_keys_differently() {
        let ks = MemoryKeystore::new();
        ks.insert(key(1), None);
        ks.insert(key(2), None);
        let mut mask = KeystoreMask::new();
        let pair = build_pair(&mut mask, &ks, &Blake3Hasher).unwrap();
        let a = decode_packet(&pair.packet_a).unwrap();
        let b = decode_packet(&pair.packet_b).unwrap();
        assert_eq!(a.entry_count(), 2);
        assert_eq!(b.entry_count(), 2);
        // Entries differ entry-for-entry (different challenge)...
        for (ea, eb) in a.entries_iter().zip(b.entries_iter()) {
            assert_ne!(ea, eb);
        }
        // ...but both packets' checksums validate independently.
        assert!(a.verify_checksum(&Blake3Hasher, &a.challenge.to_be_bytes()));
        assert!(b.verify_checksum(&Blake3Hasher, &b.challenge.to_be_bytes()));
    }

    #[test]
    fn exhausted_mask_yields_no_further_pairs() {
        let ks = MemoryKeystore::new();
        ks.insert(key(1), None);
        let mut mask = KeystoreMask::new();
        assert!(build_pair(&mut mask, &ks, &Blake3Hasher).is_some());
        assert!(build_pair(&mut mask, &ks, &Blake3Hasher).is_none());
    }
}
