//! Blinding function (C2).
//!
//! `blind(challenge, pubkey) = truncate(hash(challenge_bytes ∥ pubkey), N)`.
//! Used by the emitter to construct entries and by the recognizer to test
//! each locally-known key against a received pair.

use crate::constants::BEACON_MEMBER_SIZE;
use crate::hash::{digest_into_member, Hasher};

/// Blinds `pubkey` under `challenge`, producing a [`BEACON_MEMBER_SIZE`]-byte
/// entry that an observer who does not already know `pubkey` cannot reverse.
pub fn blind(
    hasher: &dyn Hasher,
    challenge: u64,
    pubkey: &[u8; BEACON_MEMBER_SIZE],
) -> [u8; BEACON_MEMBER_SIZE] {
    let challenge_bytes = challenge.to_be_bytes();
    let mut entry = [0u8; BEACON_MEMBER_SIZE];
    digest_into_member(hasher, &[&challenge_bytes, pubkey], &mut entry);
    entry
}
