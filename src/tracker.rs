//! Pair tracker (C5): correlates incoming packets by source address into
//! pairs, enforcing pairing, ordering, timing, and structural invariants.

use std::collections::HashMap;
use std::time::Instant;

use tracing::{debug, warn};

use crate::codec::decode_packet;
use crate::constants::{
    BEACON_MEMBER_SIZE, BEACON_MIN_PAIR_DELTA_MS, DEFAULT_PENDING_MAP_CAP, NULL_KEY,
};
use crate::hash::Hasher;

/// A pending, not-yet-paired slot-0 packet for one source address.
struct PendingEntry {
    challenge: u64,
    checksum: [u8; 8],
    entries: Vec<u8>,
    received_at: Instant,
}

/// Outcome of feeding one datagram into the tracker.
#[derive(Debug, PartialEq, Eq)]
pub enum TrackerEvent {
    /// Structurally invalid; dropped before any pairing logic ran.
    StructuralReject,
    /// This packet became (or stayed) a pending slot 0; no pair yet.
    Pending,
    /// A pair failed hard validation (length mismatch or bad checksum); both
    /// slots were dropped.
    HardReject,
    /// A pair failed the challenge/timing check; the second packet was
    /// shifted into slot 0 and the tracker keeps waiting.
    SlotShifted,
    /// A valid pair completed. `challenge` is P0's challenge; `entries` is
    /// P0's entry section (raw blinded bytes, `BEACON_MEMBER_SIZE` each).
    Paired { challenge: u64, entries: Vec<u8> },
}

/// Listener-side state: one pending entry per source address, capped at
/// `cap` entries with oldest-first eviction.
pub struct PairTracker {
    pending: HashMap<String, PendingEntry>,
    cap: usize,
}

impl PairTracker {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_PENDING_MAP_CAP)
    }

    pub fn with_capacity(cap: usize) -> Self {
        PairTracker {
            pending: HashMap::new(),
            cap,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn has_pending(&self, source: &str) -> bool {
        self.pending.contains_key(source)
    }

    /// Feeds one received datagram from `source` into the tracker.
    pub fn receive(&mut self, source: &str, buf: &[u8], hasher: &dyn Hasher) -> TrackerEvent {
        let decoded = match decode_packet(buf) {
            Ok(d) => d,
            Err(e) => {
                debug!(%source, error = %e, "beacon structural reject");
                return TrackerEvent::StructuralReject;
            }
        };

        let now = Instant::now();

        let Some(prior) = self.pending.remove(source) else {
            self.evict_if_full();
            self.pending.insert(
                source.to_string(),
                PendingEntry {
                    challenge: decoded.challenge,
                    checksum: decoded.checksum,
                    entries: decoded.entries.to_vec(),
                    received_at: now,
                },
            );
            return TrackerEvent::Pending;
        };

        // length-match
        if decoded.entries.len() != prior.entries.len() {
            debug!(%source, "beacon pair reject: length mismatch");
            return TrackerEvent::HardReject;
        }

        // entry-length is a positive multiple of BEACON_MEMBER_SIZE — already
        // guaranteed by decode_packet for both slots, nothing further to
        // check here.
        debug_assert_eq!(decoded.entries.len() % BEACON_MEMBER_SIZE, 0);

        // challenge equality c1 == c0 + 1, strict (no wraparound)
        let challenge_ok = prior
            .challenge
            .checked_add(1)
            .map(|expected| expected == decoded.challenge)
            .unwrap_or(false);

        // elapsed time Δt >= BEACON_MIN_PAIR_DELTA_MS
        let elapsed_ms = now.saturating_duration_since(prior.received_at).as_millis() as u64;
        let timing_ok = elapsed_ms >= BEACON_MIN_PAIR_DELTA_MS;

        if !challenge_ok || !timing_ok {
            debug!(
                %source,
                challenge_ok,
                timing_ok,
                elapsed_ms,
                "beacon pair reject: challenge/timing mismatch, shifting slot"
            );
            self.pending.insert(
                source.to_string(),
                PendingEntry {
                    challenge: decoded.challenge,
                    checksum: decoded.checksum,
                    entries: decoded.entries.to_vec(),
                    received_at: now,
                },
            );
            return TrackerEvent::SlotShifted;
        }

        // checksum of slot 0
        let prior_challenge_bytes = prior.challenge.to_be_bytes();
        let mut expected = [0u8; 8];
        crate::hash::digest_into_checksum(
            hasher,
            &[&prior_challenge_bytes, &prior.entries],
            &mut expected,
        );
        if expected != prior.checksum {
            warn!(%source, "first beacon checksum fail");
            return TrackerEvent::HardReject;
        }

        if !decoded.verify_checksum(hasher, &decoded.challenge.to_be_bytes()) {
            warn!(%source, "second beacon checksum fail");
            return TrackerEvent::HardReject;
        }

        TrackerEvent::Paired {
            challenge: prior.challenge,
            entries: prior.entries,
        }
    }

    fn evict_if_full(&mut self) {
        if self.pending.len() < self.cap {
            return;
        }
        if let Some(oldest_source) = self
            .pending
            .iter()
            .min_by_key(|(_, entry)| entry.received_at)
            .map(|(source, _)| source.clone())
        {
            warn!(source = %oldest_source, "pending pair map full, evicting oldest entry");
            self.pending.remove(&oldest_source);
        }
    }
}

impl Default for PairTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A null-key discovery hint, for the "structurally valid pair, zero
/// entries" edge case. Not reachable with the current
/// `BEACON_MIN_BYTES` floor (see that section's note), kept so the
/// invariant holds if a future wire revision relaxes it.
pub fn null_key_hint() -> [u8; BEACON_MEMBER_SIZE] {
    NULL_KEY
}
