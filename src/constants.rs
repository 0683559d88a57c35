//! Wire-format constants for the beacon protocol.
//!
//! Every multi-byte integer on the wire is big-endian; this module is the
//! single place that knows the packet layout's sizes and offsets.

/// UDP port beacons are sent to and received on.
pub const BEACON_PORT: u16 = 6680;

/// Length in bytes of a blinded entry, and of a raw public key.
pub const BEACON_MEMBER_SIZE: usize = 32;

/// Maximum packet size (MTU cap). A packet larger than this is rejected.
pub const BEACON_MAX_BYTES: usize = 9000;

/// Minimum packet size: 8-byte checksum + 8-byte challenge + one entry.
pub const BEACON_MIN_BYTES: usize = 16 + BEACON_MEMBER_SIZE;

/// Minimum time, in milliseconds, that must elapse between the first and
/// second packet of a pair for the pair to be considered legitimate.
pub const BEACON_MIN_PAIR_DELTA_MS: u64 = 980;

/// Nominal spacing, in seconds, the emitter waits between sending packet A
/// and packet B of a pair.
pub const BEACON_PAIR_INTERVAL_S: u64 = 1;

/// Maximum number of key entries that fit in one packet without exceeding
/// [`BEACON_MAX_BYTES`].
pub const BEACON_KEY_CAP: usize = (BEACON_MAX_BYTES - 16) / BEACON_MEMBER_SIZE;

/// A public key that means "no key" — used to report presence-only beacons.
pub const NULL_KEY: [u8; BEACON_MEMBER_SIZE] = [0u8; BEACON_MEMBER_SIZE];

/// Default cap on the listener's pending-pair map before LRU eviction kicks
/// in (see DESIGN.md's resolution of the pending-map-growth open question).
pub const DEFAULT_PENDING_MAP_CAP: usize = 4096;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_bytes_matches_layout() {
        assert_eq!(BEACON_MIN_BYTES, 48);
    }

    #[test]
    fn key_cap_fits_under_max_bytes() {
        assert!(16 + BEACON_KEY_CAP * BEACON_MEMBER_SIZE <= BEACON_MAX_BYTES);
    }
}
