//! Wire codec (C1): pack/unpack fixed-layout beacon packets.
//!
//! ```text
//! offset 0  : 8 bytes  checksum    (truncated hash of bytes [8 .. end])
//! offset 8  : 8 bytes  challenge   (big-endian u64)
//! offset 16 : N × BEACON_MEMBER_SIZE bytes of blinded entries
//! ```

use crate::constants::{BEACON_MAX_BYTES, BEACON_MEMBER_SIZE, BEACON_MIN_BYTES};
use crate::hash::{digest_into_checksum, Hasher};

/// A structurally-valid beacon packet, borrowed from the buffer it was
/// decoded out of (no copying on the receive hot path).
#[derive(Debug, Clone, Copy)]
pub struct DecodedPacket<'a> {
    pub checksum: [u8; 8],
    pub challenge: u64,
    pub entries: &'a [u8],
}

impl<'a> DecodedPacket<'a> {
    /// Number of `BEACON_MEMBER_SIZE`-byte entries in this packet.
    pub fn entry_count(&self) -> usize {
        self.entries.len() / BEACON_MEMBER_SIZE
    }

    pub fn entry(&self, index: usize) -> Option<&'a [u8]> {
        let start = index * BEACON_MEMBER_SIZE;
        let end = start + BEACON_MEMBER_SIZE;
        self.entries.get(start..end)
    }

    pub fn entries_iter(&self) -> impl Iterator<Item = &'a [u8]> {
        self.entries.chunks_exact(BEACON_MEMBER_SIZE)
    }

    /// Verifies this packet's checksum against the supplied hasher: the
    /// checksum covers everything from the challenge onward.
    pub fn verify_checksum(&self, hasher: &dyn Hasher, challenge_bytes: &[u8; 8]) -> bool {
        let mut expected = [0u8; 8];
        digest_into_checksum(hasher, &[challenge_bytes, self.entries], &mut expected);
        expected == self.checksum
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("packet too short: {len} bytes (minimum {min})")]
    TooShort { len: usize, min: usize },
    #[error("packet too long: {len} bytes (maximum {max})")]
    TooLong { len: usize, max: usize },
    #[error("entry section length {entries_len} is not a positive multiple of {member_size}")]
    Misaligned {
        entries_len: usize,
        member_size: usize,
    },
}

/// Structurally validates and decodes a raw datagram. Does **not** verify
/// the checksum — that is deferred by the pair tracker until a pair exists
/// (deferred until a pair exists).
pub fn decode_packet(buf: &[u8]) -> Result<DecodedPacket<'_>, CodecError> {
    if buf.len() < BEACON_MIN_BYTES {
        return Err(CodecError::TooShort {
            len: buf.len(),
            min: BEACON_MIN_BYTES,
        });
    }
    if buf.len() > BEACON_MAX_BYTES {
        return Err(CodecError::TooLong {
            len: buf.len(),
            max: BEACON_MAX_BYTES,
        });
    }

    let entries = &buf[16..];
    if entries.is_empty() || entries.len() % BEACON_MEMBER_SIZE != 0 {
        return Err(CodecError::Misaligned {
            entries_len: entries.len(),
            member_size: BEACON_MEMBER_SIZE,
        });
    }

    let mut checksum = [0u8; 8];
    checksum.copy_from_slice(&buf[0..8]);
    let mut challenge_bytes = [0u8; 8];
    challenge_bytes.copy_from_slice(&buf[8..16]);
    let challenge = u64::from_be_bytes(challenge_bytes);

    Ok(DecodedPacket {
        checksum,
        challenge,
        entries,
    })
}

/// Encodes a packet from its challenge and entry bytes, computing and
/// writing the checksum. `entries` must already be a multiple of
/// `BEACON_MEMBER_SIZE` and non-empty; this is an invariant of the builder,
/// not re-validated here.
pub fn encode_packet(challenge: u64, entries: &[u8], hasher: &dyn Hasher) -> Vec<u8> {
    debug_assert!(!entries.is_empty());
    debug_assert_eq!(entries.len() % BEACON_MEMBER_SIZE, 0);

    let challenge_bytes = challenge.to_be_bytes();
    let mut checksum = [0u8; 8];
    digest_into_checksum(hasher, &[&challenge_bytes, entries], &mut checksum);

    let mut buf = Vec::with_capacity(16 + entries.len());
    buf.extend_from_slice(&checksum);
    buf.extend_from_slice(&challenge_bytes);
    buf.extend_from_slice(entries);
    buf
}
