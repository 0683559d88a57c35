//! The crate's cryptographic hash abstraction (C9).
//!
//! The wire format needs a 256-bit extensible-output hash that can be
//! truncated to either 8 bytes (checksums) or [`BEACON_MEMBER_SIZE`] bytes
//! (blinded entries). [`Hasher`] keeps the rest of the crate from hard-coding
//! a concrete hash library; [`Blake3Hasher`] is the reference implementation.

use crate::constants::BEACON_MEMBER_SIZE;

/// Abstraction over an extensible-output hash primitive.
///
/// Implementors hash the concatenation of every byte slice passed to
/// [`Hasher::digest`] and return the first `out_len` bytes of the output
/// stream. `out_len` is always either 8 (checksums) or
/// [`BEACON_MEMBER_SIZE`] (blinded entries) in this crate, but the trait
/// does not bake that assumption in.
pub trait Hasher: Send + Sync {
    fn digest(&self, parts: &[&[u8]], out_len: usize) -> Vec<u8>;
}

/// BLAKE3-backed [`Hasher`]. BLAKE3 is a true extensible-output function, so
/// truncation to an arbitrary `out_len` is just reading fewer bytes from the
/// output stream rather than discarding bits of a fixed-width digest.
#[derive(Debug, Default, Clone, Copy)]
pub struct Blake3Hasher;

impl Hasher for Blake3Hasher {
    fn digest(&self, parts: &[&[u8]], out_len: usize) -> Vec<u8> {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        let mut out = vec![0u8; out_len];
        hasher.finalize_xof().fill(&mut out);
        out
    }
}

/// Convenience: hash `parts` and write exactly [`BEACON_MEMBER_SIZE`] bytes
/// of output into `dest`.
pub fn digest_into_member(hasher: &dyn Hasher, parts: &[&[u8]], dest: &mut [u8; BEACON_MEMBER_SIZE]) {
    let out = hasher.digest(parts, BEACON_MEMBER_SIZE);
    dest.copy_from_slice(&out);
}

/// Convenience: hash `parts` and write exactly 8 bytes of output into `dest`.
pub fn digest_into_checksum(hasher: &dyn Hasher, parts: &[&[u8]], dest: &mut [u8; 8]) {
    let out = hasher.digest(parts, 8);
    dest.copy_from_slice(&out);
}
