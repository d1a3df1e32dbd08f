// src/key.rs

//! Fully qualified key encoding: `table || SEP || key`.
//!
//! `SEP` is fixed and chosen so it cannot appear in either component (both
//! `table` and `key` are application-supplied ASCII identifiers in practice,
//! but we pick a byte sequence that would be unusual even in arbitrary UTF-8).

use crc::{CRC_16_USB, Crc};

/// Two-byte delimiter between `table` and `key` in the canonical form.
pub const SEP: &str = "\u{0}\u{0}";

const CRC16_ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_USB);

/// Builds the canonical `table || SEP || key` form used as the backend key.
pub fn fully_qualified_key(table: &str, key: &str) -> String {
    let mut fq = String::with_capacity(table.len() + SEP.len() + key.len());
    fq.push_str(table);
    fq.push_str(SEP);
    fq.push_str(key);
    fq
}

/// Maps a fully qualified key to a vbucket in `[0, vbuckets)` using a stable,
/// non-cryptographic checksum.
pub fn vbucket_for_key(fqkey: &str, vbuckets: usize) -> u16 {
    debug_assert!(vbuckets.is_power_of_two());
    let checksum = CRC16_ALGO.checksum(fqkey.as_bytes());
    checksum % (vbuckets as u16)
}
