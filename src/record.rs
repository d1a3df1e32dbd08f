// src/record.rs

//! Backend-visible record shape: payload, expiry, CAS token, and the
//! write-timestamp flags field used for inter-replica reconciliation.

use std::time::{SystemTime, UNIX_EPOCH};

/// The payload written in place of a deleted key. An empty payload is the
/// tombstone sentinel (matches the `TOMBSTONE = ""` constant of the backend
/// this client was designed against).
pub const TOMBSTONE_PAYLOAD: &[u8] = b"";

/// `memcached`-style absolute-time ceiling: deltas larger than this many
/// seconds are interpreted as absolute Unix timestamps by the backend. Used
/// to force immediate expiry when the caller passes `expiry == 0`.
pub const EXPIRATION_MAXDELTA: u32 = 60 * 60 * 24 * 30;

/// Returns `true` if `data` is the tombstone sentinel.
pub fn is_tombstone(data: &[u8]) -> bool {
    data.is_empty()
}

/// Converts a caller-supplied relative expiry (seconds, `0` meaning "expire
/// immediately") into the value actually sent to the backend.
pub fn backend_expiration(expiry_seconds: i64) -> u32 {
    if expiry_seconds > 0 {
        expiry_seconds as u32
    } else {
        EXPIRATION_MAXDELTA + 1
    }
}

/// The lower 32 bits of milliseconds since the Unix epoch, used as the
/// `flags` field on every write for cross-replica reconciliation hints.
pub fn write_timestamp_flags() -> u32 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let millis = now.as_millis();
    (millis & 0xFFFF_FFFF) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_tombstone() {
        assert!(is_tombstone(TOMBSTONE_PAYLOAD));
        assert!(is_tombstone(b""));
        assert!(!is_tombstone(b"v"));
    }

    #[test]
    fn zero_expiry_becomes_maxdelta_plus_one() {
        assert_eq!(backend_expiration(0), EXPIRATION_MAXDELTA + 1);
    }

    #[test]
    fn positive_expiry_is_passed_through() {
        assert_eq!(backend_expiration(60), 60);
    }
}
