//! Encoding of `(payload, score)` pairs as a single stored value.
//!
//! A stored value is the payload bytes followed by the 8-byte little-endian
//! release score. Appending rather than prepending keeps the payload at a
//! fixed offset so it can be borrowed straight out of the stored bytes.
//! Little-endian is an arbitrary but fixed choice; changing it would break
//! every value already on disk.

use thiserror::Error;

/// Width of the score suffix in bytes.
const SCORE_LEN: usize = 8;

/// Error returned when a stored value is too short to carry a score suffix.
///
/// This indicates corruption: every value written by this crate ends in an
/// 8-byte score.
#[derive(Debug, Clone, Error)]
#[error("stored value too short for score suffix: {len} bytes, need at least {SCORE_LEN}")]
pub struct TruncatedValue {
    len: usize,
}

/// Encodes a payload and its release score into a single value.
pub fn encode(payload: &[u8], score: i64) -> Vec<u8> {
    let mut value = Vec::with_capacity(payload.len() + SCORE_LEN);
    value.extend_from_slice(payload);
    value.extend_from_slice(&(score as u64).to_le_bytes());
    value
}

/// Splits a stored value back into its score and payload.
///
/// The payload is borrowed from the input. Fails if the input is shorter
/// than the score suffix.
pub fn decode(value: &[u8]) -> Result<(i64, &[u8]), TruncatedValue> {
    if value.len() < SCORE_LEN {
        return Err(TruncatedValue { len: value.len() });
    }
    let (payload, suffix) = value.split_at(value.len() - SCORE_LEN);
    let mut raw = [0u8; SCORE_LEN];
    raw.copy_from_slice(suffix);
    Ok((u64::from_le_bytes(raw) as i64, payload))
}
