//! Random byte generation.

use rand::RngCore;

/// Upper bound on a single random-bytes request.
pub const MAX_RANDOM_BYTES: usize = 4096;

/// Clamps a requested length into `[1, MAX_RANDOM_BYTES]`.
pub fn clamp_random_len(requested: i64) -> usize {
    requested.clamp(1, MAX_RANDOM_BYTES as i64) as usize
}

/// Returns `requested` random bytes (after clamping) as lowercase hex.
pub fn random_hex(requested: i64) -> String {
    let mut bytes = vec![0u8; clamp_random_len(requested)];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
