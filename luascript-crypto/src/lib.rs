//! Crypto primitives exposed to LuaScript scripts.
//!
//! - Random byte generation (hex-encoded, bounded length)
//! - One-way digests (SHA-2 family)
//! - Password-based key derivation (Argon2id)
//!
//! Everything here is synchronous; the bridge moves the expensive calls onto
//! blocking worker threads and reports results through callbacks.

mod digest;
mod error;
mod key;
mod random;

pub use digest::{digest_hex, DigestAlgorithm};
pub use error::{CryptoError, CryptoResult};
pub use key::{derive_key, DerivedKey, KdfParams, KEY_SIZE, MIN_SALT_SIZE};
pub use random::{clamp_random_len, random_hex, MAX_RANDOM_BYTES};
