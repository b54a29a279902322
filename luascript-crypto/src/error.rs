//! Error types for the crypto primitives.

use thiserror::Error;

/// Result type for crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed.
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// The requested digest algorithm is not supported.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),
}
