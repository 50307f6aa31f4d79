//! Error types for the crypto crate

use thiserror::Error;

/// Result type for crypto operations
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors that can occur in cryptographic operations.
///
/// Malformed input lengths fail fast; nothing in this crate silently
/// truncates or pads. Counter reuse is deliberately absent here: it is a
/// caller contract violation and panics in [`crate::CounterLedger`] instead
/// of surfacing as a recoverable error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Control frame length is not a whole number of cipher blocks
    #[error("frame length {len} is not a multiple of the {block}-byte block size")]
    InvalidFrameLength { len: usize, block: usize },

    /// Key or IV material has the wrong length
    #[error("key material has length {len}, expected {expected}")]
    InvalidKeyLength { len: usize, expected: usize },

    /// Digest too short for the requested number of fingerprint glyphs
    #[error("digest of {len} bytes cannot produce {glyphs} glyphs ({needed} bytes needed)")]
    InvalidDigestLength {
        len: usize,
        needed: usize,
        glyphs: usize,
    },

    /// Derived state blob failed validation at the deserialization boundary
    #[error("malformed derived state: {0}")]
    MalformedDerivedState(String),

    /// Derived state blob was produced by an unknown schedule version
    #[error("unsupported derived state version {0}")]
    UnsupportedStateVersion(u8),
}
