//! Error types for the session engine

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur in a call session
#[derive(Debug, Error)]
pub enum SessionError {
    /// Cryptographic input failed validation
    #[error("crypto error: {0}")]
    Crypto(#[from] peercall_crypto_core::CryptoError),

    /// Candidate probing failed
    #[error("probe error: {0}")]
    Probe(#[from] peercall_probe_core::ProbeError),

    /// An inbound packet failed to parse
    #[error("malformed packet: {message}")]
    MalformedPacket { message: String },

    /// Operation is not valid in the current state
    #[error("invalid state: {message}")]
    InvalidState { message: String },
}

impl SessionError {
    /// Create a malformed packet error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedPacket {
            message: message.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }
}
