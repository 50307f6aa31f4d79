//! Error types for candidate probing

use thiserror::Error;

/// Result type for probing operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while probing candidates
#[derive(Debug, Error)]
pub enum ProbeError {
    /// No candidate completed a handshake before the overall deadline
    #[error("no viable candidate")]
    NoViableCandidate,

    /// A single attempt exceeded its per-candidate timeout
    #[error("probe attempt timed out after {millis} ms")]
    AttemptTimeout { millis: u64 },

    /// The probe run was cancelled from outside
    #[error("probe cancelled")]
    Cancelled,

    /// The candidate description carries no usable address
    #[error("candidate {id} has no usable address")]
    NoUsableAddress { id: i64 },

    /// A frame failed to decode
    #[error("malformed handshake frame: {0}")]
    MalformedFrame(String),

    /// The peer answered with material from a different handshake
    #[error("handshake mismatch: {0}")]
    HandshakeMismatch(String),

    /// The transport is closed
    #[error("transport closed")]
    TransportClosed,

    /// Underlying socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Create a malformed frame error
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }

    /// Create a handshake mismatch error
    pub fn mismatch(message: impl Into<String>) -> Self {
        Self::HandshakeMismatch(message.into())
    }
}
