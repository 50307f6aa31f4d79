//! Error types for audio device handling

use thiserror::Error;

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Errors that can occur while working with audio devices
#[derive(Debug, Error)]
pub enum AudioError {
    /// The host reported no device in the requested direction
    #[error("no {direction} device available")]
    NoDevice { direction: &'static str },

    /// The backend failed to enumerate devices
    #[error("device enumeration failed: {message}")]
    Enumeration { message: String },
}

impl AudioError {
    /// Create an enumeration error
    pub fn enumeration(message: impl Into<String>) -> Self {
        Self::Enumeration {
            message: message.into(),
        }
    }
}
