//! Error types for the infrastructure crate

use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in infrastructure components
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The executor has shut down and no longer accepts work
    #[error("Executor is shut down")]
    ExecutorShutDown,
}
