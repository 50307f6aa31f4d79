//! Common infrastructure for the peercall stack.
//!
//! This crate provides the pieces every other peercall crate leans on:
//! the serial execution context that call sessions are bound to, and the
//! logging setup shared by binaries and integration tests.

// Error handling
pub mod error;

// Serial execution contexts
pub mod executor;

// Logging configuration and setup
pub mod logging;

// Public exports
pub use error::{Error, Result};
pub use executor::{ManualExecutor, SerialExecutor, ThreadSerialExecutor};
pub use logging::{parse_log_level, setup_logging, LoggingConfig};

/// Re-export of common types and functions
pub mod prelude {
    pub use super::{
        Error, LoggingConfig, ManualExecutor, Result, SerialExecutor, ThreadSerialExecutor,
    };
}
