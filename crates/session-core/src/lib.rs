//! Peer-to-peer encrypted call session engine.
//!
//! The signaling layer constructs a [`CallSession`] with a shared secret,
//! an ordered candidate list and configuration. The session drives the
//! candidate prober, derives directional packet encryption on success,
//! tracks connection health across network changes, and reports telemetry
//! when stopped. All state transitions are linearized on a caller-supplied
//! serial execution context; observers consume them as ordered
//! [`CallEvent`]s.

// Error handling
pub mod error;

// Shared value and event types
pub mod types;

// Packet sealing between the crypto layer and the transport
pub mod frames;

// Traffic accounting
pub mod telemetry;

// Session construction inputs
pub mod config;

// The call session state machine
pub mod session;

// Public exports
pub use config::CallConfig;
pub use error::{Result, SessionError};
pub use session::{max_supported_layer, min_supported_layer, version_string, CallSession};
pub use telemetry::TelemetryCollector;
pub use types::{
    CallEvent, CallFailure, CallState, CallStats, DataSavingPolicy, NetworkClass, NetworkType,
};

/// Re-export of common types and functions
pub mod prelude {
    pub use super::{
        CallConfig, CallEvent, CallFailure, CallSession, CallState, CallStats, DataSavingPolicy,
        NetworkClass, NetworkType, Result, SessionError,
    };
    pub use peercall_infra_common::SerialExecutor;
    pub use peercall_probe_core::{ConnectionCandidate, ProxyConfig};
}
