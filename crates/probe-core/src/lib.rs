//! Connection-candidate probing for peercall sessions.
//!
//! The signaling layer hands a session an ordered list of reachable
//! endpoints. This crate attempts a lightweight handshake against every
//! viable candidate concurrently, reports the first valid success, and
//! cancels the rest: a dead primary never delays a live alternative. When a
//! proxy is configured, every attempt is tunneled through it instead of
//! connecting directly.

// Error handling
pub mod error;

// Signaled endpoint descriptions
pub mod candidate;

// Probe handshake wire format
pub mod handshake;

// Transport seam and UDP implementation
pub mod transport;

// Concurrent prober
pub mod prober;

// Scripted transports for dependent crates' tests
#[cfg(any(test, feature = "testing"))]
pub mod mock;

// Public exports
pub use candidate::{ConnectionCandidate, ProxyConfig};
pub use error::{ProbeError, Result};
pub use handshake::{ProbePing, ProbePong, HANDSHAKE_MAGIC};
pub use prober::{CandidateProber, ProbeWin, ProberConfig};
pub use transport::{ProbeTransport, TransportHandle, UdpProbeTransport};

/// Re-export of common types and functions
pub mod prelude {
    pub use super::{
        CandidateProber, ConnectionCandidate, ProbeError, ProbeTransport, ProbeWin, ProberConfig,
        ProxyConfig, Result, TransportHandle,
    };
}
