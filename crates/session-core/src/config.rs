//! Session construction inputs.
//!
//! One `CallConfig` describes one call attempt. The signaling layer fills
//! it from the negotiated call parameters; everything crypto-shaped stays
//! as opaque bytes here and is validated when the session is built.

use std::sync::Arc;
use std::time::Duration;

use peercall_audio_core::AudioDeviceDirectory;
use peercall_infra_common::SerialExecutor;
use peercall_probe_core::{ConnectionCandidate, ProbeTransport, ProxyConfig, UdpProbeTransport};

use crate::types::{DataSavingPolicy, NetworkType};

/// Inputs for one call attempt.
#[derive(Clone)]
pub struct CallConfig {
    /// Serial execution context the session is bound to
    pub executor: Arc<dyn SerialExecutor>,
    /// Optional proxy every probe attempt is tunneled through
    pub proxy: Option<ProxyConfig>,
    /// Network the host is on at construction time
    pub network_type: NetworkType,
    /// Data saving policy
    pub data_saving: DataSavingPolicy,
    /// Opaque key-rotation bytes from a prior call, empty for a first call
    pub derived_state: Vec<u8>,
    /// Raw shared secret from the outer key exchange
    pub shared_secret: Vec<u8>,
    /// Whether this side initiated the call
    pub is_outgoing: bool,
    /// Primary connection candidate
    pub primary: ConnectionCandidate,
    /// Alternative candidates, in preference order
    pub alternatives: Vec<ConnectionCandidate>,
    /// Protocol layer ceiling negotiated with the peer during signaling
    pub max_layer: i32,
    /// Whether direct peer-to-peer candidates may be used
    pub allow_p2p: bool,
    /// Destination the caller will write the debug log to; the session
    /// only records it in the report header
    pub log_path: String,
    /// Budget for a single candidate handshake
    pub per_attempt_timeout: Duration,
    /// Budget for one whole probe run
    pub overall_probe_timeout: Duration,
    /// Consecutive failed re-probe rounds tolerated before failing
    pub max_reconnect_attempts: u32,
    /// Minimum connected time before `need_rate` reports true
    pub min_rated_duration: Duration,
    /// Transport strategy; swapped for a scripted one in tests
    pub transport: Arc<dyn ProbeTransport>,
    /// Host audio device directory the call binds its devices through
    pub audio_directory: Option<Arc<AudioDeviceDirectory>>,
}

impl CallConfig {
    /// Configuration with production defaults.
    pub fn new(
        executor: Arc<dyn SerialExecutor>,
        shared_secret: Vec<u8>,
        is_outgoing: bool,
        primary: ConnectionCandidate,
    ) -> Self {
        Self {
            executor,
            proxy: None,
            network_type: NetworkType::Other,
            data_saving: DataSavingPolicy::Never,
            derived_state: Vec::new(),
            shared_secret,
            is_outgoing,
            primary,
            alternatives: Vec::new(),
            max_layer: crate::session::max_supported_layer(),
            allow_p2p: true,
            log_path: String::new(),
            per_attempt_timeout: Duration::from_secs(5),
            overall_probe_timeout: Duration::from_secs(12),
            max_reconnect_attempts: 5,
            min_rated_duration: Duration::from_secs(10),
            transport: Arc::new(UdpProbeTransport::new()),
            audio_directory: None,
        }
    }

    /// Add alternative candidates
    pub fn with_alternatives(mut self, alternatives: Vec<ConnectionCandidate>) -> Self {
        self.alternatives = alternatives;
        self
    }

    /// Tunnel all probing through a proxy
    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Set the initial network type
    pub fn with_network_type(mut self, network_type: NetworkType) -> Self {
        self.network_type = network_type;
        self
    }

    /// Set the data saving policy
    pub fn with_data_saving(mut self, data_saving: DataSavingPolicy) -> Self {
        self.data_saving = data_saving;
        self
    }

    /// Feed back key-rotation bytes from a previous call
    pub fn with_derived_state(mut self, derived_state: Vec<u8>) -> Self {
        self.derived_state = derived_state;
        self
    }

    /// Bind the call's device selection through a directory
    pub fn with_audio_directory(mut self, directory: Arc<AudioDeviceDirectory>) -> Self {
        self.audio_directory = Some(directory);
        self
    }

    /// The full candidate list, primary first.
    pub fn candidates(&self) -> Vec<ConnectionCandidate> {
        let mut candidates = Vec::with_capacity(1 + self.alternatives.len());
        candidates.push(self.primary.clone());
        candidates.extend(self.alternatives.iter().cloned());
        candidates
    }
}
