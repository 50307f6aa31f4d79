//! Shared value and event types of the session engine.

use serde::{Deserialize, Serialize};

/// Why a session reached [`CallState::Failed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallFailure {
    /// No candidate completed a handshake within the retry budget
    NoViableCandidate,
    /// The peers share no supported protocol layer
    IncompatibleLayer,
    /// An inbound frame failed decryption or authentication
    CryptoFailure,
}

impl std::fmt::Display for CallFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoViableCandidate => write!(f, "no viable candidate"),
            Self::IncompatibleLayer => write!(f, "incompatible protocol layer"),
            Self::CryptoFailure => write!(f, "crypto failure"),
        }
    }
}

/// Call session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallState {
    /// Negotiating the first transport path
    Initializing,
    /// Media is flowing over the selected transport
    Connected,
    /// The active path degraded; probing for a replacement
    Reconnecting,
    /// Terminal failure
    Failed(CallFailure),
}

impl CallState {
    /// Whether this state is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for CallState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "initializing"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// The kind of network the host is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkType {
    /// Wi-Fi
    Wifi,
    /// Wired ethernet
    Ethernet,
    /// GPRS cellular data
    Gprs,
    /// EDGE cellular data
    Edge,
    /// 3G cellular data
    ThirdGen,
    /// LTE cellular data
    Lte,
    /// Unknown or other
    Other,
}

impl NetworkType {
    /// The coarse traffic class used for telemetry and adaptation.
    pub fn network_class(&self) -> NetworkClass {
        match self {
            Self::Gprs | Self::Edge | Self::ThirdGen | Self::Lte => NetworkClass::Mobile,
            Self::Wifi | Self::Ethernet | Self::Other => NetworkClass::Wifi,
        }
    }

    /// Whether this network type is metered cellular data
    pub fn is_cellular(&self) -> bool {
        self.network_class() == NetworkClass::Mobile
    }
}

/// Coarse traffic class bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NetworkClass {
    /// Unmetered networks (wifi, ethernet)
    Wifi = 0,
    /// Metered cellular networks
    Mobile = 1,
}

impl NetworkClass {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Mobile,
            _ => Self::Wifi,
        }
    }
}

/// When the session should trade quality for bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSavingPolicy {
    /// Never save data
    Never,
    /// Save data on cellular networks only
    CellularOnly,
    /// Always save data
    Always,
}

impl DataSavingPolicy {
    /// Whether data saving applies on the given network type
    pub fn applies_on(&self, network_type: NetworkType) -> bool {
        match self {
            Self::Never => false,
            Self::CellularOnly => network_type.is_cellular(),
            Self::Always => true,
        }
    }
}

/// Events delivered to the session's observer, in transition order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// The state machine moved to a new state
    StateChanged(CallState),
    /// The connection quality indicator changed (1..=4)
    SignalBarsChanged(u8),
}

/// End-of-call report, produced exactly once by `stop()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallStats {
    /// Human-readable debug log; writing it to storage is the caller's job
    pub debug_log: String,
    /// Bytes sent while on unmetered networks
    pub bytes_sent_wifi: u64,
    /// Bytes received while on unmetered networks
    pub bytes_received_wifi: u64,
    /// Bytes sent while on cellular networks
    pub bytes_sent_mobile: u64,
    /// Bytes received while on cellular networks
    pub bytes_received_mobile: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_classes() {
        assert_eq!(NetworkType::Wifi.network_class(), NetworkClass::Wifi);
        assert_eq!(NetworkType::Ethernet.network_class(), NetworkClass::Wifi);
        assert_eq!(NetworkType::Other.network_class(), NetworkClass::Wifi);
        assert_eq!(NetworkType::Lte.network_class(), NetworkClass::Mobile);
        assert_eq!(NetworkType::Gprs.network_class(), NetworkClass::Mobile);
    }

    #[test]
    fn data_saving_policies() {
        assert!(!DataSavingPolicy::Never.applies_on(NetworkType::Lte));
        assert!(DataSavingPolicy::CellularOnly.applies_on(NetworkType::Edge));
        assert!(!DataSavingPolicy::CellularOnly.applies_on(NetworkType::Wifi));
        assert!(DataSavingPolicy::Always.applies_on(NetworkType::Wifi));
    }

    #[test]
    fn terminal_states() {
        assert!(!CallState::Initializing.is_terminal());
        assert!(!CallState::Reconnecting.is_terminal());
        assert!(CallState::Failed(CallFailure::CryptoFailure).is_terminal());
    }

    #[test]
    fn states_render_for_logs() {
        assert_eq!(CallState::Connected.to_string(), "connected");
        assert_eq!(
            CallState::Failed(CallFailure::NoViableCandidate).to_string(),
            "failed (no viable candidate)"
        );
    }
}
