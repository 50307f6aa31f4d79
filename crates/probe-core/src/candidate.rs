//! Signaled endpoint descriptions.
//!
//! Candidates and proxy credentials are created by the signaling layer
//! before a session exists. The session only ever reads them.

use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Length of the peer tag scoping a candidate to one call.
pub const PEER_TAG_LEN: usize = 16;

/// A network endpoint the session may try to connect through.
///
/// Relay candidates forward traffic for the call; direct candidates reach
/// the peer itself and are only usable when peer-to-peer connections are
/// allowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCandidate {
    /// Opaque connection id assigned during signaling
    pub id: i64,
    /// IPv4 address literal, possibly empty
    pub ipv4: String,
    /// IPv6 address literal, possibly empty
    pub ipv6: String,
    /// Destination port
    pub port: u16,
    /// Opaque bytes scoping encryption and routing to this candidate,
    /// preventing cross-call confusion at a shared relay
    pub peer_tag: [u8; PEER_TAG_LEN],
    /// Whether this endpoint relays traffic rather than reaching the peer
    /// directly
    pub is_relay: bool,
}

impl ConnectionCandidate {
    /// Create a relay candidate (the common case in signaling).
    pub fn relay(id: i64, ipv4: impl Into<String>, ipv6: impl Into<String>, port: u16, peer_tag: [u8; PEER_TAG_LEN]) -> Self {
        Self {
            id,
            ipv4: ipv4.into(),
            ipv6: ipv6.into(),
            port,
            peer_tag,
            is_relay: true,
        }
    }

    /// Create a direct peer-to-peer candidate.
    pub fn direct(id: i64, ipv4: impl Into<String>, ipv6: impl Into<String>, port: u16, peer_tag: [u8; PEER_TAG_LEN]) -> Self {
        Self {
            is_relay: false,
            ..Self::relay(id, ipv4, ipv6, port, peer_tag)
        }
    }

    /// The usable socket addresses for this candidate, IPv4 first.
    ///
    /// Address literals that fail to parse are skipped rather than turned
    /// into errors; a candidate with no parseable address simply yields an
    /// empty list.
    pub fn addrs(&self) -> Vec<SocketAddr> {
        let mut addrs = Vec::with_capacity(2);
        if let Ok(ip) = self.ipv4.parse::<IpAddr>() {
            addrs.push(SocketAddr::new(ip, self.port));
        }
        if let Ok(ip) = self.ipv6.parse::<IpAddr>() {
            addrs.push(SocketAddr::new(ip, self.port));
        }
        addrs
    }
}

impl std::fmt::Display for ConnectionCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_relay { "relay" } else { "p2p" };
        let host = if self.ipv4.is_empty() {
            &self.ipv6
        } else {
            &self.ipv4
        };
        write!(f, "{}#{} {}:{}", kind, self.id, host, self.port)
    }
}

/// Relay or proxy credentials every attempt is tunneled through when
/// present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy host name or address literal
    pub host: String,
    /// Proxy port
    pub port: u16,
    /// Account name
    pub username: String,
    /// Account password
    pub password: String,
}

impl ProxyConfig {
    /// Create a new proxy configuration
    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }
}
