//! Probe handshake wire format.
//!
//! A probe sends a ping carrying the candidate's connection id, its peer
//! tag and a random nonce; a valid pong echoes the id and nonce. The peer
//! tag scopes the exchange to this call, so a shared relay cannot confuse
//! two calls' probes. When a proxy is in use the ping travels inside a
//! relay frame addressed to the real candidate.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};

use crate::candidate::PEER_TAG_LEN;
use crate::error::{ProbeError, Result};

/// Magic prefix of every handshake frame.
pub const HANDSHAKE_MAGIC: u32 = 0x50_43_50_31; // "PCP1"

/// Frame type tags.
const TAG_PING: u8 = 0x01;
const TAG_PONG: u8 = 0x02;
const TAG_RELAY: u8 = 0x03;

/// Nonce length carried by a ping.
pub const NONCE_LEN: usize = 16;

const PING_LEN: usize = 4 + 1 + 8 + PEER_TAG_LEN + NONCE_LEN;
const PONG_LEN: usize = 4 + 1 + 8 + NONCE_LEN;
const RELAY_HEADER_LEN: usize = 4 + 1 + 16 + 2;

/// Probe request frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePing {
    /// Connection id of the candidate being probed
    pub connection_id: i64,
    /// Peer tag of the candidate being probed
    pub peer_tag: [u8; PEER_TAG_LEN],
    /// Random nonce echoed by the pong
    pub nonce: [u8; NONCE_LEN],
}

impl ProbePing {
    /// Encode to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PING_LEN);
        buf.put_u32(HANDSHAKE_MAGIC);
        buf.put_u8(TAG_PING);
        buf.put_i64(self.connection_id);
        buf.put_slice(&self.peer_tag);
        buf.put_slice(&self.nonce);
        buf.freeze()
    }

    /// Decode from wire bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, TAG_PING, PING_LEN, "ping")?;
        let connection_id = BigEndian::read_i64(&data[5..13]);
        let mut peer_tag = [0u8; PEER_TAG_LEN];
        peer_tag.copy_from_slice(&data[13..13 + PEER_TAG_LEN]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[13 + PEER_TAG_LEN..]);
        Ok(Self {
            connection_id,
            peer_tag,
            nonce,
        })
    }

    /// The pong a well-behaved responder answers with
    pub fn pong(&self) -> ProbePong {
        ProbePong {
            connection_id: self.connection_id,
            nonce: self.nonce,
        }
    }
}

/// Probe response frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePong {
    /// Echoed connection id
    pub connection_id: i64,
    /// Echoed nonce
    pub nonce: [u8; NONCE_LEN],
}

impl ProbePong {
    /// Encode to wire bytes
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(PONG_LEN);
        buf.put_u32(HANDSHAKE_MAGIC);
        buf.put_u8(TAG_PONG);
        buf.put_i64(self.connection_id);
        buf.put_slice(&self.nonce);
        buf.freeze()
    }

    /// Decode from wire bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        check_frame(data, TAG_PONG, PONG_LEN, "pong")?;
        let connection_id = BigEndian::read_i64(&data[5..13]);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&data[13..]);
        Ok(Self {
            connection_id,
            nonce,
        })
    }
}

/// Wrap `payload` in a relay frame addressed to `target`, for delivery via
/// a proxy.
pub fn encode_relay_frame(target: SocketAddr, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(RELAY_HEADER_LEN + payload.len());
    buf.put_u32(HANDSHAKE_MAGIC);
    buf.put_u8(TAG_RELAY);
    let v6 = match target.ip() {
        IpAddr::V4(v4) => v4.to_ipv6_mapped(),
        IpAddr::V6(v6) => v6,
    };
    buf.put_slice(&v6.octets());
    buf.put_u16(target.port());
    buf.put_slice(payload);
    buf.freeze()
}

/// Split a relay frame into its target address and inner payload.
pub fn decode_relay_frame(data: &[u8]) -> Result<(SocketAddr, &[u8])> {
    if data.len() < RELAY_HEADER_LEN {
        return Err(ProbeError::malformed(format!(
            "relay frame of {} bytes is shorter than the {}-byte header",
            data.len(),
            RELAY_HEADER_LEN
        )));
    }
    check_magic_and_tag(data, TAG_RELAY, "relay")?;
    let mut octets = [0u8; 16];
    octets.copy_from_slice(&data[5..21]);
    let v6 = Ipv6Addr::from(octets);
    let ip = match v6.to_ipv4_mapped() {
        Some(v4) => IpAddr::V4(v4),
        None => IpAddr::V6(v6),
    };
    let port = BigEndian::read_u16(&data[21..23]);
    Ok((SocketAddr::new(ip, port), &data[RELAY_HEADER_LEN..]))
}

fn check_magic_and_tag(data: &[u8], tag: u8, kind: &str) -> Result<()> {
    let magic = BigEndian::read_u32(&data[..4]);
    if magic != HANDSHAKE_MAGIC {
        return Err(ProbeError::malformed(format!(
            "{} frame has magic {:#010x}",
            kind, magic
        )));
    }
    if data[4] != tag {
        return Err(ProbeError::malformed(format!(
            "{} frame has type tag {:#04x}",
            kind, data[4]
        )));
    }
    Ok(())
}

fn check_frame(data: &[u8], tag: u8, expected_len: usize, kind: &str) -> Result<()> {
    if data.len() != expected_len {
        return Err(ProbeError::malformed(format!(
            "{} frame has length {}, expected {}",
            kind,
            data.len(),
            expected_len
        )));
    }
    check_magic_and_tag(data, tag, kind)
}
