//! Transport seam between the prober and the network.
//!
//! The prober only knows how to race attempts; what an attempt does is
//! behind [`ProbeTransport`]. Production uses [`UdpProbeTransport`]; tests
//! use the scripted transports in [`crate::mock`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::candidate::{ConnectionCandidate, ProxyConfig};
use crate::error::{ProbeError, Result};
use crate::handshake::{decode_relay_frame, encode_relay_frame, ProbePing, ProbePong, NONCE_LEN};

/// Maximum datagram a probe or media frame is expected to occupy.
const MAX_DATAGRAM: usize = 1500;

/// An established, exclusively owned path to the peer.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Send one datagram
    async fn send(&self, payload: &[u8]) -> Result<()>;

    /// Receive one datagram into `buf`, returning its length
    async fn recv(&self, buf: &mut [u8]) -> Result<usize>;

    /// The remote address this handle is bound to
    fn peer_addr(&self) -> SocketAddr;

    /// Close the path; subsequent sends fail with `TransportClosed`
    fn close(&self);
}

/// Strategy for turning one candidate into a connected transport handle.
#[async_trait]
pub trait ProbeTransport: Send + Sync {
    /// Attempt the probe handshake against `candidate`, tunneling through
    /// `proxy` when present. Implementations return as soon as a valid
    /// pong arrives, or when `cancel` fires.
    async fn connect(
        &self,
        candidate: &ConnectionCandidate,
        proxy: Option<&ProxyConfig>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn TransportHandle>>;
}

/// UDP probe transport used in production.
#[derive(Debug, Default)]
pub struct UdpProbeTransport;

impl UdpProbeTransport {
    /// Create a new UDP transport strategy
    pub fn new() -> Self {
        Self
    }

    fn resolve_destination(
        candidate: &ConnectionCandidate,
        proxy: Option<&ProxyConfig>,
    ) -> Result<(SocketAddr, Option<SocketAddr>)> {
        let candidate_addr = candidate
            .addrs()
            .into_iter()
            .next()
            .ok_or(ProbeError::NoUsableAddress { id: candidate.id })?;

        match proxy {
            Some(proxy) => {
                let proxy_addr = format!("{}:{}", proxy.host, proxy.port)
                    .parse::<SocketAddr>()
                    .map_err(|e| {
                        ProbeError::malformed(format!("proxy address unusable: {}", e))
                    })?;
                Ok((proxy_addr, Some(candidate_addr)))
            }
            None => Ok((candidate_addr, None)),
        }
    }
}

#[async_trait]
impl ProbeTransport for UdpProbeTransport {
    async fn connect(
        &self,
        candidate: &ConnectionCandidate,
        proxy: Option<&ProxyConfig>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn TransportHandle>> {
        let (destination, relay_target) = Self::resolve_destination(candidate, proxy)?;

        let socket = match destination {
            SocketAddr::V4(_) => UdpSocket::bind("0.0.0.0:0").await?,
            SocketAddr::V6(_) => UdpSocket::bind("[::]:0").await?,
        };
        socket.connect(destination).await?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::Rng::fill(&mut rand::thread_rng(), &mut nonce[..]);
        let ping = ProbePing {
            connection_id: candidate.id,
            peer_tag: candidate.peer_tag,
            nonce,
        };

        let wire = match relay_target {
            // Tunneled attempt: the proxy unwraps the relay frame and
            // forwards the ping to the candidate.
            Some(target) => encode_relay_frame(target, &ping.encode()),
            None => ping.encode(),
        };
        socket.send(&wire).await?;
        trace!("sent probe ping to {} for {}", destination, candidate);

        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let len = tokio::select! {
                recv = socket.recv(&mut buf) => recv?,
                _ = cancel.cancelled() => return Err(ProbeError::Cancelled),
            };

            let payload = match decode_relay_frame(&buf[..len]) {
                Ok((_, inner)) => inner,
                Err(_) => &buf[..len],
            };
            let pong = match ProbePong::decode(payload) {
                Ok(pong) => pong,
                Err(e) => {
                    // Not a pong; other traffic may share the socket later,
                    // but during the probe anything else is noise.
                    trace!("ignoring non-pong datagram: {}", e);
                    continue;
                }
            };

            if pong.connection_id != candidate.id {
                return Err(ProbeError::mismatch(format!(
                    "pong for connection {}, expected {}",
                    pong.connection_id, candidate.id
                )));
            }
            if pong.nonce != nonce {
                return Err(ProbeError::mismatch("pong nonce does not match ping"));
            }

            debug!("probe handshake complete with {}", candidate);
            return Ok(Box::new(UdpTransportHandle {
                socket: Arc::new(socket),
                peer: destination,
                closed: AtomicBool::new(false),
            }));
        }
    }
}

/// Connected UDP transport handle owned by the winning probe.
pub struct UdpTransportHandle {
    socket: Arc<UdpSocket>,
    peer: SocketAddr,
    closed: AtomicBool,
}

#[async_trait]
impl TransportHandle for UdpTransportHandle {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProbeError::TransportClosed);
        }
        self.socket.send(payload).await?;
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ProbeError::TransportClosed);
        }
        Ok(self.socket.recv(buf).await?)
    }

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
