//! Scripted transports for deterministic prober and session tests.
//!
//! Each candidate id is scripted with an outcome; the mock records which
//! attempts started, completed, and were cancelled, and exposes the
//! endpoint behind every successful handshake so tests can inspect sent
//! frames and inject inbound ones.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::candidate::{ConnectionCandidate, ProxyConfig};
use crate::error::{ProbeError, Result};
use crate::transport::{ProbeTransport, TransportHandle};

/// What a scripted attempt does.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    /// Complete the handshake after a delay
    Succeed { delay: Duration },
    /// Fail the handshake after a delay
    Fail { delay: Duration },
    /// Never answer; only cancellation or the attempt timeout ends it
    Hang,
}

impl ScriptedOutcome {
    /// Succeed after `delay`
    pub fn succeed_after(delay: Duration) -> Self {
        Self::Succeed { delay }
    }

    /// Fail after `delay`
    pub fn fail_after(delay: Duration) -> Self {
        Self::Fail { delay }
    }
}

#[derive(Default)]
struct MockLog {
    attempted: Vec<i64>,
    completed: Vec<i64>,
    cancelled: Vec<i64>,
    proxied: Vec<(i64, Option<ProxyConfig>)>,
}

/// Scripted [`ProbeTransport`].
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<i64, ScriptedOutcome>>,
    endpoints: Mutex<HashMap<i64, Arc<MockEndpoint>>>,
    log: Mutex<MockLog>,
}

impl MockTransport {
    /// Create a transport with no scripts; unscripted candidates hang.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome for a candidate id.
    pub fn script(&self, candidate_id: i64, outcome: ScriptedOutcome) {
        self.scripts.lock().unwrap().insert(candidate_id, outcome);
    }

    /// Candidate ids whose attempts started, in start order.
    pub fn attempted(&self) -> Vec<i64> {
        self.log.lock().unwrap().attempted.clone()
    }

    /// Candidate ids whose handshakes completed.
    pub fn completed(&self) -> Vec<i64> {
        self.log.lock().unwrap().completed.clone()
    }

    /// Candidate ids whose attempts observed cancellation.
    pub fn cancelled(&self) -> Vec<i64> {
        self.log.lock().unwrap().cancelled.clone()
    }

    /// Proxy configuration seen by each attempt.
    pub fn proxied(&self) -> Vec<(i64, Option<ProxyConfig>)> {
        self.log.lock().unwrap().proxied.clone()
    }

    /// The endpoint behind a completed handshake, if any.
    pub fn endpoint(&self, candidate_id: i64) -> Option<Arc<MockEndpoint>> {
        self.endpoints.lock().unwrap().get(&candidate_id).cloned()
    }
}

#[async_trait]
impl ProbeTransport for MockTransport {
    async fn connect(
        &self,
        candidate: &ConnectionCandidate,
        proxy: Option<&ProxyConfig>,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn TransportHandle>> {
        let outcome = {
            let mut log = self.log.lock().unwrap();
            log.attempted.push(candidate.id);
            log.proxied.push((candidate.id, proxy.cloned()));
            self.scripts
                .lock()
                .unwrap()
                .get(&candidate.id)
                .cloned()
                .unwrap_or(ScriptedOutcome::Hang)
        };

        let delay = match &outcome {
            ScriptedOutcome::Succeed { delay } | ScriptedOutcome::Fail { delay } => *delay,
            ScriptedOutcome::Hang => {
                cancel.cancelled().await;
                self.log.lock().unwrap().cancelled.push(candidate.id);
                return Err(ProbeError::Cancelled);
            }
        };

        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                self.log.lock().unwrap().cancelled.push(candidate.id);
                return Err(ProbeError::Cancelled);
            }
        }

        match outcome {
            ScriptedOutcome::Succeed { .. } => {
                self.log.lock().unwrap().completed.push(candidate.id);
                let endpoint = Arc::new(MockEndpoint::new(candidate));
                self.endpoints
                    .lock()
                    .unwrap()
                    .insert(candidate.id, endpoint.clone());
                Ok(Box::new(MockHandle { endpoint }))
            }
            ScriptedOutcome::Fail { .. } => {
                Err(ProbeError::mismatch("scripted failure"))
            }
            ScriptedOutcome::Hang => unreachable!("hang handled above"),
        }
    }
}

/// The far side of a scripted transport: what was sent, and a way to inject
/// inbound datagrams.
pub struct MockEndpoint {
    peer: SocketAddr,
    sent: Mutex<Vec<Vec<u8>>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    inbound_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    closed: AtomicBool,
}

impl MockEndpoint {
    fn new(candidate: &ConnectionCandidate) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let peer = candidate
            .addrs()
            .into_iter()
            .next()
            .unwrap_or_else(|| "127.0.0.1:0".parse().expect("literal address"));
        Self {
            peer,
            sent: Mutex::new(Vec::new()),
            inbound_tx,
            inbound_rx: tokio::sync::Mutex::new(inbound_rx),
            closed: AtomicBool::new(false),
        }
    }

    /// Everything sent through the handle so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Queue a datagram for the handle's next `recv`.
    pub fn push_inbound(&self, data: Vec<u8>) {
        let _ = self.inbound_tx.send(data);
    }

    /// Whether the handle was closed.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct MockHandle {
    endpoint: Arc<MockEndpoint>,
}

#[async_trait]
impl TransportHandle for MockHandle {
    async fn send(&self, payload: &[u8]) -> Result<()> {
        if self.endpoint.is_closed() {
            return Err(ProbeError::TransportClosed);
        }
        self.endpoint.sent.lock().unwrap().push(payload.to_vec());
        Ok(())
    }

    async fn recv(&self, buf: &mut [u8]) -> Result<usize> {
        if self.endpoint.is_closed() {
            return Err(ProbeError::TransportClosed);
        }
        let mut rx = self.endpoint.inbound_rx.lock().await;
        match rx.recv().await {
            Some(data) => {
                let len = data.len().min(buf.len());
                buf[..len].copy_from_slice(&data[..len]);
                Ok(len)
            }
            None => Err(ProbeError::TransportClosed),
        }
    }

    fn peer_addr(&self) -> SocketAddr {
        self.endpoint.peer
    }

    fn close(&self) {
        self.endpoint.closed.store(true, Ordering::Release);
    }
}
