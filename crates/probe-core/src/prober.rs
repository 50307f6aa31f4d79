//! Concurrent candidate prober.
//!
//! All viable candidates are attempted at once; waiting out a dead primary
//! before trying an alternative would cost exactly the latency this
//! component exists to avoid. The first valid handshake wins. On an exact
//! tie inside one scheduling tick the candidate listed earliest wins, so
//! the primary keeps a stable preference. Losing attempts are cancelled the
//! instant a winner is chosen; a stale attempt can never surface later.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::candidate::{ConnectionCandidate, ProxyConfig};
use crate::error::{ProbeError, Result};
use crate::transport::{ProbeTransport, TransportHandle};

/// Prober tunables.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    /// Budget for a single candidate's handshake
    pub per_attempt_timeout: Duration,
    /// Budget for the whole run
    pub overall_timeout: Duration,
    /// Whether direct peer-to-peer candidates may be used at all
    pub allow_p2p: bool,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            per_attempt_timeout: Duration::from_secs(5),
            overall_timeout: Duration::from_secs(12),
            allow_p2p: true,
        }
    }
}

/// The winning attempt of a probe run.
pub struct ProbeWin {
    /// The candidate that completed the handshake first
    pub candidate: ConnectionCandidate,
    /// The connected transport, exclusively owned by the caller from here
    pub handle: Box<dyn TransportHandle>,
    /// Position of the winner in the probed list (0 = primary)
    pub index: usize,
    /// Handshake round-trip time
    pub rtt: Duration,
}

impl std::fmt::Debug for ProbeWin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeWin")
            .field("candidate", &self.candidate)
            .field("index", &self.index)
            .field("rtt", &self.rtt)
            .finish_non_exhaustive()
    }
}

type AttemptResult = (usize, Duration, Result<Box<dyn TransportHandle>>);

/// Races handshake attempts against an ordered candidate list.
pub struct CandidateProber {
    transport: Arc<dyn ProbeTransport>,
    proxy: Option<ProxyConfig>,
    config: ProberConfig,
    cancel: CancellationToken,
}

impl CandidateProber {
    /// Create a prober over the given transport strategy.
    pub fn new(
        transport: Arc<dyn ProbeTransport>,
        proxy: Option<ProxyConfig>,
        config: ProberConfig,
    ) -> Self {
        Self {
            transport,
            proxy,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Token that aborts the whole run when cancelled from outside.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Probe `candidates` (primary first) and return the winner.
    ///
    /// Returns [`ProbeError::NoViableCandidate`] when every attempt fails
    /// or the overall budget elapses, and [`ProbeError::Cancelled`] when
    /// the run is cancelled from outside.
    pub async fn probe(&self, candidates: &[ConnectionCandidate]) -> Result<ProbeWin> {
        let viable: Vec<(usize, ConnectionCandidate)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                if self.config.allow_p2p || c.is_relay {
                    true
                } else {
                    debug!("skipping {}: p2p disabled", c);
                    false
                }
            })
            .map(|(i, c)| (i, c.clone()))
            .collect();

        if viable.is_empty() {
            warn!("no viable candidates to probe");
            return Err(ProbeError::NoViableCandidate);
        }
        debug!("probing {} of {} candidates", viable.len(), candidates.len());

        let attempt_cancel = self.cancel.child_token();
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<AttemptResult>();

        for (index, candidate) in &viable {
            let index = *index;
            let candidate = candidate.clone();
            let transport = self.transport.clone();
            let proxy = self.proxy.clone();
            let cancel = attempt_cancel.clone();
            let per_attempt = self.config.per_attempt_timeout;
            let tx = result_tx.clone();

            tokio::spawn(async move {
                let started = Instant::now();
                let outcome = match timeout(
                    per_attempt,
                    transport.connect(&candidate, proxy.as_ref(), &cancel),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ProbeError::AttemptTimeout {
                        millis: per_attempt.as_millis() as u64,
                    }),
                };
                // The collector may be gone if another attempt already won.
                let _ = tx.send((index, started.elapsed(), outcome));
            });
        }
        drop(result_tx);

        let winner = self.collect(&mut result_rx, &viable).await;
        // Whatever the outcome, nothing may keep probing.
        attempt_cancel.cancel();

        match &winner {
            Ok(win) => debug!("candidate {} won in {:?}", win.candidate, win.rtt),
            Err(e) => debug!("probe run failed: {}", e),
        }
        winner
    }

    async fn collect(
        &self,
        result_rx: &mut mpsc::UnboundedReceiver<AttemptResult>,
        viable: &[(usize, ConnectionCandidate)],
    ) -> Result<ProbeWin> {
        let deadline = tokio::time::sleep(self.config.overall_timeout);
        tokio::pin!(deadline);

        let mut failures = 0usize;
        loop {
            let received = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ProbeError::Cancelled),
                _ = &mut deadline => {
                    warn!("overall probe deadline elapsed");
                    return Err(ProbeError::NoViableCandidate);
                }
                received = result_rx.recv() => received,
            };

            let (index, rtt, outcome) = match received {
                Some(result) => result,
                None => return Err(ProbeError::NoViableCandidate),
            };

            match outcome {
                Ok(handle) => {
                    let mut best = (index, rtt, handle);
                    // Same-tick tie-break: let attempts that were woken in
                    // the same tick deliver, then keep the earliest-listed
                    // success.
                    tokio::task::yield_now().await;
                    while let Ok((other_index, other_rtt, other)) = result_rx.try_recv() {
                        match other {
                            Ok(other_handle) if other_index < best.0 => {
                                best.2.close();
                                best = (other_index, other_rtt, other_handle);
                            }
                            Ok(other_handle) => other_handle.close(),
                            Err(e) => trace!("attempt {} lost: {}", other_index, e),
                        }
                    }

                    let (index, rtt, handle) = best;
                    let candidate = viable
                        .iter()
                        .find(|(i, _)| *i == index)
                        .map(|(_, c)| c.clone())
                        .expect("winner index comes from the probed list");
                    return Ok(ProbeWin {
                        candidate,
                        handle,
                        index,
                        rtt,
                    });
                }
                Err(e) => {
                    trace!("attempt {} failed: {}", index, e);
                    failures += 1;
                    if failures == viable.len() {
                        return Err(ProbeError::NoViableCandidate);
                    }
                }
            }
        }
    }
}
