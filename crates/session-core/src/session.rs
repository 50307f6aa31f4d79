//! The call session state machine.
//!
//! A session is bound at construction to a serial execution context; every
//! public mutating operation either runs synchronously if already on that
//! context or is redirected onto it, so the state machine is single-writer
//! without internal locking beyond the uncontended state cell. The one
//! place genuine concurrency exists is candidate probing: attempts fan out
//! onto their own tasks, and only the result crosses back onto the serial
//! context, where the transition is applied. Losing probes are cancelled
//! the instant a winner is chosen.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use peercall_crypto_core::{
    ctr, decrypt_control_frame, derive_keys, encrypt_control_frame, fingerprint, hash::sha256,
    CounterLedger, DerivedState, DirectionalKeys, IgeIv, SharedSecret,
};
use peercall_infra_common::{executor::run_on, SerialExecutor};
use peercall_probe_core::{
    CandidateProber, ProbeError, ProbeWin, ProberConfig, TransportHandle,
};

use crate::config::CallConfig;
use crate::error::Result;
use crate::frames::{self, WireFrame};
use crate::telemetry::TelemetryCollector;
use crate::types::{
    CallEvent, CallFailure, CallState, CallStats, DataSavingPolicy, NetworkClass, NetworkType,
};

/// Highest protocol layer this build speaks. Advertised during signaling,
/// before any session exists.
pub fn max_supported_layer() -> i32 {
    92
}

/// Lowest protocol layer this build still accepts.
pub fn min_supported_layer() -> i32 {
    65
}

/// Implementation version advertised during signaling.
pub fn version_string() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

const EVENT_CHANNEL_CAPACITY: usize = 128;
const MEDIA_CHANNEL_CAPACITY: usize = 256;
const MAX_DATAGRAM: usize = 1500;

/// Mutable session state. Only ever touched from the serial context, with
/// the exception of plain reads through the query getters.
struct SessionInner {
    state: CallState,
    stopped: bool,
    secret: SharedSecret,
    derived: DerivedState,
    keys: Option<DirectionalKeys>,
    transport: Option<Arc<dyn TransportHandle>>,
    network_type: NetworkType,
    data_saving: DataSavingPolicy,
    muted: bool,
    low_battery: bool,
    signal_bars: u8,
    send_ledger: CounterLedger,
    control_ledger: CounterLedger,
    last_media_recv: Option<u32>,
    last_control_recv: Option<u32>,
    reconnect_attempts: u32,
    connected_at: Option<Instant>,
    connected_total: Duration,
    probe_cancel: Option<CancellationToken>,
    pump_cancel: Option<CancellationToken>,
    debug_log: String,
    need_rate: bool,
}

struct SessionShared {
    config: CallConfig,
    executor: Arc<dyn SerialExecutor>,
    runtime: tokio::runtime::Handle,
    inner: Mutex<SessionInner>,
    telemetry: TelemetryCollector,
    /// Read from the transport I/O path without taking the state lock.
    network_class: AtomicU8,
    /// Records happen under the read side; `stop` flips the flag under the
    /// write side before freezing, so no record can land in a frozen
    /// collector.
    accounting_live: RwLock<bool>,
    events_tx: mpsc::Sender<CallEvent>,
    media_tx: mpsc::Sender<Vec<u8>>,
    started: Instant,
}

/// A peer-to-peer encrypted call attempt.
///
/// Created once per call; [`CallSession::stop`] tears everything down and
/// delivers the final [`CallStats`] exactly once. Must be constructed
/// inside a tokio runtime, which hosts the probe and I/O tasks.
pub struct CallSession {
    shared: Arc<SessionShared>,
    events_rx: Option<mpsc::Receiver<CallEvent>>,
    media_rx: Option<mpsc::Receiver<Vec<u8>>>,
}

impl CallSession {
    /// Build a session from one call attempt's inputs.
    ///
    /// Validates the crypto-shaped opaque inputs; everything else is
    /// deferred to [`CallSession::start`].
    pub fn new(config: CallConfig) -> Result<Self> {
        let secret = SharedSecret::new(&config.shared_secret, config.is_outgoing)?;
        let derived = DerivedState::from_bytes(&config.derived_state)?;

        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (media_tx, media_rx) = mpsc::channel(MEDIA_CHANNEL_CAPACITY);

        let inner = SessionInner {
            state: CallState::Initializing,
            stopped: false,
            secret,
            derived,
            keys: None,
            transport: None,
            network_type: config.network_type,
            data_saving: config.data_saving,
            muted: false,
            low_battery: false,
            signal_bars: 0,
            send_ledger: CounterLedger::new(),
            control_ledger: CounterLedger::new(),
            last_media_recv: None,
            last_control_recv: None,
            reconnect_attempts: 0,
            connected_at: None,
            connected_total: Duration::ZERO,
            probe_cancel: None,
            pump_cancel: None,
            debug_log: String::new(),
            need_rate: false,
        };

        let shared = Arc::new(SessionShared {
            executor: config.executor.clone(),
            runtime: tokio::runtime::Handle::current(),
            network_class: AtomicU8::new(config.network_type.network_class() as u8),
            accounting_live: RwLock::new(true),
            inner: Mutex::new(inner),
            telemetry: TelemetryCollector::new(),
            events_tx,
            media_tx,
            started: Instant::now(),
            config,
        });

        {
            let mut inner = shared.inner.lock();
            let line = format!(
                "call session v{} created, log -> {}",
                version_string(),
                if shared.config.log_path.is_empty() {
                    "(discarded)"
                } else {
                    &shared.config.log_path
                }
            );
            log_line(&shared, &mut inner, &line);
        }

        Ok(Self {
            shared,
            events_rx: Some(events_rx),
            media_rx: Some(media_rx),
        })
    }

    /// Begin negotiating a transport path.
    pub fn start(&self) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.stopped || inner.state.is_terminal() {
                    return;
                }
                if shared.config.max_layer < min_supported_layer() {
                    warn!(
                        "peer layer ceiling {} below minimum {}",
                        shared.config.max_layer,
                        min_supported_layer()
                    );
                    fail(&shared, &mut inner, CallFailure::IncompatibleLayer);
                    return;
                }
                log_line(
                    &shared,
                    &mut inner,
                    &format!("negotiated layer {}", shared.config.max_layer.min(max_supported_layer())),
                );
                spawn_probe(&shared, &mut inner);
            }),
        );
    }

    /// Take the ordered event stream. Yields `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<CallEvent>> {
        self.events_rx.take()
    }

    /// Take the decrypted inbound media stream. Yields `None` after the
    /// first call.
    pub fn take_media(&mut self) -> Option<mpsc::Receiver<Vec<u8>>> {
        self.media_rx.take()
    }

    /// Current state.
    pub fn state(&self) -> CallState {
        self.shared.inner.lock().state
    }

    /// Mute or unmute the bound input path. Local state only; the state
    /// machine is unaffected.
    pub fn set_is_muted(&self, muted: bool) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.muted != muted {
                    inner.muted = muted;
                    log_line(&shared, &mut inner, if muted { "muted" } else { "unmuted" });
                }
            }),
        );
    }

    /// Whether the input path is muted.
    pub fn is_muted(&self) -> bool {
        self.shared.inner.lock().muted
    }

    /// Adaptation flag read by the media pipeline.
    pub fn set_is_low_battery_level(&self, low: bool) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                shared.inner.lock().low_battery = low;
            }),
        );
    }

    /// Whether the host reported a low battery level.
    pub fn is_low_battery_level(&self) -> bool {
        self.shared.inner.lock().low_battery
    }

    /// Report a network change. A change of traffic class while connected
    /// invalidates the active path and triggers reconnection.
    pub fn set_network_type(&self, network_type: NetworkType) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                let old_class = inner.network_type.network_class();
                let new_class = network_type.network_class();
                inner.network_type = network_type;
                shared
                    .network_class
                    .store(new_class as u8, Ordering::Release);

                if old_class != new_class {
                    log_line(
                        &shared,
                        &mut inner,
                        &format!("network class changed: {:?} -> {:?}", old_class, new_class),
                    );
                    if inner.state == CallState::Connected {
                        begin_reconnect(&shared, &mut inner, "network change");
                    }
                }
            }),
        );
    }

    /// The network type last reported to the session.
    pub fn network_type(&self) -> NetworkType {
        self.shared.inner.lock().network_type
    }

    /// The configured data saving policy.
    pub fn data_saving_policy(&self) -> DataSavingPolicy {
        self.shared.inner.lock().data_saving
    }

    /// Whether the media pipeline should currently trade quality for
    /// bandwidth.
    pub fn should_save_data(&self) -> bool {
        let inner = self.shared.inner.lock();
        inner.data_saving.applies_on(inner.network_type)
    }

    /// Report sustained packet loss or a keepalive timeout on the active
    /// transport.
    pub fn report_transport_timeout(&self) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.state == CallState::Connected {
                    begin_reconnect(&shared, &mut inner, "transport timeout");
                }
            }),
        );
    }

    /// Feed an updated quality level (1..=4) from the transport health
    /// monitor.
    pub fn set_signal_bars(&self, bars: u8) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                set_signal_bars(&shared, &mut inner, bars);
            }),
        );
    }

    /// Last published signal-bar level (0 before the first measurement).
    pub fn signal_bars(&self) -> u8 {
        self.shared.inner.lock().signal_bars
    }

    /// Encrypt and send one media frame. Dropped with a log line when the
    /// session is not connected.
    pub fn send_media_frame(&self, payload: Vec<u8>) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.state != CallState::Connected {
                    trace!("dropping media frame while {}", inner.state);
                    return;
                }
                let (Some(keys), Some(transport)) = (inner.keys.clone(), inner.transport.clone())
                else {
                    return;
                };

                let counter = inner.send_ledger.next();
                let mut sealed = frames::seal(&payload);
                ctr::encrypt_media_frame(
                    &mut sealed,
                    &keys.send_key,
                    &ctr::media_nonce(&keys.send_iv),
                    counter,
                );
                let wire = WireFrame::Media {
                    counter,
                    ciphertext: sealed,
                }
                .encode();

                record_sent(&shared, wire.len() as u64);
                shared.runtime.spawn(async move {
                    if let Err(e) = transport.send(&wire).await {
                        debug!("media send failed: {}", e);
                    }
                });
            }),
        );
    }

    /// Encrypt and send one control frame.
    pub fn send_control_frame(&self, payload: Vec<u8>) {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.state != CallState::Connected {
                    trace!("dropping control frame while {}", inner.state);
                    return;
                }
                let (Some(keys), Some(transport)) = (inner.keys.clone(), inner.transport.clone())
                else {
                    return;
                };

                let counter = inner.control_ledger.next();
                let sealed = frames::seal_control(&payload);
                let iv = control_iv(&keys.send_iv, counter);
                let ciphertext = encrypt_control_frame(&sealed, &keys.send_key, &iv)
                    .expect("sealed control frames are block aligned");
                let wire = WireFrame::Control {
                    counter,
                    ciphertext,
                }
                .encode();

                record_sent(&shared, wire.len() as u64);
                shared.runtime.spawn(async move {
                    if let Err(e) = transport.send(&wire).await {
                        debug!("control send failed: {}", e);
                    }
                });
            }),
        );
    }

    /// The emoji fingerprint both participants compare to detect a
    /// substituted secret.
    pub fn key_fingerprint(&self, glyph_count: usize) -> Result<Vec<usize>> {
        let digest = self.shared.inner.lock().secret.digest();
        Ok(fingerprint(&digest, glyph_count)?)
    }

    /// Post-call heuristic: whether the user should be prompted to rate
    /// the call. True only after a normal `stop` of a call that stayed
    /// connected for the configured minimum.
    pub fn need_rate(&self) -> bool {
        self.shared.inner.lock().need_rate
    }

    /// Snapshot of the current key-rotation material, valid as the
    /// `derived_state` input of the next call between the same peers.
    pub fn get_derived_state(&self) -> Vec<u8> {
        self.shared.inner.lock().derived.to_bytes()
    }

    /// Current state, counters and transport as human-readable text.
    pub fn debug_info(&self) -> String {
        let inner = self.shared.inner.lock();
        let (sent, received) = self.shared.telemetry.totals();
        format!(
            "state={} generation={} attempts={} transport={} sent={}B received={}B",
            inner.state,
            inner.derived.generation(),
            inner.reconnect_attempts,
            inner
                .transport
                .as_ref()
                .map(|t| t.peer_addr().to_string())
                .unwrap_or_else(|| "none".to_string()),
            sent,
            received,
        )
    }

    /// Bind the call's audio input to a directory device.
    pub fn switch_audio_input(&self, device_id: &str) {
        if let Some(directory) = &self.shared.config.audio_directory {
            directory.set_current_input_device_id(device_id);
        }
    }

    /// Bind the call's audio output to a directory device.
    pub fn switch_audio_output(&self, device_id: &str) {
        if let Some(directory) = &self.shared.config.audio_directory {
            directory.set_current_output_device_id(device_id);
        }
    }

    /// Stop the call: cancel in-flight probes, tear down the transport,
    /// freeze telemetry, and deliver the report to `completion`.
    ///
    /// Idempotent; a second call is a no-op and its completion is never
    /// invoked.
    pub fn stop<F>(&self, completion: F)
    where
        F: FnOnce(CallStats) + Send + 'static,
    {
        let shared = self.shared.clone();
        run_on(
            &*self.shared.executor,
            Box::new(move || {
                let mut inner = shared.inner.lock();
                if inner.stopped {
                    debug!("stop() called twice, ignoring");
                    return;
                }
                inner.stopped = true;

                if let Some(cancel) = inner.probe_cancel.take() {
                    cancel.cancel();
                }
                if let Some(cancel) = inner.pump_cancel.take() {
                    cancel.cancel();
                }
                if let Some(transport) = inner.transport.take() {
                    transport.close();
                }

                accumulate_connected_time(&mut inner);
                inner.need_rate = !inner.state.is_terminal()
                    && inner.connected_total >= shared.config.min_rated_duration;

                log_line(&shared, &mut inner, "session stopped");
                let summary = format!(
                    "final: state={} connected_for={:?} generation={}",
                    inner.state,
                    inner.connected_total,
                    inner.derived.generation()
                );
                log_line(&shared, &mut inner, &summary);

                // Racing I/O records are dropped from here on instead of
                // landing in the frozen collector.
                *shared.accounting_live.write() = false;
                let stats = shared.telemetry.freeze(inner.debug_log.clone());
                info!("call ended: {}", summary);
                drop(inner);

                completion(stats);
            }),
        );
    }
}

impl std::fmt::Debug for CallSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallSession")
            .field("state", &self.shared.inner.lock().state)
            .finish_non_exhaustive()
    }
}

/// Per-frame IGE IV: the direction's base IV bound to the frame counter.
fn control_iv(base: &IgeIv, counter: u32) -> IgeIv {
    let mut input = Vec::with_capacity(base.len() + 4);
    input.extend_from_slice(base);
    input.extend_from_slice(&counter.to_be_bytes());
    sha256(&input)
}

fn current_class(shared: &SessionShared) -> NetworkClass {
    NetworkClass::from_u8(shared.network_class.load(Ordering::Acquire))
}

fn record_sent(shared: &SessionShared, bytes: u64) {
    let live = shared.accounting_live.read();
    if *live {
        shared.telemetry.record_sent(bytes, current_class(shared));
    }
}

fn record_received(shared: &SessionShared, bytes: u64) {
    let live = shared.accounting_live.read();
    if *live {
        shared
            .telemetry
            .record_received(bytes, current_class(shared));
    }
}

fn log_line(shared: &SessionShared, inner: &mut SessionInner, message: &str) {
    let elapsed = shared.started.elapsed();
    inner
        .debug_log
        .push_str(&format!("[{:>9.3}] {}\n", elapsed.as_secs_f64(), message));
}

fn emit(shared: &SessionShared, event: CallEvent) {
    match shared.events_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(event)) => {
            warn!("event channel full, dropping {:?}", event);
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {}
    }
}

fn transition(shared: &SessionShared, inner: &mut SessionInner, new_state: CallState) {
    let old_state = inner.state;
    if old_state == new_state {
        return;
    }
    inner.state = new_state;
    debug!("call state changed: {} -> {}", old_state, new_state);
    log_line(
        shared,
        inner,
        &format!("state: {} -> {}", old_state, new_state),
    );
    emit(shared, CallEvent::StateChanged(new_state));
}

fn set_signal_bars(shared: &SessionShared, inner: &mut SessionInner, bars: u8) {
    let bars = bars.clamp(1, 4);
    if inner.signal_bars != bars {
        inner.signal_bars = bars;
        emit(shared, CallEvent::SignalBarsChanged(bars));
    }
}

fn bars_for_rtt(rtt: Duration) -> u8 {
    match rtt.as_millis() {
        0..=99 => 4,
        100..=249 => 3,
        250..=599 => 2,
        _ => 1,
    }
}

fn accumulate_connected_time(inner: &mut SessionInner) {
    if let Some(connected_at) = inner.connected_at.take() {
        inner.connected_total += connected_at.elapsed();
    }
}

fn fail(shared: &Arc<SessionShared>, inner: &mut SessionInner, failure: CallFailure) {
    if inner.state.is_terminal() {
        return;
    }
    if let Some(cancel) = inner.probe_cancel.take() {
        cancel.cancel();
    }
    if let Some(cancel) = inner.pump_cancel.take() {
        cancel.cancel();
    }
    if let Some(transport) = inner.transport.take() {
        transport.close();
    }
    accumulate_connected_time(inner);
    transition(shared, inner, CallState::Failed(failure));
}

fn begin_reconnect(shared: &Arc<SessionShared>, inner: &mut SessionInner, reason: &str) {
    info!("reconnecting: {}", reason);
    log_line(shared, inner, &format!("reconnect: {}", reason));

    if let Some(cancel) = inner.pump_cancel.take() {
        cancel.cancel();
    }
    if let Some(transport) = inner.transport.take() {
        transport.close();
    }
    accumulate_connected_time(inner);

    // Rekey: same secret, next generation, so the new transport never
    // reuses counter or IV space.
    inner.derived = inner.derived.next_generation();
    inner.keys = None;
    inner.reconnect_attempts = 0;

    transition(shared, inner, CallState::Reconnecting);
    spawn_probe(shared, inner);
}

fn spawn_probe(shared: &Arc<SessionShared>, inner: &mut SessionInner) {
    let prober = CandidateProber::new(
        shared.config.transport.clone(),
        shared.config.proxy.clone(),
        ProberConfig {
            per_attempt_timeout: shared.config.per_attempt_timeout,
            overall_timeout: shared.config.overall_probe_timeout,
            allow_p2p: shared.config.allow_p2p,
        },
    );
    inner.probe_cancel = Some(prober.cancel_token());

    let candidates = shared.config.candidates();
    log_line(
        shared,
        inner,
        &format!("probing {} candidates", candidates.len()),
    );

    let shared_for_task = shared.clone();
    shared.runtime.spawn(async move {
        let result = prober.probe(&candidates).await;
        let shared = shared_for_task.clone();
        shared_for_task.executor.dispatch(Box::new(move || {
            on_probe_result(&shared, result);
        }));
    });
}

fn on_probe_result(
    shared: &Arc<SessionShared>,
    result: std::result::Result<ProbeWin, ProbeError>,
) {
    let mut inner = shared.inner.lock();
    if inner.stopped || inner.state.is_terminal() {
        if let Ok(win) = result {
            win.handle.close();
        }
        return;
    }

    match result {
        Ok(win) => {
            log_line(
                shared,
                &mut inner,
                &format!("connected via {} (rtt {:?})", win.candidate, win.rtt),
            );
            inner.keys = Some(derive_keys(&inner.secret, &inner.derived));
            inner.send_ledger = CounterLedger::new();
            inner.control_ledger = CounterLedger::new();
            inner.last_media_recv = None;
            inner.last_control_recv = None;

            let transport: Arc<dyn TransportHandle> = Arc::from(win.handle);
            inner.transport = Some(transport.clone());
            inner.connected_at = Some(Instant::now());
            inner.reconnect_attempts = 0;

            transition(shared, &mut inner, CallState::Connected);
            set_signal_bars(shared, &mut inner, bars_for_rtt(win.rtt));
            start_pump(shared, &mut inner, transport);
        }
        Err(ProbeError::Cancelled) => {
            trace!("probe cancelled");
        }
        Err(e) => {
            log_line(shared, &mut inner, &format!("probe failed: {}", e));
            match inner.state {
                CallState::Initializing => {
                    fail(shared, &mut inner, CallFailure::NoViableCandidate);
                }
                CallState::Reconnecting => {
                    inner.reconnect_attempts += 1;
                    if inner.reconnect_attempts >= shared.config.max_reconnect_attempts {
                        warn!(
                            "reconnect budget exhausted after {} attempts",
                            inner.reconnect_attempts
                        );
                        fail(shared, &mut inner, CallFailure::NoViableCandidate);
                    } else {
                        spawn_probe(shared, &mut inner);
                    }
                }
                _ => {}
            }
        }
    }
}

fn start_pump(
    shared: &Arc<SessionShared>,
    inner: &mut SessionInner,
    transport: Arc<dyn TransportHandle>,
) {
    let cancel = CancellationToken::new();
    inner.pump_cancel = Some(cancel.clone());

    let keys = inner.keys.clone().expect("pump starts with derived keys");
    let generation = inner.derived.generation();
    let shared = shared.clone();

    shared.runtime.clone().spawn(async move {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let len = tokio::select! {
                _ = cancel.cancelled() => break,
                received = transport.recv(&mut buf) => match received {
                    Ok(len) => len,
                    Err(e) => {
                        trace!("receive pump ending: {}", e);
                        break;
                    }
                },
            };

            record_received(&shared, len as u64);
            match handle_inbound(&shared, &keys, &buf[..len]) {
                Ok(()) => {}
                Err(InboundError::Noise(message)) => {
                    trace!("ignoring inbound noise: {}", message);
                }
                Err(InboundError::Fatal(message)) => {
                    warn!("inbound crypto failure: {}", message);
                    let shared_for_fail = shared.clone();
                    shared.executor.dispatch(Box::new(move || {
                        let mut inner = shared_for_fail.inner.lock();
                        // A pump outlived by a rekey must not fail the
                        // fresh transport.
                        if inner.derived.generation() == generation && !inner.stopped {
                            fail(&shared_for_fail, &mut inner, CallFailure::CryptoFailure);
                        }
                    }));
                    break;
                }
            }
        }
    });
}

enum InboundError {
    /// Undecodable datagram, not addressed to the session's framing
    Noise(String),
    /// A frame that decoded but failed decryption or integrity: possible
    /// tampering or key desync, fatal by design
    Fatal(String),
}

fn handle_inbound(
    shared: &Arc<SessionShared>,
    keys: &DirectionalKeys,
    datagram: &[u8],
) -> std::result::Result<(), InboundError> {
    let frame = WireFrame::decode(datagram).map_err(|e| InboundError::Noise(e.to_string()))?;

    match frame {
        WireFrame::Media {
            counter,
            mut ciphertext,
        } => {
            {
                let mut inner = shared.inner.lock();
                if let Some(last) = inner.last_media_recv {
                    if counter <= last {
                        return Err(InboundError::Fatal(format!(
                            "media counter replay: {} after {}",
                            counter, last
                        )));
                    }
                }
                inner.last_media_recv = Some(counter);
            }

            ctr::decrypt_media_frame(
                &mut ciphertext,
                &keys.recv_key,
                &ctr::media_nonce(&keys.recv_iv),
                counter,
            );
            let payload =
                frames::open(&ciphertext).map_err(|e| InboundError::Fatal(e.to_string()))?;
            if let Err(e) = shared.media_tx.try_send(payload) {
                trace!("media consumer lagging: {}", e);
            }
            Ok(())
        }
        WireFrame::Control {
            counter,
            ciphertext,
        } => {
            {
                let mut inner = shared.inner.lock();
                if let Some(last) = inner.last_control_recv {
                    if counter <= last {
                        return Err(InboundError::Fatal(format!(
                            "control counter replay: {} after {}",
                            counter, last
                        )));
                    }
                }
                inner.last_control_recv = Some(counter);
            }

            let iv = control_iv(&keys.recv_iv, counter);
            let block = decrypt_control_frame(&ciphertext, &keys.recv_key, &iv)
                .map_err(|e| InboundError::Fatal(e.to_string()))?;
            let payload =
                frames::open_control(&block).map_err(|e| InboundError::Fatal(e.to_string()))?;
            debug!("control frame received ({} bytes)", payload.len());
            Ok(())
        }
    }
}
