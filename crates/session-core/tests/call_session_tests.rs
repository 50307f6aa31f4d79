//! End-to-end state machine tests over scripted transports.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use peercall_crypto_core::{
    ctr, derive_keys, DerivedState, SharedSecret,
};
use peercall_infra_common::ThreadSerialExecutor;
use peercall_probe_core::mock::{MockTransport, ScriptedOutcome};
use peercall_probe_core::ConnectionCandidate;
use peercall_session_core::frames::{self, WireFrame};
use peercall_session_core::prelude::*;

const SECRET: [u8; 32] = [7; 32];

fn relay(id: i64) -> ConnectionCandidate {
    ConnectionCandidate::relay(id, "192.0.2.1", "", 4000 + id as u16, [id as u8; 16])
}

fn direct(id: i64) -> ConnectionCandidate {
    ConnectionCandidate::direct(id, "192.0.2.2", "", 4000 + id as u16, [id as u8; 16])
}

fn test_config(transport: Arc<MockTransport>, primary: ConnectionCandidate) -> CallConfig {
    let mut config = CallConfig::new(
        Arc::new(ThreadSerialExecutor::new("call-queue")),
        SECRET.to_vec(),
        true,
        primary,
    );
    config.transport = transport;
    config.derived_state = DerivedState::initial().to_bytes();
    config.per_attempt_timeout = Duration::from_millis(500);
    config.overall_probe_timeout = Duration::from_secs(2);
    config.max_reconnect_attempts = 2;
    config.min_rated_duration = Duration::from_millis(50);
    config
}

async fn next_event(events: &mut mpsc::Receiver<CallEvent>) -> CallEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within 5s");
}

async fn stop_and_collect(session: &CallSession) -> CallStats {
    let (tx, rx) = tokio::sync::oneshot::channel();
    session.stop(move |stats| {
        let _ = tx.send(stats);
    });
    tokio::time::timeout(Duration::from_secs(5), rx)
        .await
        .expect("timed out waiting for stats")
        .expect("completion dropped")
}

#[tokio::test]
async fn connects_via_fastest_candidate() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::Hang);
    transport.script(2, ScriptedOutcome::succeed_after(Duration::from_millis(20)));

    let config = test_config(transport, relay(1)).with_alternatives(vec![relay(2)]);
    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();

    assert_eq!(session.state(), CallState::Initializing);
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(next_event(&mut events).await, CallEvent::SignalBarsChanged(4));
    assert_eq!(session.state(), CallState::Connected);
    assert!(session.signal_bars() >= 1);

    stop_and_collect(&session).await;
}

#[tokio::test]
async fn incompatible_layer_fails_without_probing() {
    let transport = Arc::new(MockTransport::new());
    let mut config = test_config(transport.clone(), relay(1));
    config.max_layer = 40;

    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Failed(CallFailure::IncompatibleLayer))
    );
    assert!(transport.attempted().is_empty());
}

#[tokio::test]
async fn first_probe_failure_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::fail_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport, relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Failed(CallFailure::NoViableCandidate))
    );
    assert!(!session.need_rate());
}

#[tokio::test]
async fn p2p_disabled_never_selects_direct_candidate() {
    let transport = Arc::new(MockTransport::new());
    // The direct candidate would win instantly if it were allowed.
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(1)));
    transport.script(2, ScriptedOutcome::succeed_after(Duration::from_millis(40)));

    let mut config = test_config(transport.clone(), direct(1)).with_alternatives(vec![relay(2)]);
    config.allow_p2p = false;

    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(transport.attempted(), vec![2]);

    stop_and_collect(&session).await;
}

#[tokio::test]
async fn network_switch_reconnects_and_splits_telemetry() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(10)));

    let config = test_config(transport.clone(), relay(1))
        .with_network_type(NetworkType::Wifi);
    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(next_event(&mut events).await, CallEvent::SignalBarsChanged(4));

    // One frame while on wifi.
    session.send_media_frame(vec![0xaa; 100]);
    wait_until(|| {
        transport
            .endpoint(1)
            .map(|e| e.sent().len() == 1)
            .unwrap_or(false)
    })
    .await;
    let wifi_wire_len = transport.endpoint(1).unwrap().sent()[0].len() as u64;

    // Wi-Fi to LTE changes the traffic class: the active path is invalid.
    session.set_network_type(NetworkType::Lte);
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Reconnecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(session.network_type(), NetworkType::Lte);

    // The reconnection rekeyed with the next generation.
    let rotated = DerivedState::from_bytes(&session.get_derived_state()).unwrap();
    assert_eq!(rotated.generation(), 1);

    // One frame on mobile, accounted to the other bucket.
    session.send_media_frame(vec![0xbb; 40]);
    wait_until(|| {
        transport
            .endpoint(1)
            .map(|e| e.sent().len() == 1)
            .unwrap_or(false)
    })
    .await;
    let mobile_wire_len = transport.endpoint(1).unwrap().sent()[0].len() as u64;

    let stats = stop_and_collect(&session).await;
    assert_eq!(stats.bytes_sent_wifi, wifi_wire_len);
    assert_eq!(stats.bytes_sent_mobile, mobile_wire_len);
    assert_eq!(stats.bytes_received_wifi, 0);
    assert_eq!(stats.bytes_received_mobile, 0);
    assert!(stats.debug_log.contains("network class changed"));
}

#[tokio::test]
async fn reconnect_budget_exhaustion_is_terminal() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let config = test_config(transport.clone(), relay(1)).with_network_type(NetworkType::Wifi);
    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(next_event(&mut events).await, CallEvent::SignalBarsChanged(4));

    // Every re-probe now fails; the budget is two attempts.
    transport.script(1, ScriptedOutcome::fail_after(Duration::from_millis(5)));
    session.set_network_type(NetworkType::Lte);

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Reconnecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Failed(CallFailure::NoViableCandidate))
    );
}

#[tokio::test]
async fn explicit_timeout_report_triggers_reconnect() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport, relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(next_event(&mut events).await, CallEvent::SignalBarsChanged(4));

    session.report_transport_timeout();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Reconnecting)
    );
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    stop_and_collect(&session).await;
}

#[tokio::test]
async fn stop_delivers_exactly_one_report() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport.clone(), relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    let deliveries = Arc::new(AtomicUsize::new(0));

    let first = deliveries.clone();
    let (tx, rx) = tokio::sync::oneshot::channel();
    session.stop(move |_| {
        first.fetch_add(1, Ordering::SeqCst);
        let _ = tx.send(());
    });
    rx.await.unwrap();

    let second = deliveries.clone();
    session.stop(move |_| {
        second.fetch_add(1, Ordering::SeqCst);
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    // The transport was torn down by the first stop.
    assert!(transport.endpoint(1).unwrap().is_closed());
}

#[tokio::test]
async fn need_rate_true_only_after_connected_minimum() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport, relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    assert!(!session.need_rate());
    tokio::time::sleep(Duration::from_millis(80)).await;
    stop_and_collect(&session).await;
    assert!(session.need_rate());
}

#[tokio::test]
async fn trivially_short_call_is_not_rated() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut config = test_config(transport, relay(1));
    config.min_rated_duration = Duration::from_secs(10);
    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    stop_and_collect(&session).await;
    assert!(!session.need_rate());
}

#[tokio::test]
async fn outbound_media_decrypts_with_peer_keys() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let derived_bytes = DerivedState::initial().to_bytes();
    let mut config = test_config(transport.clone(), relay(1));
    config.derived_state = derived_bytes.clone();

    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    let payload = b"one opus frame".to_vec();
    session.send_media_frame(payload.clone());
    wait_until(|| {
        transport
            .endpoint(1)
            .map(|e| !e.sent().is_empty())
            .unwrap_or(false)
    })
    .await;

    // The callee derives complementary keys from the same inputs.
    let peer_secret = SharedSecret::new(&SECRET, false).unwrap();
    let peer_derived = DerivedState::from_bytes(&derived_bytes).unwrap();
    let peer_keys = derive_keys(&peer_secret, &peer_derived);

    let wire = transport.endpoint(1).unwrap().sent()[0].clone();
    let WireFrame::Media {
        counter,
        mut ciphertext,
    } = WireFrame::decode(&wire).unwrap()
    else {
        panic!("expected a media frame");
    };
    ctr::decrypt_media_frame(
        &mut ciphertext,
        &peer_keys.recv_key,
        &ctr::media_nonce(&peer_keys.recv_iv),
        counter,
    );
    assert_eq!(frames::open(&ciphertext).unwrap(), payload);

    stop_and_collect(&session).await;
}

#[tokio::test]
async fn inbound_media_reaches_the_media_stream() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let derived_bytes = DerivedState::initial().to_bytes();
    let mut config = test_config(transport.clone(), relay(1));
    config.derived_state = derived_bytes.clone();

    let mut session = CallSession::new(config).unwrap();
    let mut events = session.take_events().unwrap();
    let mut media = session.take_media().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    // The peer encrypts with its own send direction.
    let peer_secret = SharedSecret::new(&SECRET, false).unwrap();
    let peer_keys = derive_keys(
        &peer_secret,
        &DerivedState::from_bytes(&derived_bytes).unwrap(),
    );
    let payload = b"remote voice".to_vec();
    let mut sealed = frames::seal(&payload);
    ctr::encrypt_media_frame(
        &mut sealed,
        &peer_keys.send_key,
        &ctr::media_nonce(&peer_keys.send_iv),
        0,
    );
    let wire = WireFrame::Media {
        counter: 0,
        ciphertext: sealed,
    }
    .encode();
    transport.endpoint(1).unwrap().push_inbound(wire);

    let received = tokio::time::timeout(Duration::from_secs(5), media.recv())
        .await
        .expect("timed out waiting for media")
        .expect("media channel closed");
    assert_eq!(received, payload);

    let stats = stop_and_collect(&session).await;
    assert!(stats.bytes_received_wifi > 0);
}

#[tokio::test]
async fn tampered_inbound_frame_is_fatal() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport.clone(), relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );
    assert_eq!(next_event(&mut events).await, CallEvent::SignalBarsChanged(4));

    // Valid framing, garbage ciphertext: decrypts to noise and fails the
    // integrity check.
    let wire = WireFrame::Media {
        counter: 0,
        ciphertext: vec![0x5a; 64],
    }
    .encode();
    transport.endpoint(1).unwrap().push_inbound(wire);

    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Failed(CallFailure::CryptoFailure))
    );
    assert!(session.state().is_terminal());
}

#[tokio::test]
async fn fingerprint_is_stable_per_secret() {
    let transport = Arc::new(MockTransport::new());
    let session = CallSession::new(test_config(transport.clone(), relay(1))).unwrap();
    let again = CallSession::new(test_config(transport, relay(1))).unwrap();

    let a = session.key_fingerprint(4).unwrap();
    let b = again.key_fingerprint(4).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.len(), 4);
}

#[tokio::test]
async fn capability_surface_is_advertised() {
    assert_eq!(peercall_session_core::max_supported_layer(), 92);
    assert_eq!(peercall_session_core::min_supported_layer(), 65);
    assert!(!peercall_session_core::version_string().is_empty());
}

#[tokio::test]
async fn mute_is_local_state_only() {
    let transport = Arc::new(MockTransport::new());
    transport.script(1, ScriptedOutcome::succeed_after(Duration::from_millis(5)));

    let mut session = CallSession::new(test_config(transport, relay(1))).unwrap();
    let mut events = session.take_events().unwrap();
    session.start();
    assert_eq!(
        next_event(&mut events).await,
        CallEvent::StateChanged(CallState::Connected)
    );

    session.set_is_muted(true);
    wait_until(|| session.is_muted()).await;
    assert_eq!(session.state(), CallState::Connected);

    stop_and_collect(&session).await;
}

#[tokio::test]
async fn audio_devices_bind_through_the_directory() {
    use peercall_audio_core::{
        AudioDeviceDirectory, AudioDeviceRef, AudioDirection, MockBackend,
    };

    let backend = MockBackend::with_defaults();
    backend.plug(
        AudioDirection::Input,
        AudioDeviceRef::new("headset-mic", "Headset Microphone"),
    );
    let directory = Arc::new(AudioDeviceDirectory::new(backend));

    let transport = Arc::new(MockTransport::new());
    let session = CallSession::new(
        test_config(transport, relay(1)).with_audio_directory(directory.clone()),
    )
    .unwrap();

    session.switch_audio_input("headset-mic");
    assert_eq!(
        directory.current_input_device_id().as_deref(),
        Some("headset-mic")
    );
}

#[tokio::test]
async fn layer_gate_is_deterministic_on_a_manual_executor() {
    use peercall_infra_common::ManualExecutor;

    let executor = ManualExecutor::new();
    let transport = Arc::new(MockTransport::new());
    let mut config = test_config(transport, relay(1));
    config.executor = executor.clone();
    config.max_layer = 1;

    let session = CallSession::new(config).unwrap();
    session.start();
    // Nothing happens until the test drains the queue.
    assert_eq!(session.state(), CallState::Initializing);

    executor.run_until_idle();
    assert_eq!(
        session.state(),
        CallState::Failed(CallFailure::IncompatibleLayer)
    );
}
