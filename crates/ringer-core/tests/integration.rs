//! Integration tests for ringer-core.
//!
//! These run the full scan → bond → session → command lifecycle against the
//! mock transport with a paused clock, so every timer (scan window, connect
//! timeout, retry backoff) is exercised deterministically without hardware.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, sleep};

use ringer_core::controller::{LinkConfig, LinkController};
use ringer_core::error::Error;
use ringer_core::events::HostEvent;
use ringer_core::mock::{MockGate, MockTransport};
use ringer_core::scan::ScanOptions;
use ringer_core::transport::{RadioState, TransportEvent};
use ringer_core::{
    Address, BondState, Capability, CommandResult, CommandTarget, DisconnectCode,
    PeripheralHandle, SessionState,
};
use ringer_types::uuids::{COMMAND_CHARACTERISTIC, RINGER_SERVICE};

fn addr(last: u8) -> Address {
    format!("AA:BB:CC:DD:EE:{last:02X}").parse().unwrap()
}

fn handle(last: u8, name: &str) -> PeripheralHandle {
    PeripheralHandle::new(format!("id-{last}"), Some(name.to_string()), addr(last))
}

fn controller(mock: &Arc<MockTransport>, gate: &Arc<MockGate>) -> LinkController {
    LinkController::new(mock.clone(), gate.clone(), LinkConfig::default()).unwrap()
}

/// Let the supervisor task drain its queues without advancing past timers.
async fn settle() {
    sleep(Duration::from_millis(1)).await;
}

/// Set up a controller whose peripheral is already bonded and whose
/// transport completes connects and discovery by itself.
fn ready_fixture() -> (Arc<MockTransport>, Arc<MockGate>, LinkController, PeripheralHandle) {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let peripheral = handle(0x01, "RingerDevice");

    mock.set_bond_state(peripheral.address.clone(), BondState::Bonded);
    mock.set_auto_connect(true);
    mock.add_service(RINGER_SERVICE, &[COMMAND_CHARACTERISTIC]);

    let controller = controller(&mock, &gate);
    (mock, gate, controller, peripheral)
}

// --- Scanner ---

#[tokio::test(start_paused = true)]
async fn scan_dedups_by_address_in_first_seen_order() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let controller = controller(&mock, &gate);

    let script = mock.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        script.emit(TransportEvent::Sighting {
            handle: handle(0x01, "first"),
            rssi: Some(-50),
        });
        sleep(Duration::from_secs(1)).await;
        script.emit(TransportEvent::Sighting {
            handle: handle(0x02, "second"),
            rssi: Some(-60),
        });
        // Same address as the first sighting, different name.
        script.emit(TransportEvent::Sighting {
            handle: handle(0x01, "first-again"),
            rssi: Some(-55),
        });
    });

    let started = Instant::now();
    let devices = controller.scan(ScanOptions::default()).await.unwrap();

    assert_eq!(started.elapsed(), Duration::from_secs(10));
    assert_eq!(devices.len(), 2);
    let names: Vec<_> = devices.iter().map(|h| h.display_name().to_string()).collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(mock.discovery_stops(), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_short_circuits_on_target_name() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let controller = controller(&mock, &gate);

    let script = mock.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        script.emit(TransportEvent::Sighting {
            handle: handle(0x07, "OtherThing"),
            rssi: None,
        });
        script.emit(TransportEvent::Sighting {
            handle: handle(0x01, "RingerDevice"),
            rssi: None,
        });
    });

    let started = Instant::now();
    let devices = controller
        .scan(ScanOptions::default().target_ringer())
        .await
        .unwrap();

    // Delivered immediately on the match, well before the 10 s window.
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(devices.iter().any(|h| h.display_name() == "RingerDevice"));
}

#[tokio::test(start_paused = true)]
async fn scan_failure_delivers_partial_results() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let controller = controller(&mock, &gate);

    let script = mock.clone();
    tokio::spawn(async move {
        sleep(Duration::from_secs(1)).await;
        script.emit(TransportEvent::Sighting {
            handle: handle(0x01, "first"),
            rssi: None,
        });
        script.emit(TransportEvent::ScanFailed { code: 2 });
    });

    let started = Instant::now();
    let devices = controller.scan(ScanOptions::default()).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(devices.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn scan_stop_cancels_pending_timeout() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let controller = Arc::new(controller(&mock, &gate));

    let scanning = controller.clone();
    let scan_task =
        tokio::spawn(async move { scanning.scan(ScanOptions::default()).await.unwrap() });

    settle().await;
    mock.emit(TransportEvent::Sighting {
        handle: handle(0x01, "first"),
        rssi: None,
    });
    settle().await;

    let started = Instant::now();
    controller.stop_scan();
    let devices = scan_task.await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(devices.len(), 1);
    assert_eq!(mock.discovery_stops(), 1);

    // Stopping again with no scan active is a no-op.
    controller.stop_scan();
}

#[tokio::test]
async fn scan_reports_radio_environment_failures_distinctly() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let controller = controller(&mock, &gate);

    mock.set_radio_state(RadioState::Absent);
    assert!(matches!(
        controller.scan(ScanOptions::default()).await,
        Err(Error::Unsupported)
    ));

    mock.set_radio_state(RadioState::Off);
    assert!(matches!(
        controller.scan(ScanOptions::default()).await,
        Err(Error::RadioDisabled)
    ));

    assert_eq!(mock.discovery_starts(), 0);
}

#[tokio::test]
async fn scan_without_permission_aborts_and_requests() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::denying_all());
    let controller = controller(&mock, &gate);

    let err = controller.scan(ScanOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::PermissionDenied { .. }));
    assert_eq!(mock.discovery_starts(), 0);
    assert_eq!(gate.requests().len(), 1);
}

// --- Bonder ---

#[tokio::test(start_paused = true)]
async fn already_bonded_proceeds_straight_to_connecting() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    let mut events = controller.subscribe();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;

    // No handshake was run.
    assert!(mock.bond_requests().is_empty());
    // The session went straight through connecting to ready.
    assert_eq!(mock.connect_calls(), vec![peripheral.address.clone()]);
    assert_eq!(controller.session_state(), SessionState::Ready);
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::Paired { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn bond_handshake_success_filters_foreign_addresses() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    mock.set_bond_state(peripheral.address.clone(), BondState::None);

    let script = mock.clone();
    let target = peripheral.address.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        // Another peripheral's transitions must be ignored.
        script.emit(TransportEvent::BondStateChanged {
            address: addr(0x99),
            state: BondState::None,
        });
        script.emit(TransportEvent::BondStateChanged {
            address: target.clone(),
            state: BondState::Bonding,
        });
        sleep(Duration::from_millis(10)).await;
        script.emit(TransportEvent::BondStateChanged {
            address: target,
            state: BondState::Bonded,
        });
    });

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;

    assert_eq!(mock.bond_requests(), vec![peripheral.address.clone()]);
    assert_eq!(controller.session_state(), SessionState::Ready);
}

#[tokio::test(start_paused = true)]
async fn bond_removed_fails_without_session_attempt() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    mock.set_bond_state(peripheral.address.clone(), BondState::None);
    let mut events = controller.subscribe();

    let script = mock.clone();
    let target = peripheral.address.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(10)).await;
        script.emit(TransportEvent::BondStateChanged {
            address: target.clone(),
            state: BondState::Bonding,
        });
        script.emit(TransportEvent::BondStateChanged {
            address: target,
            state: BondState::None,
        });
    });

    let err = controller.pair(peripheral).await.unwrap_err();
    assert!(matches!(err, Error::BondFailed { .. }));
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::PairingFailed { .. }
    ));
    // Bond failure never reaches the session controller.
    assert!(mock.connect_calls().is_empty());
}

#[tokio::test]
async fn bond_request_rejection_fails_immediately() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    mock.set_bond_state(peripheral.address.clone(), BondState::None);
    mock.set_reject_bond_request(true);

    let err = controller.pair(peripheral).await.unwrap_err();
    assert!(matches!(err, Error::BondFailed { .. }));
    assert!(mock.connect_calls().is_empty());
}

// --- Session controller ---

#[tokio::test(start_paused = true)]
async fn link_loss_retries_after_fixed_backoff_without_failure_callback() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    let mut events = controller.subscribe();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;
    assert_eq!(controller.session_state(), SessionState::Ready);
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::Paired { .. }
    ));

    // The link drops with the transient code.
    mock.emit(TransportEvent::Disconnected {
        address: peripheral.address.clone(),
        code: DisconnectCode::LINK_LOSS,
    });
    settle().await;

    // Back in connecting, but no reconnect before the 3 s backoff elapses.
    assert_eq!(controller.session_state(), SessionState::Connecting);
    assert_eq!(mock.connect_calls().len(), 1);

    sleep(Duration::from_secs(4)).await;

    assert_eq!(mock.connect_calls().len(), 2);
    assert_eq!(controller.session_state(), SessionState::Ready);
    // The recovery produced a fresh paired notification and never a failure.
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::Paired { .. }
    ));
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn terminal_disconnect_fails_exactly_once_without_retry() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    let mut events = controller.subscribe();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::Paired { .. }
    ));

    mock.emit(TransportEvent::Disconnected {
        address: peripheral.address.clone(),
        code: DisconnectCode(8),
    });
    settle().await;

    assert_eq!(controller.session_state(), SessionState::Failed);
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::PairingFailed { .. }
    ));

    // No backoff timer is pending; nothing further happens.
    sleep(Duration::from_secs(10)).await;
    assert_eq!(mock.connect_calls().len(), 1);
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn silent_connect_attempt_times_out_and_retries() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    // The transport accepts the open but never reports connected.
    mock.set_auto_connect(false);

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;
    assert_eq!(mock.connect_calls().len(), 1);
    assert!(mock.disconnect_calls().is_empty());

    // At 10 s the attempt is force-closed.
    sleep(Duration::from_secs(10)).await;
    settle().await;
    assert!(!mock.disconnect_calls().is_empty());
    assert_eq!(mock.connect_calls().len(), 1);
    assert_eq!(controller.session_state(), SessionState::Connecting);

    // After the 3 s backoff the connect is re-issued.
    sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(mock.connect_calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn service_discovery_failure_is_terminal() {
    let (mock, _gate, controller, peripheral) = ready_fixture();
    mock.set_auto_discover(false);
    let mut events = controller.subscribe();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;
    assert_eq!(controller.session_state(), SessionState::DiscoveringServices);

    mock.emit(TransportEvent::ServicesDiscovered {
        address: peripheral.address.clone(),
        success: false,
    });
    settle().await;

    assert_eq!(controller.session_state(), SessionState::Failed);
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::PairingFailed { .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn stop_tears_down_and_ignores_late_events() {
    let (mock, _gate, controller, peripheral) = ready_fixture();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;
    assert_eq!(controller.session_state(), SessionState::Ready);

    controller.stop().await;
    settle().await;
    assert_eq!(controller.session_state(), SessionState::Disconnected);
    assert!(!mock.disconnect_calls().is_empty());

    // A late link-loss callback against the torn-down session is dropped.
    mock.emit(TransportEvent::Disconnected {
        address: peripheral.address.clone(),
        code: DisconnectCode::LINK_LOSS,
    });
    sleep(Duration::from_secs(5)).await;
    assert_eq!(controller.session_state(), SessionState::Disconnected);
    assert_eq!(mock.connect_calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn second_pair_while_active_is_rejected() {
    let (_mock, _gate, controller, peripheral) = ready_fixture();

    controller.pair(peripheral.clone()).await.unwrap();
    settle().await;

    let err = controller.pair(peripheral).await.unwrap_err();
    assert!(matches!(err, Error::Busy { .. }));
}

#[tokio::test(start_paused = true)]
async fn capped_retry_budget_surfaces_one_failure() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let peripheral = handle(0x01, "RingerDevice");
    mock.set_bond_state(peripheral.address.clone(), BondState::Bonded);
    // Never connects: every attempt times out.
    mock.set_auto_connect(false);

    let config = LinkConfig::default().session(
        ringer_core::SessionOptions::new()
            .retry(ringer_core::RetryPolicy::new().max_attempts(2)),
    );
    let controller = LinkController::new(mock.clone(), gate, config).unwrap();
    let mut events = controller.subscribe();

    controller.pair(peripheral).await.unwrap();

    // Attempt 1 times out at 10 s, retries at 13 s; attempt 2 times out at
    // 23 s, retries at 26 s; attempt 3 times out at 36 s and the budget is
    // spent.
    sleep(Duration::from_secs(40)).await;
    settle().await;

    assert_eq!(controller.session_state(), SessionState::Failed);
    assert_eq!(mock.connect_calls().len(), 3);
    assert!(matches!(
        events.recv().await.unwrap(),
        HostEvent::PairingFailed { .. }
    ));
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

// --- Command channel ---

#[tokio::test(start_paused = true)]
async fn send_on_ready_session_echoes_payload() {
    let (mock, _gate, controller, peripheral) = ready_fixture();

    controller.pair(peripheral).await.unwrap();
    settle().await;

    let result = controller.send(&b"ring"[..]).await;
    assert_eq!(
        result,
        CommandResult::Sent(bytes::Bytes::from_static(b"ring"))
    );

    let writes = mock.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].service, RINGER_SERVICE);
    assert_eq!(writes[0].characteristic, COMMAND_CHARACTERISTIC);
    assert_eq!(writes[0].payload, b"ring");
}

#[tokio::test]
async fn send_before_ready_does_not_touch_transport() {
    let (mock, _gate, controller, _peripheral) = ready_fixture();

    let result = controller.send(&b"ring"[..]).await;
    assert_eq!(result, CommandResult::SessionUnavailable);
    assert!(mock.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn send_distinguishes_resolution_failures() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let peripheral = handle(0x01, "RingerDevice");
    mock.set_bond_state(peripheral.address.clone(), BondState::Bonded);
    mock.set_auto_connect(true);

    let controller = controller(&mock, &gate);
    controller.pair(peripheral).await.unwrap();
    settle().await;

    // No services at all.
    assert_eq!(
        controller.send(&b"ring"[..]).await,
        CommandResult::ServiceNotFound
    );

    // Service present, characteristic missing.
    mock.add_service(RINGER_SERVICE, &[]);
    assert_eq!(
        controller.send(&b"ring"[..]).await,
        CommandResult::CharacteristicNotFound
    );

    // Fully resolvable but the transport refuses the write.
    mock.add_service(RINGER_SERVICE, &[COMMAND_CHARACTERISTIC]);
    mock.set_reject_writes(true);
    assert_eq!(
        controller.send(&b"ring"[..]).await,
        CommandResult::WriteRejected
    );
}

#[tokio::test(start_paused = true)]
async fn send_without_connect_capability_is_permission_denied() {
    let (mock, gate, controller, peripheral) = ready_fixture();

    controller.pair(peripheral).await.unwrap();
    settle().await;

    gate.revoke(Capability::Connect);
    assert_eq!(
        controller.send(&b"ring"[..]).await,
        CommandResult::PermissionDenied
    );
    assert!(mock.writes().is_empty());
}

#[tokio::test(start_paused = true)]
async fn custom_command_target_is_honored() {
    let mock = Arc::new(MockTransport::new());
    let gate = Arc::new(MockGate::granting_all());
    let peripheral = handle(0x01, "RingerDevice");
    mock.set_bond_state(peripheral.address.clone(), BondState::Bonded);
    mock.set_auto_connect(true);

    let service = uuid::Uuid::new_v4();
    let characteristic = uuid::Uuid::new_v4();
    mock.add_service(service, &[characteristic]);

    let config = LinkConfig::default().target(CommandTarget {
        service,
        characteristic,
    });
    let controller = LinkController::new(mock.clone(), gate, config).unwrap();

    controller.pair(peripheral).await.unwrap();
    settle().await;

    assert!(controller.send(&b"ring"[..]).await.is_sent());
    assert_eq!(mock.writes()[0].service, service);
}
