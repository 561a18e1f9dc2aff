//! GATT session lifecycle controller.
//!
//! The session controller owns the connect → discover-services → ready
//! lifecycle for the single active peripheral session, supervises
//! disconnects, and applies the transient-failure retry policy.
//!
//! The logic is split in two:
//!
//! - [`SessionMachine`] is a pure state machine: tagged-variant inputs in,
//!   state transition plus a list of [`SessionAction`]s out. No transport, no
//!   timers, no channels — the retry/backoff/timeout policy is testable on
//!   its own.
//! - [`SessionController`] spawns the supervisor task that owns the machine.
//!   Transport events, timer firings, and external commands all funnel into
//!   that one task, which is therefore the sole writer of session state.
//!   Timers are armed with the current attempt epoch; a firing whose epoch no
//!   longer matches is recognized as stale and dropped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, trace, warn};

use ringer_types::{Capability, DisconnectCode, PeripheralHandle, SessionState};

use crate::error::{Error, Result};
use crate::events::{EventDispatcher, HostEvent};
use crate::gate::{PermissionGate, ensure};
use crate::retry::{RetryBudget, RetryPolicy};
use crate::transport::{Transport, TransportEvent};

/// Default time allowed for a connection attempt to reach connected.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Options for the session controller.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// How long a connection attempt may stay silent before it is
    /// force-closed and retried.
    pub connect_timeout: Duration,
    /// Policy for the transient-failure retry path.
    pub retry: RetryPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionOptions {
    /// Create options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout.is_zero() {
            return Err(Error::invalid_config("connect timeout must be > 0"));
        }
        self.retry.validate()
    }
}

/// Inputs to the session state machine.
#[derive(Debug, Clone)]
pub enum SessionInput {
    /// External request to establish a session with this peripheral.
    Connect(PeripheralHandle),
    /// The transport reported the link as connected.
    TransportConnected,
    /// The transport reported a disconnect with the given status code.
    TransportDisconnected(DisconnectCode),
    /// Service discovery finished.
    ServicesDiscovered {
        /// Whether the service table is usable.
        success: bool,
    },
    /// The connection-attempt timer fired.
    ConnectTimeout,
    /// The retry backoff delay elapsed.
    BackoffElapsed,
    /// External teardown request.
    Stop,
}

/// Side effects the supervisor must perform after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Open a GATT connection to the current peripheral. Closing any prior
    /// connection first is part of the transport's open contract.
    OpenGatt,
    /// Force-close the GATT connection.
    CloseGatt,
    /// Arm the connection-attempt timer for the current epoch.
    ArmConnectTimer,
    /// Cancel the pending connection-attempt timer.
    CancelConnectTimer,
    /// Arm the retry backoff timer.
    ArmBackoffTimer,
    /// Request service discovery on the established link.
    RequestServiceDiscovery,
    /// Notify the host that the session is paired and ready.
    NotifyPaired,
    /// Notify the host that pairing failed. Emitted at most once per attempt
    /// sequence.
    NotifyPairingFailed,
}

/// Pure state machine for the session lifecycle.
///
/// Inputs that do not apply to the current state — a timeout for an attempt
/// that already finished, a disconnect echo while waiting out the backoff —
/// are recognized as stale and produce no actions.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    /// Set while a retry is waiting out the backoff delay; distinguishes
    /// "connecting, attempt in flight" from "connecting, waiting to retry".
    awaiting_backoff: bool,
    budget: RetryBudget,
    peripheral: Option<PeripheralHandle>,
}

impl SessionMachine {
    /// Create a machine in the idle state.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            state: SessionState::Idle,
            awaiting_backoff: false,
            budget: RetryBudget::new(policy),
            peripheral: None,
        }
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The peripheral this session targets, once a connect was requested.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        self.peripheral.as_ref()
    }

    /// Retries consumed in the current attempt sequence.
    pub fn retry_attempts(&self) -> u32 {
        self.budget.attempts()
    }

    /// Feed one input and return the actions the driver must perform.
    pub fn handle(&mut self, input: SessionInput) -> Vec<SessionAction> {
        use SessionAction::*;
        use SessionInput::*;

        match input {
            Connect(peripheral) => {
                if self.state.is_active() {
                    debug!("connect ignored, session already active");
                    return vec![];
                }
                self.peripheral = Some(peripheral);
                self.budget.reset();
                self.awaiting_backoff = false;
                self.state = SessionState::Connecting;
                vec![CancelConnectTimer, OpenGatt, ArmConnectTimer]
            }

            TransportConnected => {
                if self.state != SessionState::Connecting || self.awaiting_backoff {
                    trace!(state = %self.state, "stale connected event ignored");
                    return vec![];
                }
                self.state = SessionState::DiscoveringServices;
                vec![CancelConnectTimer, RequestServiceDiscovery]
            }

            TransportDisconnected(code) => {
                if !self.state.is_active() || self.awaiting_backoff {
                    trace!(%code, "stale disconnect ignored");
                    return vec![];
                }
                if code.is_link_loss() {
                    self.schedule_retry("link loss")
                } else {
                    warn!(%code, "terminal disconnect");
                    self.fail()
                }
            }

            ServicesDiscovered { success } => {
                if self.state != SessionState::DiscoveringServices {
                    trace!("stale service discovery result ignored");
                    return vec![];
                }
                if success {
                    self.state = SessionState::Ready;
                    self.budget.reset();
                    vec![NotifyPaired]
                } else {
                    warn!("service discovery failed");
                    self.fail()
                }
            }

            ConnectTimeout => {
                if self.state != SessionState::Connecting || self.awaiting_backoff {
                    trace!("stale connect timeout ignored");
                    return vec![];
                }
                self.schedule_retry("connect timeout")
            }

            BackoffElapsed => {
                if self.state != SessionState::Connecting || !self.awaiting_backoff {
                    trace!("stale backoff ignored");
                    return vec![];
                }
                self.awaiting_backoff = false;
                vec![OpenGatt, ArmConnectTimer]
            }

            Stop => {
                let was_active = self.state.is_active();
                self.state = SessionState::Disconnected;
                self.awaiting_backoff = false;
                if was_active {
                    vec![CancelConnectTimer, CloseGatt]
                } else {
                    vec![]
                }
            }
        }
    }

    /// Transient failure: force-close and retry after the backoff, or fail
    /// terminally when the budget is exhausted.
    fn schedule_retry(&mut self, cause: &str) -> Vec<SessionAction> {
        use SessionAction::*;
        if self.budget.try_consume() {
            info!(
                cause,
                attempt = self.budget.attempts(),
                "retrying after backoff"
            );
            self.state = SessionState::Connecting;
            self.awaiting_backoff = true;
            vec![CancelConnectTimer, CloseGatt, ArmBackoffTimer]
        } else {
            warn!(cause, attempts = self.budget.attempts(), "retries exhausted");
            self.fail()
        }
    }

    fn fail(&mut self) -> Vec<SessionAction> {
        use SessionAction::*;
        self.state = SessionState::Failed;
        self.awaiting_backoff = false;
        vec![CancelConnectTimer, CloseGatt, NotifyPairingFailed]
    }
}

/// Handle to the supervisor task driving the session lifecycle.
///
/// All state transitions happen on the supervisor task; this handle only
/// submits inputs and observes state.
pub struct SessionController {
    cmd_tx: mpsc::Sender<SessionInput>,
    state_rx: watch::Receiver<SessionState>,
}

impl SessionController {
    /// Validate options and spawn the supervisor task.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        gate: Arc<dyn PermissionGate>,
        dispatcher: EventDispatcher,
        options: SessionOptions,
    ) -> Result<Self> {
        options.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);

        let supervisor = Supervisor {
            machine: SessionMachine::new(options.retry),
            transport,
            gate,
            dispatcher,
            options,
            state_tx,
            epoch: 0,
            connect_deadline: None,
            backoff_deadline: None,
        };
        tokio::spawn(supervisor.run(cmd_rx));

        Ok(Self { cmd_tx, state_rx })
    }

    /// Request a session with the peripheral.
    ///
    /// Returns once the request is accepted; the outcome arrives as a
    /// [`HostEvent::Paired`] or [`HostEvent::PairingFailed`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Busy`] when a session is already active, or
    /// [`Error::Cancelled`] when the controller has shut down.
    pub async fn connect(&self, peripheral: PeripheralHandle) -> Result<()> {
        if self.state().is_active() {
            return Err(Error::Busy {
                operation: "session",
            });
        }
        self.cmd_tx
            .send(SessionInput::Connect(peripheral))
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Tear the session down: cancel timers, release listeners, close the
    /// connection.
    pub async fn stop(&self) {
        let _ = self.cmd_tx.send(SessionInput::Stop).await;
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state_rx.borrow()
    }

    /// Watch session state changes.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }
}

/// The single task that owns the machine and performs its actions.
struct Supervisor {
    machine: SessionMachine,
    transport: Arc<dyn Transport>,
    gate: Arc<dyn PermissionGate>,
    dispatcher: EventDispatcher,
    options: SessionOptions,
    state_tx: watch::Sender<SessionState>,
    /// Attempt epoch; bumped whenever the connect timer is armed. Timer
    /// deadlines carry the epoch they were armed under so a late firing is
    /// recognized and dropped.
    epoch: u64,
    connect_deadline: Option<(u64, Instant)>,
    backoff_deadline: Option<(u64, Instant)>,
}

impl Supervisor {
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionInput>) {
        let mut events = self.transport.subscribe();

        loop {
            let connect_at = self.connect_deadline;
            let backoff_at = self.backoff_deadline;

            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(input) => self.dispatch(input).await,
                    None => {
                        // Handle dropped; tear down and exit.
                        self.dispatch(SessionInput::Stop).await;
                        return;
                    }
                },
                Some(epoch) = fire_at(connect_at) => {
                    self.connect_deadline = None;
                    if epoch == self.epoch {
                        self.dispatch(SessionInput::ConnectTimeout).await;
                    } else {
                        trace!(epoch, current = self.epoch, "stale connect timer dropped");
                    }
                }
                Some(epoch) = fire_at(backoff_at) => {
                    self.backoff_deadline = None;
                    if epoch == self.epoch {
                        self.dispatch(SessionInput::BackoffElapsed).await;
                    } else {
                        trace!(epoch, current = self.epoch, "stale backoff timer dropped");
                    }
                }
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(input) = self.translate(event) {
                            self.dispatch(input).await;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "session event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        self.dispatch(SessionInput::Stop).await;
                        return;
                    }
                },
            }
        }
    }

    /// Map a transport event onto a machine input, dropping events that are
    /// not about the current peripheral.
    fn translate(&self, event: TransportEvent) -> Option<SessionInput> {
        let target = &self.machine.peripheral()?.address;
        match event {
            TransportEvent::Connected { address } if address == *target => {
                Some(SessionInput::TransportConnected)
            }
            TransportEvent::Disconnected { address, code } if address == *target => {
                Some(SessionInput::TransportDisconnected(code))
            }
            TransportEvent::ServicesDiscovered { address, success } if address == *target => {
                Some(SessionInput::ServicesDiscovered { success })
            }
            _ => None,
        }
    }

    async fn dispatch(&mut self, input: SessionInput) {
        let mut pending = vec![input];
        while let Some(input) = pending.pop() {
            let actions = self.machine.handle(input);
            for action in actions {
                if let Some(follow_up) = self.apply(action).await {
                    pending.push(follow_up);
                }
            }
        }
        let state = self.machine.state();
        if *self.state_tx.borrow() != state {
            debug!(%state, "session state changed");
            self.state_tx.send_replace(state);
        }
    }

    /// Perform one action. Returns a follow-up input when the action itself
    /// failed in a way the machine must hear about.
    async fn apply(&mut self, action: SessionAction) -> Option<SessionInput> {
        let peripheral = self.machine.peripheral().cloned();
        match action {
            SessionAction::OpenGatt => {
                let peripheral = peripheral?;
                if ensure(self.gate.as_ref(), &[Capability::Connect]).is_err() {
                    // Abort without the privileged call; the machine turns
                    // this into a terminal failure.
                    return Some(SessionInput::TransportDisconnected(DisconnectCode::UNKNOWN));
                }
                debug!(address = %peripheral.address, "opening GATT connection");
                if let Err(e) = self.transport.connect_gatt(&peripheral).await {
                    warn!(error = %e, "GATT open rejected");
                    return Some(SessionInput::TransportDisconnected(DisconnectCode::UNKNOWN));
                }
                None
            }
            SessionAction::CloseGatt => {
                let peripheral = peripheral?;
                if let Err(e) = self.transport.disconnect_gatt(&peripheral.address).await {
                    debug!(error = %e, "GATT close failed (already closed?)");
                }
                None
            }
            SessionAction::ArmConnectTimer => {
                self.epoch += 1;
                self.connect_deadline =
                    Some((self.epoch, Instant::now() + self.options.connect_timeout));
                None
            }
            SessionAction::CancelConnectTimer => {
                self.connect_deadline = None;
                None
            }
            SessionAction::ArmBackoffTimer => {
                self.epoch += 1;
                self.backoff_deadline =
                    Some((self.epoch, Instant::now() + self.options.retry.backoff));
                None
            }
            SessionAction::RequestServiceDiscovery => {
                let peripheral = peripheral?;
                if ensure(self.gate.as_ref(), &[Capability::Connect]).is_err() {
                    return Some(SessionInput::ServicesDiscovered { success: false });
                }
                debug!(address = %peripheral.address, "requesting service discovery");
                if let Err(e) = self.transport.discover_services(&peripheral.address).await {
                    warn!(error = %e, "service discovery request rejected");
                    return Some(SessionInput::ServicesDiscovered { success: false });
                }
                None
            }
            SessionAction::NotifyPaired => {
                let peripheral = peripheral?;
                info!(address = %peripheral.address, "paired");
                self.dispatcher.send(HostEvent::Paired { peripheral });
                None
            }
            SessionAction::NotifyPairingFailed => {
                let peripheral = peripheral?;
                info!(address = %peripheral.address, "pairing failed");
                self.dispatcher.send(HostEvent::PairingFailed { peripheral });
                None
            }
        }
    }
}

/// Await an armed deadline, yielding its epoch; pends forever when unarmed
/// so it never wins the select.
async fn fire_at(deadline: Option<(u64, Instant)>) -> Option<u64> {
    match deadline {
        Some((epoch, at)) => {
            sleep_until(at).await;
            Some(epoch)
        }
        None => std::future::pending().await,
    }
}
