//! Top-level link controller.
//!
//! Ties the scanner, bonder, session controller, and command channel
//! together behind one handle, owning the single active peripheral session.
//! Hosts drive it in the order the lifecycle runs: `scan` → pick a handle →
//! `pair` → `send`, with outcomes delivered as [`HostEvent`]s.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;

use ringer_types::{Address, DiscoverySet, PeripheralHandle, SessionState};

use crate::bond::{BondOptions, Bonder};
use crate::command::{CommandChannel, CommandResult, CommandTarget};
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, HostEvent, HostEventReceiver};
use crate::gate::{OsPolicy, PermissionGate};
use crate::scan::{ScanOptions, Scanner};
use crate::session::{SessionController, SessionOptions};
use crate::transport::Transport;

/// Configuration for a [`LinkController`].
#[derive(Debug, Clone, Default)]
pub struct LinkConfig {
    /// OS-version policy for capability requirements.
    pub policy: OsPolicy,
    /// Session controller options (connect timeout, retry policy).
    pub session: SessionOptions,
    /// Bonding options.
    pub bond: BondOptions,
    /// Where command writes land.
    pub target: CommandTarget,
}

impl LinkConfig {
    /// Create a config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the OS policy.
    #[must_use]
    pub fn policy(mut self, policy: OsPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the session options.
    #[must_use]
    pub fn session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    /// Set the bond options.
    #[must_use]
    pub fn bond(mut self, bond: BondOptions) -> Self {
        self.bond = bond;
        self
    }

    /// Set the command target.
    #[must_use]
    pub fn target(mut self, target: CommandTarget) -> Self {
        self.target = target;
        self
    }

    /// Validate the config and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        self.bond.validate()
    }
}

/// One controller, one peripheral session.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use ringer_core::controller::{LinkConfig, LinkController};
/// use ringer_core::gate::AlwaysGranted;
/// use ringer_core::platform::BtleTransport;
/// use ringer_core::scan::ScanOptions;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let transport = Arc::new(BtleTransport::new().await?);
///     let controller =
///         LinkController::new(transport, Arc::new(AlwaysGranted), LinkConfig::default())?;
///
///     let devices = controller.scan(ScanOptions::default().target_ringer()).await?;
///     if let Some(peripheral) = devices.iter().next() {
///         controller.pair(peripheral.clone()).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct LinkController {
    dispatcher: EventDispatcher,
    scanner: Scanner,
    bonder: Bonder,
    session: SessionController,
    command: CommandChannel,
    transport: Arc<dyn Transport>,
    bond_options: BondOptions,
}

impl LinkController {
    /// Create a controller over the given transport and permission gate.
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<dyn PermissionGate>,
        config: LinkConfig,
    ) -> Result<Self> {
        config.validate()?;

        let dispatcher = EventDispatcher::default();
        let scanner = Scanner::new(transport.clone(), gate.clone(), config.policy);
        let bonder = Bonder::new(transport.clone(), gate.clone(), config.policy);
        let session = SessionController::spawn(
            transport.clone(),
            gate.clone(),
            dispatcher.clone(),
            config.session.clone(),
        )?;
        let command = CommandChannel::new(
            transport.clone(),
            gate,
            session.watch_state(),
            config.target,
        );

        Ok(Self {
            dispatcher,
            scanner,
            bonder,
            session,
            command,
            transport,
            bond_options: config.bond,
        })
    }

    /// Subscribe to host events.
    pub fn subscribe(&self) -> HostEventReceiver {
        self.dispatcher.subscribe()
    }

    /// Run one discovery window.
    ///
    /// The resulting set is also delivered as [`HostEvent::ScanComplete`].
    pub async fn scan(&self, options: ScanOptions) -> Result<DiscoverySet> {
        let devices = self.scanner.scan(options).await?;
        self.dispatcher.send(HostEvent::ScanComplete {
            devices: devices.clone(),
        });
        Ok(devices)
    }

    /// Cancel the in-flight scan, if any. No-op when idle.
    pub fn stop_scan(&self) {
        self.scanner.stop();
    }

    /// Bond with the peripheral, then establish the session.
    ///
    /// An already-bonded peripheral proceeds straight to connecting. The
    /// session outcome arrives as [`HostEvent::Paired`] or
    /// [`HostEvent::PairingFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error for environment failures and for bond handshake
    /// failures (which are also surfaced as [`HostEvent::PairingFailed`],
    /// exactly once).
    pub async fn pair(&self, peripheral: PeripheralHandle) -> Result<()> {
        let outcome = self.bonder.bond(&peripheral, self.bond_options).await?;
        if let crate::bond::BondOutcome::Failed(reason) = outcome {
            self.dispatcher.send(HostEvent::PairingFailed {
                peripheral: peripheral.clone(),
            });
            return Err(Error::bond_failed(peripheral.address, reason));
        }
        self.session.connect(peripheral).await
    }

    /// Pair with a peripheral known only by address, without a prior scan.
    pub async fn pair_address(&self, address: &Address) -> Result<()> {
        let peripheral = self.transport.peripheral_by_address(address).await?;
        self.pair(peripheral).await
    }

    /// Send a command over the active session.
    pub async fn send(&self, payload: impl Into<Bytes>) -> CommandResult {
        self.command.send(payload).await
    }

    /// Tear everything down: cancel the scan and close the session.
    pub async fn stop(&self) {
        self.scanner.stop();
        self.session.stop().await;
    }

    /// Current session state.
    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    /// Watch session state changes.
    pub fn watch_session(&self) -> watch::Receiver<SessionState> {
        self.session.watch_state()
    }
}
