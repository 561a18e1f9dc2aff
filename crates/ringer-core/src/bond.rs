//! Bonding (pairing) handshake orchestration.
//!
//! The bonder drives the OS-level bonding handshake for one selected
//! peripheral. Bond-state transitions arrive asynchronously on the shared
//! transport stream and are address-agnostic at the OS level, so the handler
//! filters by the target's address and releases its subscription as soon as a
//! terminal state (unbonded or bonded) is observed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, trace, warn};

use ringer_types::{Address, BondState, PeripheralHandle};

use crate::error::{BondFailureReason, Error, Result};
use crate::gate::{OsPolicy, PermissionGate, ensure};
use crate::transport::{Transport, TransportEvent, TransportEvents};

/// Options for one bonding attempt.
///
/// The baseline handshake has no timeout: the OS owns the pairing dialog and
/// can keep it open indefinitely. Hosts that want a bound set `timeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BondOptions {
    /// Upper bound on the wait for a terminal bond state, or `None` to wait
    /// indefinitely (the baseline).
    pub timeout: Option<Duration>,
}

impl BondOptions {
    /// Create options with the baseline behavior (no timeout).
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the wait for a terminal bond state.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.timeout == Some(Duration::ZERO) {
            return Err(Error::invalid_config("bond timeout must be > 0"));
        }
        Ok(())
    }
}

/// Outcome of one bonding attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BondOutcome {
    /// The peripheral was already bonded; nothing was done.
    AlreadyBonded,
    /// The handshake ran and the peripheral is now bonded.
    Succeeded,
    /// The handshake failed; session establishment must not proceed.
    Failed(BondFailureReason),
}

impl BondOutcome {
    /// Whether session establishment may proceed.
    pub fn is_bonded(&self) -> bool {
        matches!(self, Self::AlreadyBonded | Self::Succeeded)
    }
}

/// Drives the bonding handshake for selected peripherals.
pub struct Bonder {
    transport: Arc<dyn Transport>,
    gate: Arc<dyn PermissionGate>,
    policy: OsPolicy,
}

impl Bonder {
    /// Create a bonder over the given transport and permission gate.
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<dyn PermissionGate>,
        policy: OsPolicy,
    ) -> Self {
        Self {
            transport,
            gate,
            policy,
        }
    }

    /// Bond with the peripheral.
    ///
    /// Returns [`BondOutcome::AlreadyBonded`] immediately when the OS already
    /// holds a bond. Otherwise the handshake is requested and bond-state
    /// notifications are observed until a terminal state arrives.
    ///
    /// # Errors
    ///
    /// Returns an error for environment failures (missing capability, torn
    /// down transport, elapsed `timeout`). Handshake failures are an
    /// [`BondOutcome::Failed`] outcome, not an error, so the caller can
    /// surface them through the pairing-failed callback exactly once.
    pub async fn bond(
        &self,
        peripheral: &PeripheralHandle,
        options: BondOptions,
    ) -> Result<BondOutcome> {
        options.validate()?;
        ensure(self.gate.as_ref(), &self.policy.scan_capabilities())?;

        let address = &peripheral.address;

        if self.transport.bond_state(address) == BondState::Bonded {
            debug!(%address, "already bonded, skipping handshake");
            return Ok(BondOutcome::AlreadyBonded);
        }

        // Subscribe before requesting so a fast transition cannot be missed.
        let events = self.transport.subscribe();

        info!(%address, "starting bonding handshake");
        if let Err(e) = self.transport.request_bond(address).await {
            warn!(%address, error = %e, "bond request not initiated");
            return Ok(BondOutcome::Failed(BondFailureReason::RequestRejected));
        }

        let wait = Self::await_terminal(events, address);
        match options.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| Error::timeout("bond", limit))?,
            None => wait.await,
        }
    }

    /// Watch the shared stream until this peripheral reaches a terminal bond
    /// state. The subscription is released on return.
    async fn await_terminal(mut events: TransportEvents, address: &Address) -> Result<BondOutcome> {
        loop {
            match events.recv().await {
                Ok(TransportEvent::BondStateChanged {
                    address: event_address,
                    state,
                }) => {
                    if event_address != *address {
                        // The OS notification channel is not scoped to one
                        // peripheral; ignore everyone else's transitions.
                        continue;
                    }
                    match state {
                        BondState::Bonding => {
                            trace!(%address, "bonding in progress");
                        }
                        BondState::Bonded => {
                            info!(%address, "bonded");
                            return Ok(BondOutcome::Succeeded);
                        }
                        BondState::None => {
                            warn!(%address, "bonding failed or bond removed");
                            return Ok(BondOutcome::Failed(BondFailureReason::Removed));
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(missed)) => {
                    warn!(missed, "bond event stream lagged");
                }
                Err(RecvError::Closed) => return Err(Error::Cancelled),
            }
        }
    }
}
