//! Command channel over an established session.
//!
//! Given a ready session, resolves the target service and characteristic and
//! performs the write. Every precondition failure is a distinct
//! [`CommandResult`] value rather than an error, so hosts can map each one to
//! its own remediation. The result reflects only whether the transport
//! accepted the write, never whether the peripheral processed it.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use ringer_types::{Capability, SessionState};
use ringer_types::uuids::{COMMAND_CHARACTERISTIC, RINGER_SERVICE};

use crate::gate::PermissionGate;
use crate::transport::{Transport, WriteMode};

/// Where command writes land on the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandTarget {
    /// The GATT service hosting the command characteristic.
    pub service: Uuid,
    /// The characteristic commands are written to.
    pub characteristic: Uuid,
}

impl Default for CommandTarget {
    fn default() -> Self {
        Self {
            service: RINGER_SERVICE,
            characteristic: COMMAND_CHARACTERISTIC,
        }
    }
}

/// Outcome of one command send.
///
/// Precondition failures are ordinary values: the host decides whether to
/// re-pair, re-scan, or surface an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    /// The transport accepted the write; the echoed payload is attached.
    Sent(Bytes),
    /// No session in the ready state.
    SessionUnavailable,
    /// The target service is not present on the active session.
    ServiceNotFound,
    /// The target characteristic is not present within the service.
    CharacteristicNotFound,
    /// The transport refused the write call.
    WriteRejected,
    /// The connect capability is not granted.
    PermissionDenied,
}

impl CommandResult {
    /// Whether the write was accepted by the transport.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent(_))
    }
}

/// Sends commands over the active session.
pub struct CommandChannel {
    transport: Arc<dyn Transport>,
    gate: Arc<dyn PermissionGate>,
    state: watch::Receiver<SessionState>,
    target: CommandTarget,
}

impl CommandChannel {
    /// Create a channel bound to the given session state.
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<dyn PermissionGate>,
        state: watch::Receiver<SessionState>,
        target: CommandTarget,
    ) -> Self {
        Self {
            transport,
            gate,
            state,
            target,
        }
    }

    /// Write a command to the peripheral.
    ///
    /// Preconditions are checked in order, each with its own result value:
    /// session readiness, service resolution, characteristic resolution,
    /// connect capability. On a non-ready session the transport is not
    /// touched at all.
    pub async fn send(&self, payload: impl Into<Bytes>) -> CommandResult {
        let payload = payload.into();

        if !self.state.borrow().is_ready() {
            debug!("command rejected, session not ready");
            return CommandResult::SessionUnavailable;
        }

        if !self.transport.has_service(self.target.service).await {
            debug!(service = %self.target.service, "command service not found");
            return CommandResult::ServiceNotFound;
        }

        if !self
            .transport
            .has_characteristic(self.target.service, self.target.characteristic)
            .await
        {
            debug!(
                characteristic = %self.target.characteristic,
                "command characteristic not found"
            );
            return CommandResult::CharacteristicNotFound;
        }

        if !self.gate.has(Capability::Connect) {
            self.gate.request(&[Capability::Connect]);
            return CommandResult::PermissionDenied;
        }

        match self
            .transport
            .write_characteristic(
                self.target.service,
                self.target.characteristic,
                &payload,
                WriteMode::Default,
            )
            .await
        {
            Ok(()) => {
                info!(len = payload.len(), "command sent");
                CommandResult::Sent(payload)
            }
            Err(e) => {
                debug!(error = %e, "write rejected");
                CommandResult::WriteRejected
            }
        }
    }
}
