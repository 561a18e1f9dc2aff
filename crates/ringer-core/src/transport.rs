//! Trait abstraction over the OS radio/transport collaborator.
//!
//! This module defines the [`Transport`] trait that the scanner, bonder,
//! session controller, and command channel are written against. Everything
//! asynchronous the radio does — sightings, connection state changes, service
//! discovery completion, bond state changes — is delivered as a
//! [`TransportEvent`] on one shared event stream, so consumers interleave
//! transport callbacks and their own timers deterministically.
//!
//! Two implementations ship with the crate: the btleplug-backed
//! [`crate::platform::BtleTransport`] for real radios, and
//! [`crate::mock::MockTransport`] for tests.

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use ringer_types::{Address, BondState, DisconnectCode, PeripheralHandle};

use crate::error::Result;

/// Power/presence state of the host radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    /// No radio hardware on this host; permanent.
    Absent,
    /// Radio present but switched off; the user can enable it.
    Off,
    /// Radio present and powered.
    On,
}

/// Write mode for characteristic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WriteMode {
    /// ATT write-with-response; no application-level acknowledgment awaited.
    #[default]
    Default,
    /// ATT write-without-response.
    NoResponse,
}

/// Asynchronous notifications from the radio, delivered on the shared stream.
///
/// Bond-state notifications are address-agnostic at the OS level; handlers
/// must filter by address themselves.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One peripheral sighted during discovery.
    Sighting {
        /// The sighted peripheral.
        handle: PeripheralHandle,
        /// Signal strength in dBm, when reported.
        rssi: Option<i16>,
    },
    /// Several sightings delivered in one OS batch.
    SightingBatch {
        /// The sighted peripherals, in delivery order.
        handles: Vec<PeripheralHandle>,
    },
    /// Discovery aborted by the transport.
    ScanFailed {
        /// Platform error code, for logging only.
        code: i32,
    },
    /// A GATT connection reached the connected state.
    Connected {
        /// Peripheral the connection belongs to.
        address: Address,
    },
    /// A GATT connection dropped.
    Disconnected {
        /// Peripheral the connection belonged to.
        address: Address,
        /// Transport status code; 133 is retried as transient link loss.
        code: DisconnectCode,
    },
    /// Service discovery on the active connection finished.
    ServicesDiscovered {
        /// Peripheral the discovery ran against.
        address: Address,
        /// Whether the service table is now usable.
        success: bool,
    },
    /// A peripheral's bond state changed.
    BondStateChanged {
        /// Peripheral the notification is about; handlers must filter.
        address: Address,
        /// The new bond state.
        state: BondState,
    },
}

/// Receiver half of the shared transport event stream.
pub type TransportEvents = broadcast::Receiver<TransportEvent>;

/// The OS radio collaborator.
///
/// Operations are initiation-only where the platform is: `connect_gatt` and
/// `discover_services` return once the request is accepted, and completion
/// arrives as a [`TransportEvent`]. The trait owns at most one GATT
/// connection; `connect_gatt` on an implementation that already holds one
/// must close the prior connection first.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Query radio presence and power.
    async fn radio_state(&self) -> RadioState;

    /// Subscribe to the shared transport event stream.
    fn subscribe(&self) -> TransportEvents;

    /// Begin continuous discovery. Sightings arrive as events.
    async fn start_discovery(&self) -> Result<()>;

    /// Stop discovery. Idempotent.
    async fn stop_discovery(&self) -> Result<()>;

    /// Resolve a handle for a known address without scanning.
    async fn peripheral_by_address(&self, address: &Address) -> Result<PeripheralHandle>;

    /// Current bond state of a peripheral, as cached by the OS.
    fn bond_state(&self, address: &Address) -> BondState;

    /// Ask the OS to start the bonding handshake.
    ///
    /// Returns an error when the handshake cannot even be initiated; state
    /// transitions otherwise arrive as [`TransportEvent::BondStateChanged`].
    async fn request_bond(&self, address: &Address) -> Result<()>;

    /// Open a GATT connection. Completion arrives as an event.
    async fn connect_gatt(&self, handle: &PeripheralHandle) -> Result<()>;

    /// Force-close the GATT connection to this peripheral. Idempotent; a
    /// close initiated here does not produce a [`TransportEvent::Disconnected`].
    async fn disconnect_gatt(&self, address: &Address) -> Result<()>;

    /// Request service discovery on the active connection. Completion
    /// arrives as an event.
    async fn discover_services(&self, address: &Address) -> Result<()>;

    /// Whether the active connection's service table contains this service.
    async fn has_service(&self, service: Uuid) -> bool;

    /// Whether the given service contains this characteristic.
    async fn has_characteristic(&self, service: Uuid, characteristic: Uuid) -> bool;

    /// Write to a characteristic on the active connection.
    ///
    /// The result reflects only whether the transport accepted the write,
    /// never whether the peripheral processed it.
    async fn write_characteristic(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
        mode: WriteMode,
    ) -> Result<()>;
}
