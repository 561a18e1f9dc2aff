//! Host-facing event system.
//!
//! The host UI registers for three callback shapes: scan completion, pairing
//! success, and pairing failure. They are delivered over a broadcast channel
//! so the core never assumes the host handles them synchronously or
//! re-entrantly.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use ringer_types::{DiscoverySet, PeripheralHandle};

/// Events delivered to the host.
///
/// All events are serializable for logging and IPC.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new event types
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum HostEvent {
    /// A discovery run ended; the set contains each sighted address once, in
    /// first-seen order.
    ScanComplete {
        /// The discovered peripherals.
        devices: DiscoverySet,
    },
    /// The session reached ready; commands may now be sent.
    Paired {
        /// The paired peripheral.
        peripheral: PeripheralHandle,
    },
    /// The pairing attempt ended in a terminal failure.
    PairingFailed {
        /// The peripheral the attempt targeted.
        peripheral: PeripheralHandle,
    },
}

/// Sender for host events.
pub type HostEventSender = broadcast::Sender<HostEvent>;

/// Receiver for host events.
pub type HostEventReceiver = broadcast::Receiver<HostEvent>;

/// Dispatcher fanning host events out to any number of receivers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: HostEventSender,
}

impl EventDispatcher {
    /// Create a new dispatcher with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to host events.
    pub fn subscribe(&self) -> HostEventReceiver {
        self.sender.subscribe()
    }

    /// Send an event. A host that has not subscribed yet is not an error.
    pub fn send(&self, event: HostEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(32)
    }
}
