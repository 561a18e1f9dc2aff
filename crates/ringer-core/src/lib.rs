//! BLE discovery, bonding, and session core for Ringer peripherals.
//!
//! This crate drives the full lifecycle of one Ringer peripheral over an
//! unreliable radio link: time-bounded discovery, the OS bonding handshake,
//! GATT session establishment with supervised retries, and a narrow
//! command-send interface.
//!
//! # Features
//!
//! - **Device discovery**: deduplicated, first-seen-ordered scan results
//!   with an optional target-name short-circuit
//! - **Bonding**: address-filtered observation of the OS pairing handshake
//! - **Session supervision**: connect → discover-services → ready as an
//!   explicit state machine, with fixed-backoff retry on transient link loss
//! - **Command channel**: precondition-checked characteristic writes with
//!   distinct result values per failure
//! - **Permission gating**: every privileged call is checked against the
//!   host's access-control subsystem immediately before it happens
//!
//! # Architecture
//!
//! All radio I/O sits behind the [`transport::Transport`] trait. Transport
//! callbacks, timer firings, and external commands funnel into one
//! supervisor task per session, which is therefore the sole writer of
//! session state; stale timers are recognized by an attempt epoch and
//! dropped. [`mock::MockTransport`] scripts the asynchronous side for tests;
//! [`platform::BtleTransport`] binds to a real system adapter.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use ringer_core::controller::{LinkConfig, LinkController};
//! use ringer_core::gate::AlwaysGranted;
//! use ringer_core::platform::BtleTransport;
//! use ringer_core::scan::ScanOptions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(BtleTransport::new().await?);
//!     let controller =
//!         LinkController::new(transport, Arc::new(AlwaysGranted), LinkConfig::default())?;
//!
//!     // Scan, stopping early if a Ringer answers.
//!     let devices = controller.scan(ScanOptions::default().target_ringer()).await?;
//!     println!("found {} devices", devices.len());
//!
//!     // Pair with the first hit; the outcome arrives as a HostEvent.
//!     if let Some(peripheral) = devices.iter().next() {
//!         controller.pair(peripheral.clone()).await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod bond;
pub mod command;
pub mod controller;
pub mod error;
pub mod events;
pub mod gate;
pub mod mock;
pub mod platform;
pub mod retry;
pub mod scan;
pub mod session;
pub mod transport;
pub mod util;

// Re-export shared types for convenience.
pub use ringer_types::{
    Address, BondState, Capability, DiscoverySet, DisconnectCode, PeripheralHandle, SessionState,
};
pub use ringer_types::uuids;

// Core exports
pub use bond::{BondOptions, BondOutcome, Bonder};
pub use command::{CommandChannel, CommandResult, CommandTarget};
pub use controller::{LinkConfig, LinkController};
pub use error::{BondFailureReason, ConnectionFailureReason, Error, Result};
pub use events::{EventDispatcher, HostEvent, HostEventReceiver};
pub use gate::{AlwaysGranted, OsPolicy, PermissionGate};
pub use mock::{MockGate, MockTransport};
pub use platform::BtleTransport;
pub use retry::{RetryBudget, RetryPolicy};
pub use scan::{DEFAULT_SCAN_TIMEOUT, RINGER_TARGET_NAME, ScanOptions, Scanner};
pub use session::{
    DEFAULT_CONNECT_TIMEOUT, SessionController, SessionMachine, SessionOptions,
};
pub use transport::{RadioState, Transport, TransportEvent, WriteMode};
