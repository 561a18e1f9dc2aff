//! Platform-agnostic types for Ringer BLE peripherals.
//!
//! This crate provides the shared vocabulary used by the native session core
//! (ringer-core) and by hosts embedding it: peripheral identity, discovery
//! results, lifecycle states, and the Ringer GATT UUIDs.
//!
//! # Features
//!
//! - Peripheral identity with address-based equality
//! - Order-preserving, address-unique discovery results
//! - Bond and session lifecycle enums
//! - UUID constants for the Ringer command surface
//!
//! # Example
//!
//! ```
//! use ringer_types::{Address, DiscoverySet, PeripheralHandle};
//!
//! let mut set = DiscoverySet::new();
//! let addr: Address = "11:22:33:44:55:66".parse().unwrap();
//! set.insert(PeripheralHandle::new("id", Some("RingerDevice".into()), addr));
//! assert_eq!(set.len(), 1);
//! ```

pub mod error;
pub mod peripheral;
pub mod state;
pub mod uuid;

pub use error::{AddressParseError, ParseResult};
pub use peripheral::{Address, DiscoverySet, PeripheralHandle};
pub use state::{BondState, Capability, DisconnectCode, SessionState};
pub use uuid as uuids;
