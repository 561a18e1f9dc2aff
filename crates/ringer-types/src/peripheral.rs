//! Peripheral identity types.
//!
//! A [`PeripheralHandle`] is how every component of the stack refers to a
//! remote device: an opaque platform identifier, an optional advertised name,
//! and the link-layer [`Address`] that defines its identity. Two handles are
//! equal exactly when their addresses are equal.

use core::fmt;
use std::collections::HashSet;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::AddressParseError;

/// A normalized Bluetooth link-layer address (`XX:XX:XX:XX:XX:XX`).
///
/// Addresses are stored uppercase so that equality and hashing are stable no
/// matter how the platform formats them.
///
/// # Examples
///
/// ```
/// use ringer_types::Address;
///
/// let a: Address = "aa:bb:cc:dd:ee:ff".parse().unwrap();
/// let b: Address = "AA:BB:CC:DD:EE:FF".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "AA:BB:CC:DD:EE:FF");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string.
    pub fn parse(s: &str) -> Result<Self, AddressParseError> {
        let octets: Vec<&str> = s.split(':').collect();
        if octets.len() != 6 {
            return Err(AddressParseError::InvalidLayout(s.to_string()));
        }
        for octet in &octets {
            if octet.len() != 2 || !octet.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(AddressParseError::InvalidOctet(octet.to_string()));
            }
        }
        Ok(Self(s.to_ascii_uppercase()))
    }

    /// The normalized address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl Serialize for Address {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

#[cfg(feature = "serde")]
impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Identity of a discovered or selected peripheral.
///
/// Produced by the scanner (from sightings) or constructed directly from a
/// known address. Immutable once observed. Equality and hashing consider the
/// address only: the same device seen with and without a resolved name is
/// still the same device.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeripheralHandle {
    /// Opaque platform peripheral identifier (a UUID string on macOS, the
    /// address itself elsewhere).
    pub id: String,
    /// Human-readable advertised name, when the advertisement carried one.
    pub name: Option<String>,
    /// Link-layer address; the handle's identity.
    pub address: Address,
}

impl PeripheralHandle {
    /// Create a handle from its parts.
    pub fn new(id: impl Into<String>, name: Option<String>, address: Address) -> Self {
        Self {
            id: id.into(),
            name,
            address,
        }
    }

    /// Create a handle for a known address with no platform id or name.
    ///
    /// Used when connecting directly to a remembered address without a
    /// prior scan.
    pub fn from_address(address: Address) -> Self {
        Self {
            id: address.to_string(),
            name: None,
            address,
        }
    }

    /// The advertised name, or a placeholder for display purposes.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("(unnamed)")
    }
}

impl PartialEq for PeripheralHandle {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeripheralHandle {}

impl std::hash::Hash for PeripheralHandle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.display_name(), self.address)
    }
}

/// The result set of one discovery run.
///
/// Unique by address, ordered by first sighting. Owned exclusively by the
/// in-flight scan: cleared at scan start, appended on each unique sighting,
/// and moved to the caller when the scan ends.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(
    feature = "serde",
    serde(from = "Vec<PeripheralHandle>", into = "Vec<PeripheralHandle>")
)]
pub struct DiscoverySet {
    entries: Vec<PeripheralHandle>,
    seen: HashSet<Address>,
}

impl DiscoverySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a sighting. Returns `true` if the address was new.
    ///
    /// Duplicate addresses are ignored; the first sighting wins, including
    /// its name (matching how the host list renders devices as they appear).
    pub fn insert(&mut self, handle: PeripheralHandle) -> bool {
        if self.seen.contains(&handle.address) {
            return false;
        }
        self.seen.insert(handle.address.clone());
        self.entries.push(handle);
        true
    }

    /// Whether a peripheral with this address has been sighted.
    pub fn contains(&self, address: &Address) -> bool {
        self.seen.contains(address)
    }

    /// Number of unique peripherals sighted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no peripherals have been sighted.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate handles in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = &PeripheralHandle> {
        self.entries.iter()
    }

    /// Consume the set, yielding handles in first-seen order.
    pub fn into_vec(self) -> Vec<PeripheralHandle> {
        self.entries
    }
}

impl From<Vec<PeripheralHandle>> for DiscoverySet {
    fn from(handles: Vec<PeripheralHandle>) -> Self {
        let mut set = Self::new();
        for handle in handles {
            set.insert(handle);
        }
        set
    }
}

impl From<DiscoverySet> for Vec<PeripheralHandle> {
    fn from(set: DiscoverySet) -> Self {
        set.entries
    }
}

impl<'a> IntoIterator for &'a DiscoverySet {
    type Item = &'a PeripheralHandle;
    type IntoIter = std::slice::Iter<'a, PeripheralHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
