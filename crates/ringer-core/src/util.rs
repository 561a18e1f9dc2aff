//! Utility functions for ringer-core.
//!
//! This module contains shared helpers used across the crate.

use btleplug::api::Peripheral as _;
use btleplug::platform::{Peripheral, PeripheralId};

use ringer_types::{Address, PeripheralHandle};

/// Format a peripheral ID as a string.
///
/// On macOS, peripheral IDs are UUIDs. On other platforms, they may be
/// MAC addresses or other formats. This function extracts the useful
/// identifier string.
pub fn format_peripheral_id(id: &PeripheralId) -> String {
    format!("{:?}", id)
        .trim_start_matches("PeripheralId(")
        .trim_end_matches(')')
        .to_string()
}

/// Build a [`PeripheralHandle`] from a btleplug peripheral's properties.
///
/// Returns `None` when the peripheral has no readable properties or an
/// address the platform refuses to expose in a parseable form.
pub async fn handle_for(peripheral: &Peripheral) -> Option<PeripheralHandle> {
    let properties = peripheral.properties().await.ok().flatten()?;
    let address = Address::parse(&properties.address.to_string()).ok()?;
    Some(PeripheralHandle::new(
        format_peripheral_id(&peripheral.id()),
        properties.local_name,
        address,
    ))
}

/// Case-insensitive address comparison against a btleplug address string.
pub fn address_matches(address: &Address, candidate: &str) -> bool {
    candidate.eq_ignore_ascii_case(address.as_str())
}
