//! Bluetooth UUIDs for Ringer peripherals.
//!
//! This module contains the UUIDs needed to address the Ringer command
//! surface over GATT.

use uuid::{Uuid, uuid};

// --- Ringer Service UUIDs ---

/// Ringer custom service hosting the command characteristic.
pub const RINGER_SERVICE: Uuid = uuid!("2f123456-cf6d-4a0f-adf2-f4911ba9ffa6");

// --- Ringer Characteristic UUIDs ---

/// Command characteristic; accepts default (with-response) writes.
pub const COMMAND_CHARACTERISTIC: Uuid = uuid!("00002a29-0000-1000-8000-00805f9b34fb");
