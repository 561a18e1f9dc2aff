//! Example: Scanning for Ringer Devices
//!
//! This example runs one discovery window over the system Bluetooth adapter
//! and prints every unique peripheral sighted, in first-seen order.
//!
//! Run with: `cargo run --example scan_devices`

use std::sync::Arc;

use ringer_core::controller::{LinkConfig, LinkController};
use ringer_core::gate::AlwaysGranted;
use ringer_core::platform::BtleTransport;
use ringer_core::scan::ScanOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Scanning for BLE peripherals...");
    println!();

    let transport = Arc::new(BtleTransport::new().await?);
    let controller =
        LinkController::new(transport, Arc::new(AlwaysGranted), LinkConfig::default())?;

    let devices = controller.scan(ScanOptions::default()).await?;

    if devices.is_empty() {
        println!("No peripherals found.");
        println!();
        println!("Make sure:");
        println!("  - The peripheral is powered on");
        println!("  - Bluetooth is enabled on this computer");
        println!("  - The peripheral is within range");
    } else {
        println!("Found {} peripheral(s):", devices.len());
        println!();

        for device in &devices {
            println!("  {} [{}]", device.display_name(), device.address);
            println!("    Identifier: {}", device.id);
            println!();
        }
    }

    Ok(())
}
