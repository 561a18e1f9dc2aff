//! Example: Pairing with a Ringer and Sending a Command
//!
//! Scans until a Ringer peripheral answers, pairs with it, waits for the
//! session to become ready, and writes one command to the command
//! characteristic.
//!
//! Run with: `cargo run --example pair_and_send`

use std::sync::Arc;

use ringer_core::controller::{LinkConfig, LinkController};
use ringer_core::events::HostEvent;
use ringer_core::gate::AlwaysGranted;
use ringer_core::platform::BtleTransport;
use ringer_core::scan::ScanOptions;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let transport = Arc::new(BtleTransport::new().await?);
    let controller =
        LinkController::new(transport, Arc::new(AlwaysGranted), LinkConfig::default())?;
    let mut events = controller.subscribe();

    println!("Scanning for a Ringer peripheral...");
    let devices = controller
        .scan(ScanOptions::default().target_ringer())
        .await?;

    let Some(peripheral) = devices.iter().next().cloned() else {
        println!("No peripheral found.");
        return Ok(());
    };

    println!("Pairing with {}...", peripheral);
    controller.pair(peripheral).await?;

    // The pairing outcome arrives as a host event.
    loop {
        match events.recv().await? {
            HostEvent::Paired { peripheral } => {
                println!("Paired with {}", peripheral);
                break;
            }
            HostEvent::PairingFailed { peripheral } => {
                println!("Pairing failed for {}", peripheral);
                return Ok(());
            }
            _ => {}
        }
    }

    let result = controller.send(&b"ring"[..]).await;
    println!("Command result: {:?}", result);

    controller.stop().await;
    Ok(())
}
