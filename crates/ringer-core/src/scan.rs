//! Device discovery.
//!
//! A scan is one time-bounded discovery run: sightings stream in from the
//! transport, get deduplicated by address in first-seen order, and exactly
//! one [`DiscoverySet`] is delivered when the run ends — on timeout, on a
//! target-name match, on external stop, or on a transport scan failure
//! (partial results are still useful, so a failed scan is not an error).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ringer_types::DiscoverySet;

use crate::error::{Error, Result};
use crate::gate::{OsPolicy, PermissionGate, ensure};
use crate::transport::{RadioState, Transport, TransportEvent};

/// Default discovery window.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Advertised name of Ringer peripherals; the usual short-circuit target.
pub const RINGER_TARGET_NAME: &str = "RingerDevice";

/// Options for one discovery run.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// How long to scan before delivering the accumulated set.
    pub timeout: Duration,
    /// Stop immediately when a sighting's name equals this value.
    pub target_name: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_SCAN_TIMEOUT,
            target_name: None,
        }
    }
}

impl ScanOptions {
    /// Create new scan options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the target name to short-circuit on.
    #[must_use]
    pub fn target_name(mut self, name: impl Into<String>) -> Self {
        self.target_name = Some(name.into());
        self
    }

    /// Short-circuit on the standard Ringer peripheral name.
    #[must_use]
    pub fn target_ringer(self) -> Self {
        self.target_name(RINGER_TARGET_NAME)
    }

    /// Validate the options and return an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::invalid_config("scan timeout must be > 0"));
        }
        if let Some(name) = &self.target_name
            && name.is_empty()
        {
            return Err(Error::invalid_config("target name must not be empty"));
        }
        Ok(())
    }
}

/// Drives time-bounded device discovery.
///
/// One run at a time: the in-flight run owns the accumulating
/// [`DiscoverySet`] exclusively and hands it off when it ends.
pub struct Scanner {
    transport: Arc<dyn Transport>,
    gate: Arc<dyn PermissionGate>,
    policy: OsPolicy,
    active: Mutex<Option<CancellationToken>>,
}

impl Scanner {
    /// Create a scanner over the given transport and permission gate.
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<dyn PermissionGate>,
        policy: OsPolicy,
    ) -> Self {
        Self {
            transport,
            gate,
            policy,
            active: Mutex::new(None),
        }
    }

    /// Run one discovery window and deliver the resulting set.
    ///
    /// # Errors
    ///
    /// Returns an error only for environment failures before discovery
    /// starts: missing capabilities, absent radio (permanent), disabled
    /// radio (recoverable), or a scan already in flight. Once discovery is
    /// running, every outcome — timeout, target match, external stop,
    /// transport scan failure — delivers the accumulated set.
    pub async fn scan(&self, options: ScanOptions) -> Result<DiscoverySet> {
        options.validate()?;
        ensure(self.gate.as_ref(), &self.policy.scan_capabilities())?;

        match self.transport.radio_state().await {
            RadioState::Absent => return Err(Error::Unsupported),
            RadioState::Off => return Err(Error::RadioDisabled),
            RadioState::On => {}
        }

        let cancel = CancellationToken::new();
        {
            let mut active = self.active.lock().unwrap();
            if active.is_some() {
                return Err(Error::Busy { operation: "scan" });
            }
            *active = Some(cancel.clone());
        }

        // Subscribe before starting so no sighting slips between the two.
        let mut events = self.transport.subscribe();

        let started = self.transport.start_discovery().await;
        if let Err(e) = started {
            self.active.lock().unwrap().take();
            return Err(e);
        }

        info!(timeout = ?options.timeout, target = ?options.target_name, "discovery started");

        let deadline = Instant::now() + options.timeout;
        let mut set = DiscoverySet::new();

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => {
                    debug!("scan window elapsed");
                    break;
                }
                _ = cancel.cancelled() => {
                    debug!("scan stopped externally");
                    break;
                }
                event = events.recv() => match event {
                    Ok(TransportEvent::Sighting { handle, rssi }) => {
                        let name = handle.name.clone();
                        if set.insert(handle) {
                            debug!(?name, ?rssi, "peripheral sighted");
                        }
                        if let Some(target) = &options.target_name
                            && name.as_deref() == Some(target.as_str())
                        {
                            info!(%target, "target sighted, stopping discovery");
                            break;
                        }
                    }
                    Ok(TransportEvent::SightingBatch { handles }) => {
                        // Batches fold into the same dedup path but do not
                        // trigger the target-name short-circuit.
                        for handle in handles {
                            set.insert(handle);
                        }
                    }
                    Ok(TransportEvent::ScanFailed { code }) => {
                        warn!(code, "scan failed, delivering partial results");
                        break;
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "scan event stream lagged");
                    }
                    Err(RecvError::Closed) => {
                        warn!("transport event stream closed during scan");
                        break;
                    }
                },
            }
        }

        if let Err(e) = self.transport.stop_discovery().await {
            warn!(error = %e, "failed to stop discovery");
        }
        self.active.lock().unwrap().take();

        info!(found = set.len(), "discovery finished");
        Ok(set)
    }

    /// Cancel the in-flight scan, if any.
    ///
    /// The pending timeout is cancelled and the run performs its normal stop
    /// sequence, delivering whatever it accumulated. No-op when no scan is
    /// active.
    pub fn stop(&self) {
        if let Some(token) = self.active.lock().unwrap().as_ref() {
            token.cancel();
        }
    }

    /// Whether a scan is currently running.
    pub fn is_scanning(&self) -> bool {
        self.active.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_default() {
        let options = ScanOptions::default();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert!(options.target_name.is_none());
    }

    #[test]
    fn test_options_target_ringer() {
        let options = ScanOptions::new().target_ringer();
        assert_eq!(options.target_name.as_deref(), Some("RingerDevice"));
    }

    #[test]
    fn test_options_validate() {
        assert!(ScanOptions::default().validate().is_ok());
        assert!(
            ScanOptions::new()
                .timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
        assert!(ScanOptions::new().target_name("").validate().is_err());
    }
}
