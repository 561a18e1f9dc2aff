//! Permission gate over the host's access-control subsystem.
//!
//! Every privileged radio operation in this crate consults the gate
//! immediately before the call and aborts without side effects when a
//! capability is missing. The gate never queues work for later; it issues a
//! fire-and-forget request so the host can remediate, and the caller retries
//! the whole operation afterwards.

use tracing::debug;

use ringer_types::Capability;

use crate::error::{Error, Result};

/// Abstraction over the OS permission subsystem.
///
/// `has` must be cheap and synchronous; it is called on the hot path right
/// before each privileged transport call. `request` is fire-and-forget: the
/// grant result is delivered to the host through its own callback channel,
/// outside this crate.
pub trait PermissionGate: Send + Sync {
    /// Whether the capability is currently granted.
    fn has(&self, capability: Capability) -> bool;

    /// Ask the host to request the given capabilities from the user.
    fn request(&self, capabilities: &[Capability]);
}

/// OS-version policy knobs that change which capabilities an operation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsPolicy {
    /// Whether scanning still requires the location capability. True on OS
    /// versions below the location-decoupled-scan threshold.
    pub location_required_for_scan: bool,
}

impl Default for OsPolicy {
    fn default() -> Self {
        Self::modern()
    }
}

impl OsPolicy {
    /// Policy for OS versions where scanning is decoupled from location.
    pub fn modern() -> Self {
        Self {
            location_required_for_scan: false,
        }
    }

    /// Policy for OS versions that gate scanning behind location access.
    pub fn legacy() -> Self {
        Self {
            location_required_for_scan: true,
        }
    }

    /// Capabilities a discovery run needs under this policy.
    pub fn scan_capabilities(&self) -> Vec<Capability> {
        let mut caps = vec![Capability::Scan, Capability::Connect];
        if self.location_required_for_scan {
            caps.push(Capability::Location);
        }
        caps
    }
}

/// Check the gate for every capability in `required`.
///
/// On the first missing capability, issues a request for the full required
/// set and returns [`Error::PermissionDenied`]; the caller must abort its
/// operation without side effects.
pub fn ensure(gate: &dyn PermissionGate, required: &[Capability]) -> Result<()> {
    for &capability in required {
        if !gate.has(capability) {
            debug!(%capability, "capability missing, requesting and aborting");
            gate.request(required);
            return Err(Error::permission_denied(capability));
        }
    }
    Ok(())
}

/// A gate that grants everything.
///
/// Useful on platforms whose radio backend has no app-level permission model,
/// and in examples.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    fn has(&self, _capability: Capability) -> bool {
        true
    }

    fn request(&self, _capabilities: &[Capability]) {}
}
