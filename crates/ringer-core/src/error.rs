//! Error types for ringer-core.
//!
//! This module defines all error types that can occur while driving the
//! scan/bond/session lifecycle of a Ringer peripheral.
//!
//! # Failure Taxonomy
//!
//! | Error | Class | Caller recovery |
//! |-------|-------|-----------------|
//! | [`Error::Unsupported`] | Permanent environment | None; no radio on this host |
//! | [`Error::RadioDisabled`] | Recoverable environment | Prompt the user, retry the operation |
//! | [`Error::PermissionDenied`] | Recoverable environment | Grant the capability, retry the operation |
//! | [`Error::BondFailed`] | Terminal protocol | Surfaced once; no automatic retry |
//! | [`Error::ConnectionFailed`] | Terminal protocol | Surfaced once after the retry path gives up |
//! | [`Error::ServiceDiscoveryFailed`] | Terminal protocol | Surfaced once; no automatic retry |
//! | [`Error::Timeout`] | Transient or caller-bounded | Depends on the operation |
//! | [`Error::Cancelled`] | Intentional | None needed |
//!
//! Transient link failures (disconnect code 133, connection timeout) are
//! absorbed inside the session controller's retry path and only become an
//! [`Error::ConnectionFailed`] when the retry budget is exhausted.

use std::time::Duration;

use thiserror::Error;

use ringer_types::{Address, Capability, DisconnectCode};

/// Errors that can occur while driving a Ringer peripheral session.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy backend error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// This host has no radio at all. Permanent; reported once.
    #[error("Bluetooth is not supported on this host")]
    Unsupported,

    /// The radio exists but is switched off. The host may prompt the user to
    /// enable it and retry the whole operation.
    #[error("Bluetooth is disabled")]
    RadioDisabled,

    /// A required capability was not granted. A request has been issued to
    /// the permission subsystem; the operation was aborted without side
    /// effects.
    #[error("permission not granted: {capability}")]
    PermissionDenied {
        /// The first missing capability.
        capability: Capability,
    },

    /// Bonding with the peripheral failed.
    #[error("bonding failed for {address}: {reason}")]
    BondFailed {
        /// Peripheral the bond attempt targeted.
        address: Address,
        /// The structured reason for the failure.
        reason: BondFailureReason,
    },

    /// The connection attempt sequence ended in failure.
    #[error("connection failed: {reason}")]
    ConnectionFailed {
        /// Peripheral the session targeted, when known.
        address: Option<Address>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// The link came up but service discovery did not complete.
    #[error("service discovery failed for {address}")]
    ServiceDiscoveryFailed {
        /// Peripheral the session targeted.
        address: Address,
    },

    /// No peripheral with the given address is known to the transport.
    #[error("peripheral not found: {address}")]
    PeripheralNotFound {
        /// The address that could not be resolved.
        address: Address,
    },

    /// Operation attempted while no GATT connection is active.
    #[error("no active GATT connection")]
    NotConnected,

    /// Operation timed out.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled by an explicit stop.
    #[error("operation cancelled")]
    Cancelled,

    /// An operation was issued while another of its kind is in flight.
    #[error("{operation} already in progress")]
    Busy {
        /// The operation that is already running.
        operation: &'static str,
    },

    /// Invalid configuration provided.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for bond failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum BondFailureReason {
    /// The OS refused to even start the handshake.
    RequestRejected,
    /// The handshake ran and ended back at the unbonded state.
    Removed,
}

impl std::fmt::Display for BondFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestRejected => write!(f, "bond request rejected by the OS"),
            Self::Removed => write!(f, "handshake ended unbonded"),
        }
    }
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// The transport reported a disconnect with a non-transient status code.
    Terminal(DisconnectCode),
    /// Service discovery failed on an established link.
    ServiceDiscovery,
    /// The transient-retry budget ran out.
    RetriesExhausted {
        /// Attempts consumed before giving up.
        attempts: u32,
    },
    /// The transport refused to open the connection.
    OpenRejected(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Terminal(code) => write!(f, "disconnected with status {code}"),
            Self::ServiceDiscovery => write!(f, "service discovery failed"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {attempts} attempts")
            }
            Self::OpenRejected(msg) => write!(f, "open rejected: {msg}"),
        }
    }
}

impl Error {
    /// Create a permission-denied error for the first missing capability.
    pub fn permission_denied(capability: Capability) -> Self {
        Self::PermissionDenied { capability }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a bond failure.
    pub fn bond_failed(address: Address, reason: BondFailureReason) -> Self {
        Self::BondFailed { address, reason }
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(address: Option<Address>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { address, reason }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

/// Result type alias using ringer-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;
