//! Lifecycle state enums shared across the stack.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Host capabilities the permission subsystem can grant.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new capabilities
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[non_exhaustive]
pub enum Capability {
    /// Permission to run BLE discovery.
    Scan,
    /// Permission to open GATT connections.
    Connect,
    /// Coarse-or-fine location; required for scanning on OS versions that
    /// have not decoupled scanning from location access.
    Location,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Connect => write!(f, "connect"),
            Self::Location => write!(f, "location"),
        }
    }
}

/// Pairing status of one peripheral, as reported by the OS.
///
/// Transitions arrive asynchronously through bond-state notifications; the
/// stack never polls for them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum BondState {
    /// Not bonded (also the terminal state of a failed or removed bond).
    #[default]
    None,
    /// Bonding handshake in progress.
    Bonding,
    /// Long-term keys exchanged; the peripheral is paired.
    Bonded,
}

impl BondState {
    /// Whether this state ends a bonding attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::None | Self::Bonded)
    }
}

impl fmt::Display for BondState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bonding => write!(f, "bonding"),
            Self::Bonded => write!(f, "bonded"),
        }
    }
}

/// Lifecycle state of the single active GATT session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SessionState {
    /// No session requested.
    #[default]
    Idle,
    /// GATT connection opening; the connect timer is armed.
    Connecting,
    /// Link is up; service discovery requested.
    DiscoveringServices,
    /// Services discovered; commands may be sent.
    Ready,
    /// Torn down by explicit stop.
    Disconnected,
    /// Terminal failure (retry exhaustion or protocol failure).
    Failed,
}

impl SessionState {
    /// Whether commands may be sent.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Whether a GATT connection is owned in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Connecting | Self::DiscoveringServices | Self::Ready)
    }

    /// Whether the session is finished and will make no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::DiscoveringServices => write!(f, "discovering-services"),
            Self::Ready => write!(f, "ready"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Transport status code attached to a disconnect notification.
///
/// The numeric values are vendor-observed; the only one the stack assigns
/// meaning to is [`DisconnectCode::LINK_LOSS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DisconnectCode(pub u8);

impl DisconnectCode {
    /// Unstable or failed low-level radio link; retried as transient.
    pub const LINK_LOSS: Self = Self(133);

    /// No status available from the platform; treated as terminal.
    pub const UNKNOWN: Self = Self(0);

    /// Whether this code is retried as a transient link failure.
    pub fn is_link_loss(&self) -> bool {
        *self == Self::LINK_LOSS
    }
}

impl fmt::Display for DisconnectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
