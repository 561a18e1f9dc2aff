//! Error types for data validation in ringer-types.

use thiserror::Error;

/// Errors that can occur when parsing peripheral identifiers.
///
/// This error type is platform-agnostic and does not include
/// BLE-specific errors (those belong in ringer-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum AddressParseError {
    /// The address does not have six colon-separated octets.
    #[error("invalid address layout: expected XX:XX:XX:XX:XX:XX, got '{0}'")]
    InvalidLayout(String),

    /// An octet is not a two-digit hexadecimal value.
    #[error("invalid octet '{0}' in address")]
    InvalidOctet(String),
}

/// Result type alias using ringer-types' AddressParseError type.
pub type ParseResult<T> = std::result::Result<T, AddressParseError>;
