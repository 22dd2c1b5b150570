//! Error types shared by every registry, bus driver and device driver.
//!
//! The variants form the cross-driver taxonomy: a caller can tell "my setup is
//! wrong" (`InvalidId`, `NotConfigured`, `ConfigurationConflict`,
//! `InvalidParameter`) apart from "the device did not answer"
//! (`DeviceNotResponding`) and from an unrecoverable transport failure
//! (`HardwareFault`), whatever the peripheral class.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::PeripheralClass;

/// Result type alias for HAL operations.
pub type Result<T> = std::result::Result<T, HalError>;

/// Why a device failed to respond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoResponse {
    /// The addressed device did not acknowledge on the bus.
    Nack { address: u16 },

    /// Nothing (or not enough) arrived before the configured timeout.
    Timeout { duration_ms: u32 },
}

impl fmt::Display for NoResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nack { address } => write!(f, "no acknowledge from address 0x{address:02X}"),
            Self::Timeout { duration_ms } => write!(f, "timeout after {duration_ms}ms"),
        }
    }
}

/// Errors that can occur during HAL operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HalError {
    /// ID outside the class's configured range.
    #[error("{class} ID {id} out of range (max {max})")]
    InvalidId {
        class: PeripheralClass,
        id: u8,
        max: usize,
    },

    /// Operation on an ID that was never initialized.
    #[error("{class} ID {id} is not configured")]
    NotConfigured { class: PeripheralClass, id: u8 },

    /// The requested binding collides with another configured ID.
    #[error("{class} ID {id} conflicts with the binding of ID {other}")]
    ConfigurationConflict {
        class: PeripheralClass,
        id: u8,
        other: u8,
    },

    /// Value outside the class's closed enumeration, or a direction/mode mismatch.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// Bus-level no-acknowledge or timeout.
    #[error("Device not responding: {cause}")]
    DeviceNotResponding { cause: NoResponse },

    /// Unrecoverable transport failure.
    #[error("Hardware fault: {message}")]
    HardwareFault { message: String },

    /// The concrete device has no such capability.
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: String },
}

impl HalError {
    /// Create a new invalid ID error.
    pub fn invalid_id(class: PeripheralClass, id: u8, max: usize) -> Self {
        Self::InvalidId { class, id, max }
    }

    /// Create a new not configured error.
    pub fn not_configured(class: PeripheralClass, id: u8) -> Self {
        Self::NotConfigured { class, id }
    }

    /// Create a new configuration conflict error.
    pub fn conflict(class: PeripheralClass, id: u8, other: u8) -> Self {
        Self::ConfigurationConflict { class, id, other }
    }

    /// Create a new invalid parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Create a new no-acknowledge error.
    pub fn nack(address: u16) -> Self {
        Self::DeviceNotResponding {
            cause: NoResponse::Nack { address },
        }
    }

    /// Create a new timeout error.
    pub fn timeout(duration_ms: u32) -> Self {
        Self::DeviceNotResponding {
            cause: NoResponse::Timeout { duration_ms },
        }
    }

    /// Create a new hardware fault error.
    pub fn hardware_fault(message: impl Into<String>) -> Self {
        Self::HardwareFault {
            message: message.into(),
        }
    }

    /// Create a new unsupported operation error.
    pub fn unsupported(operation: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Taxonomy bucket of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId { .. } => ErrorKind::InvalidId,
            Self::NotConfigured { .. } => ErrorKind::NotConfigured,
            Self::ConfigurationConflict { .. } => ErrorKind::ConfigurationConflict,
            Self::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            Self::DeviceNotResponding { .. } => ErrorKind::DeviceNotResponding,
            Self::HardwareFault { .. } => ErrorKind::HardwareFault,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
        }
    }

    /// True for bus NACKs and timeouts.
    pub fn is_not_responding(&self) -> bool {
        matches!(self, Self::DeviceNotResponding { .. })
    }
}

/// Failure kinds with a defined meaning across every driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    InvalidId,
    NotConfigured,
    ConfigurationConflict,
    InvalidParameter,
    DeviceNotResponding,
    HardwareFault,
    Unsupported,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidId => "InvalidId",
            Self::NotConfigured => "NotConfigured",
            Self::ConfigurationConflict => "ConfigurationConflict",
            Self::InvalidParameter => "InvalidParameter",
            Self::DeviceNotResponding => "DeviceNotResponding",
            Self::HardwareFault => "HardwareFault",
            Self::Unsupported => "Unsupported",
        };
        write!(f, "{name}")
    }
}
