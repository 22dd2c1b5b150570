//! Discriminated status every operation reduces to.
//!
//! Drivers return `Result` values; layers that only need the taxonomy (status
//! LEDs, protocol replies, logs) fold them into a [`Status`]. The numeric codes
//! are stable for the lifetime of a build but carry no meaning of their own.

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, HalError};

/// Outcome of an operation, independent of the peripheral class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// The operation completed.
    Answered,

    /// The operation has not completed yet; poll again (software timers only).
    InProgress,

    /// The operation failed.
    Failed(ErrorKind),
}

impl Status {
    /// Numeric code of this status.
    pub fn code(self) -> u8 {
        match self {
            Self::Answered => 0,
            Self::InProgress => 1,
            Self::Failed(kind) => match kind {
                ErrorKind::InvalidId => 2,
                ErrorKind::NotConfigured => 3,
                ErrorKind::ConfigurationConflict => 4,
                ErrorKind::InvalidParameter => 5,
                ErrorKind::DeviceNotResponding => 6,
                ErrorKind::HardwareFault => 7,
                ErrorKind::Unsupported => 8,
            },
        }
    }

    pub fn is_answered(self) -> bool {
        self == Self::Answered
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<&HalError> for Status {
    fn from(error: &HalError) -> Self {
        Self::Failed(error.kind())
    }
}

impl<T> From<&Result<T, HalError>> for Status {
    fn from(result: &Result<T, HalError>) -> Self {
        match result {
            Ok(_) => Self::Answered,
            Err(error) => Self::from(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PeripheralClass;

    #[test]
    fn test_status_from_ok() {
        let result: Result<u8, HalError> = Ok(3);
        assert_eq!(Status::from(&result), Status::Answered);
    }

    #[test]
    fn test_status_from_error() {
        let result: Result<(), HalError> = Err(HalError::not_configured(PeripheralClass::Uart, 0));
        let status = Status::from(&result);
        assert_eq!(status, Status::Failed(ErrorKind::NotConfigured));
        assert!(status.is_failure());
    }

    #[test]
    fn test_codes_are_unique() {
        let statuses = [
            Status::Answered,
            Status::InProgress,
            Status::Failed(ErrorKind::InvalidId),
            Status::Failed(ErrorKind::NotConfigured),
            Status::Failed(ErrorKind::ConfigurationConflict),
            Status::Failed(ErrorKind::InvalidParameter),
            Status::Failed(ErrorKind::DeviceNotResponding),
            Status::Failed(ErrorKind::HardwareFault),
            Status::Failed(ErrorKind::Unsupported),
        ];
        let mut codes: Vec<u8> = statuses.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), statuses.len());
    }
}
