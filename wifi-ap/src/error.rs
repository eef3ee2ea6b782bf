// Error kinds surfaced by the AP service

//! Error types
//!
//! [`ApError`] is the closed set of failure kinds every service operation
//! reports. Collaborator outcomes ([`DriverError`], [`ProvisionError`]) are
//! typed separately and translated 1:1 at the controller boundary.

use crate::types::ApState;
use thiserror::Error;

/// A result type using `ApError`.
pub type Result<T> = std::result::Result<T, ApError>;

/// Failure kinds reported by AP service operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApError {
    /// Malformed input, rejected by local validation
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Numeric input outside a documented bound
    #[error("out of range: {0}")]
    OutOfRange(String),

    /// Operation not legal in the current lifecycle state
    #[error("operation not allowed while {0}")]
    InvalidState(ApState),

    /// The radio hardware is absent
    #[error("radio hardware not found")]
    NotFound,

    /// The radio is present but cannot perform the operation
    #[error("operation not supported by the radio: {0}")]
    NotSupported(String),

    /// Generic collaborator failure or internal inconsistency
    #[error("fault: {0}")]
    Fault(String),
}

/// Outcome of a failed radio driver command
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    /// No radio hardware (or no driver binary) was found
    #[error("radio hardware absent: {0}")]
    HardwareAbsent(String),

    /// The driver could not be installed or brought up
    #[error("driver bring-up failed: {0}")]
    BringUpFailed(String),

    /// The driver does not implement the command
    #[error("unsupported driver command: {0}")]
    Unsupported(String),

    /// Any other failure
    #[error("driver failure: {0}")]
    Failed(String),
}

impl From<DriverError> for ApError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::HardwareAbsent(_) => ApError::NotFound,
            DriverError::BringUpFailed(msg) | DriverError::Unsupported(msg) => {
                ApError::NotSupported(msg)
            }
            DriverError::Failed(msg) => ApError::Fault(msg),
        }
    }
}

/// The network provisioner refused or failed to apply an address range
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("address range rejected by provisioner: {0}")]
pub struct ProvisionError(pub String);

impl From<ProvisionError> for ApError {
    fn from(err: ProvisionError) -> Self {
        ApError::Fault(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_mapping() {
        assert_eq!(
            ApError::from(DriverError::HardwareAbsent("no phy".into())),
            ApError::NotFound
        );
        assert_eq!(
            ApError::from(DriverError::BringUpFailed("exit 1".into())),
            ApError::NotSupported("exit 1".into())
        );
        assert_eq!(
            ApError::from(DriverError::Unsupported("reload".into())),
            ApError::NotSupported("reload".into())
        );
        assert_eq!(
            ApError::from(DriverError::Failed("boom".into())),
            ApError::Fault("boom".into())
        );
    }

    #[test]
    fn test_provision_error_is_fault() {
        let err: ApError = ProvisionError("exit status 2".into()).into();
        assert!(matches!(err, ApError::Fault(msg) if msg.contains("exit status 2")));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ApError::InvalidState(ApState::Running).to_string(),
            "operation not allowed while running"
        );
        assert_eq!(ApError::NotFound.to_string(), "radio hardware not found");
    }
}
