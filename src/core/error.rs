//! Error types for the simulation core
//!
//! Only genuine failures live here. An unsafe Banker state and an empty
//! detection result are ordinary values, see [`SafetyReport`] and
//! [`DeadlockDetector::detect`].
//!
//! [`SafetyReport`]: crate::core::banker::SafetyReport
//! [`DeadlockDetector::detect`]: crate::core::detector::DeadlockDetector::detect

use thiserror::Error;

/// A rejected scenario field
///
/// `field` is a path into the scenario such as `processes[1].allocated[0]`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Unified error type of the simulation core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Scenario input was malformed; nothing was created.
    #[error("Invalid scenario, {0}")]
    Validation(ValidationError),

    /// Internal bookkeeping broke. Indicates a defect in the core.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Banker's algorithm precondition failed.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Unknown resource `{0}`")]
    UnknownResource(String),

    #[error("Unknown process `{0}`")]
    UnknownProcess(String),

    #[error("Process `{0}` already exists")]
    DuplicateProcess(String),

    #[error("Simulation is already running")]
    AlreadyRunning,

    #[error("Failed to spawn thread: {0}")]
    Spawn(String),
}

impl From<ValidationError> for SimError {
    fn from(error: ValidationError) -> Self {
        SimError::Validation(error)
    }
}

impl SimError {
    /// Build an invariant violation and report it loudly
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(%message, "invariant violation");
        SimError::InvariantViolation(message)
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_names_field() {
        let err: SimError = ValidationError::new("processes[0].allocated[0]", "exceeds max").into();
        assert_eq!(
            err.to_string(),
            "Invalid scenario, field 'processes[0].allocated[0]': exceeds max"
        );
    }
}
