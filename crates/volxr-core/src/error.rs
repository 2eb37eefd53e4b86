//! Error types for volxr.

use thiserror::Error;

/// The main error type for volxr core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A fixed-capacity pool or buffer is full.
    #[error("{resource} capacity exceeded (limit {limit})")]
    CapacityExceeded {
        /// What ran out of room.
        resource: &'static str,
        /// The configured ceiling.
        limit: usize,
    },

    /// A handle or argument that must have been valid was not.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

impl CoreError {
    /// Builds a [`CoreError::PreconditionViolation`] and logs it.
    ///
    /// Precondition violations are programming errors, so they are reported at
    /// `error` level the moment they are detected.
    pub fn precondition(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("precondition violated: {message}");
        Self::PreconditionViolation(message)
    }

    /// Returns true for [`CoreError::CapacityExceeded`].
    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    /// Returns true for [`CoreError::PreconditionViolation`].
    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::PreconditionViolation(_))
    }
}

/// A specialized Result type for volxr core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
