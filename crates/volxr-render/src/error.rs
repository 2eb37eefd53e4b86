//! Rendering error types.

use thiserror::Error;
use volxr_core::CoreError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Shader compilation failed.
    #[error("shader compilation failed: {0}")]
    ShaderCompilationFailed(String),

    /// Pipeline creation failed.
    #[error("pipeline creation failed: {0}")]
    PipelineCreationFailed(String),

    /// Buffer creation failed.
    #[error("buffer creation failed: {0}")]
    BufferCreationFailed(String),

    /// Texture creation failed.
    #[error("texture creation failed: {0}")]
    TextureCreationFailed(String),

    /// Mapping a buffer for readback failed.
    #[error("GPU buffer mapping failed: {0}")]
    BufferMapFailed(String),

    /// A pool, pass, or GPU buffer is full.
    #[error("{resource} capacity exceeded (limit {limit})")]
    CapacityExceeded { resource: String, limit: u64 },

    /// GPU work the host blocked on did not finish within the retry budget.
    #[error("timed out waiting for GPU after {attempts} attempts ({waited_ms} ms)")]
    GpuSyncTimeout { attempts: u32, waited_ms: u64 },

    /// A handle or argument that must have been valid was not.
    #[error("precondition violated: {0}")]
    PreconditionViolation(String),

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Image encoding or file output failed.
    #[error("image output failed: {0}")]
    ImageOutput(String),
}

impl RenderError {
    /// Builds a [`RenderError::PreconditionViolation`] and logs it.
    pub fn precondition(message: impl Into<String>) -> Self {
        let message = message.into();
        log::error!("precondition violated: {message}");
        Self::PreconditionViolation(message)
    }

    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }

    #[must_use]
    pub fn is_sync_timeout(&self) -> bool {
        matches!(self, Self::GpuSyncTimeout { .. })
    }

    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        matches!(self, Self::PreconditionViolation(_))
    }
}

impl From<CoreError> for RenderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CapacityExceeded { resource, limit } => Self::CapacityExceeded {
                resource: resource.to_string(),
                limit: u64::try_from(limit).unwrap_or(u64::MAX),
            },
            CoreError::PreconditionViolation(msg) => Self::PreconditionViolation(msg),
            CoreError::SizeMismatch { expected, actual } => Self::SizeMismatch { expected, actual },
        }
    }
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_errors_keep_their_kind() {
        let err: RenderError = CoreError::CapacityExceeded {
            resource: "draw list",
            limit: 8,
        }
        .into();
        assert!(matches!(
            err,
            RenderError::CapacityExceeded { ref resource, limit: 8 } if resource == "draw list"
        ));

        let err: RenderError = CoreError::SizeMismatch {
            expected: 64,
            actual: 60,
        }
        .into();
        assert!(matches!(
            err,
            RenderError::SizeMismatch {
                expected: 64,
                actual: 60
            }
        ));

        let err: RenderError = CoreError::PreconditionViolation("empty".into()).into();
        assert!(matches!(err, RenderError::PreconditionViolation(ref msg) if msg == "empty"));
    }
}
