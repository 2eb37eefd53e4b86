//! Error type for the volxr facade.

use thiserror::Error;
use volxr_core::CoreError;
use volxr_render::RenderError;

/// Errors surfaced by the facade.
#[derive(Error, Debug)]
pub enum VolxrError {
    /// Configuration, handle or pool error from the core model.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// GPU or rendering error.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Reading or writing a configuration file failed.
    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),

    /// A configuration file is not valid JSON for [`VolxrConfig`](crate::VolxrConfig).
    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

impl VolxrError {
    /// Returns true if a pool, pass or GPU buffer was full.
    #[must_use]
    pub fn is_capacity_exceeded(&self) -> bool {
        match self {
            Self::Core(e) => e.is_capacity_exceeded(),
            Self::Render(e) => e.is_capacity_exceeded(),
            _ => false,
        }
    }

    /// Returns true if the host gave up waiting for the GPU.
    #[must_use]
    pub fn is_sync_timeout(&self) -> bool {
        matches!(self, Self::Render(e) if e.is_sync_timeout())
    }

    #[must_use]
    pub fn is_precondition_violation(&self) -> bool {
        match self {
            Self::Core(e) => e.is_precondition_violation(),
            Self::Render(e) => e.is_precondition_violation(),
            _ => false,
        }
    }
}

/// Result type alias for the facade.
pub type Result<T> = std::result::Result<T, VolxrError>;
