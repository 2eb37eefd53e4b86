//! Core model for volxr.
//!
//! This crate has no GPU dependency. It provides:
//! - Generation-checked handles and fixed-capacity [`Pool`]s
//! - [`PipelineState`] and the diffing [`StateCache`]
//! - The [`RenderGraph`] configuration (passes and draw calls)
//! - [`DensityVolume`] and a CPU reference of the surface-nets extractor
//! - Configuration options

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Options structs legitimately have many boolean flags
#![allow(clippy::struct_excessive_bools)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod graph;
pub mod handle;
pub mod options;
pub mod pool;
pub mod state;
pub mod surface_nets;
pub mod transform;
pub mod volume;

pub use error::{CoreError, Result};
pub use graph::{ClearPolicy, DrawCall, RenderGraph, RenderPass, RenderTargetRef};
pub use handle::{
    tag, DrawCallHandle, Handle, MaterialHandle, MeshHandle, PassHandle, ShaderHandle, TargetHandle,
    TextureHandle,
};
pub use options::{
    ExtractorConfig, OverflowPolicy, PowerPreference, RegistryLimits, RendererOptions,
    SyncOptions,
};
pub use pool::Pool;
pub use state::{
    BlendFactor, BlendFunc, CommandCounter, CommandRecorder, DepthCompare, FrontFace,
    PipelineState, StateCache, StateCommand, StateSink,
};
pub use surface_nets::CellRecord;
pub use transform::{DrawMatrices, Transform};
pub use volume::DensityVolume;

// Re-export glam types for convenience
pub use glam::{Mat4, Quat, UVec3, Vec3, Vec4};
