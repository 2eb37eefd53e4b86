//! volxr: GPU isosurface extraction and a stereo render graph on wgpu.
//!
//! This crate ties the pieces together:
//! - [`Renderer`]: the explicit rendering context (registry, render graph, state cache)
//! - [`IsosurfaceExtractor`]: two compute passes turning a density volume into triangles
//! - [`FrameDriver`]: renders both eyes once per displayed frame
//! - [`VolxrConfig`]: every option in one JSON document
//!
//! # Example
//!
//! ```no_run
//! use volxr::*;
//!
//! fn main() -> volxr::Result<()> {
//!     let config = VolxrConfig::default();
//!     init_logging(&config.logging);
//!
//!     let mut renderer = Renderer::new_headless(&config.renderer)?;
//!     let extractor = IsosurfaceExtractor::new(renderer.device(), config.extractor.clone())?;
//!
//!     let volume = DensityVolume::sphere(32, 0.35)?;
//!     let texture = renderer.registry_mut().create_volume_texture(&volume)?;
//!     let mesh = renderer.extract_isosurface(&extractor, texture, 32, 0.5)?;
//!     println!("{} triangles", renderer.registry().mesh(mesh)?.triangle_count());
//!     Ok(())
//! }
//! ```

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod driver;
pub mod error;
pub mod logging;

pub use config::VolxrConfig;
pub use driver::{FrameDriver, FrameOutcome, FramePolicy, StereoFrame};
pub use error::{Result, VolxrError};
pub use logging::{init_logging, LoggingConfig};

pub use volxr_core::{
    BlendFactor, BlendFunc, ClearPolicy, CoreError, DensityVolume, DepthCompare, DrawCall,
    DrawCallHandle, DrawMatrices, ExtractorConfig, FrontFace, MaterialHandle, MeshHandle,
    OverflowPolicy, PassHandle, PipelineState, PowerPreference, RegistryLimits,
    RenderTargetRef, RendererOptions, ShaderHandle, StateCache, SyncOptions, TargetHandle,
    TextureHandle, Transform,
};
pub use volxr_render::{
    encode_png, save_png, Builtins, EyeImageSource, EyeView, FrameStats, GpuContext, GpuMesh,
    IsosurfaceExtractor, MaterialDescriptor, MaterialTexture, RenderError, Renderer,
    ResourceRegistry, ShaderBuilder, TextureEyeSource, TextureKind, Vertex, VertexLayout,
    EYE_COUNT,
};

// Re-export glam types for convenience
pub use glam::{Mat4, Quat, UVec3, Vec3, Vec4};

/// Creates a headless renderer and wraps it in a driver, initialising logging first.
pub fn headless_driver(config: &VolxrConfig) -> Result<FrameDriver> {
    init_logging(&config.logging);
    let renderer = Renderer::new_headless(&config.renderer)?;
    log::info!("volxr headless driver ready");
    Ok(FrameDriver::new(renderer, config.frame))
}
