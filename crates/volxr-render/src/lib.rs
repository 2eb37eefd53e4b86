//! Rendering backend for volxr.
//!
//! This crate provides the wgpu side of volxr:
//! - Device setup and bounded GPU waits
//! - The resource registry (meshes, textures, targets, shaders, materials)
//! - Two-pass GPU isosurface extraction
//! - The [`Renderer`], which walks a render graph once per eye

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
// GPU sizes are u32/u64 while host slices are usize
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_arguments)]

pub mod buffer;
pub mod capture;
pub mod context;
pub mod error;
pub mod eye;
pub mod isosurface;
pub mod material;
pub mod mesh;
pub mod pipeline;
pub mod registry;
pub mod renderer;
pub mod shader;
pub mod sync;
pub mod texture;
pub mod timer;
pub mod uniforms;

pub use capture::{encode_png, read_target_pixels, read_texture_rgba, save_png};
pub use context::GpuContext;
pub use error::{RenderError, RenderResult};
pub use eye::{EyeImageSource, EyeView, TextureEyeSource, EYE_COUNT};
pub use isosurface::{ExtractedMesh, IsosurfaceExtractor};
pub use material::{Material, MaterialDescriptor, MaterialTexture, MaterialUniforms};
pub use mesh::{quad_vertices, GpuMesh, Vertex, VertexLayout};
pub use pipeline::{PipelineCache, PipelineKey};
pub use registry::{Builtins, ResourceRegistry};
pub use renderer::{FrameStats, Renderer};
pub use shader::{ShaderBuilder, ShaderProgram, UniformUsage};
pub use texture::{GpuTexture, OffscreenTarget, TextureKind, DEPTH_FORMAT, TARGET_COLOR_FORMAT};
pub use timer::GpuFrameTimer;
pub use uniforms::{DrawUniforms, UniformRing};
