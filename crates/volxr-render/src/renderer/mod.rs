//! The renderer: registry, render graph and per-frame execution.
//!
//! A [`Renderer`] is used from one thread at a time; every operation that touches
//! GPU state takes `&mut self`, so a frame cannot be started while another is in
//! progress.

mod frame;
mod graph;

use std::time::Instant;

use serde::{Deserialize, Serialize};
use volxr_core::{RenderGraph, RendererOptions, StateCache, SyncOptions};

use crate::context::GpuContext;
use crate::error::RenderResult;
use crate::eye::EYE_COUNT;
use crate::pipeline::PipelineCache;
use crate::registry::{Builtins, ResourceRegistry};
use crate::texture::create_depth_texture;
use crate::timer::GpuFrameTimer;
use crate::uniforms::UniformRing;

/// What one call to [`Renderer::render_frame`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    /// Draw calls issued, summed over both eyes.
    pub draws: u32,
    /// Disabled draw calls passed over.
    pub skipped_draws: u32,
    /// State commands the state cache issued.
    pub state_commands: u32,
    /// Pipeline switches inside render passes.
    pub pipeline_binds: u32,
    /// Render passes executed.
    pub passes: u32,
    /// GPU time for both eyes, when timing is enabled and supported.
    pub gpu_time_ns: Option<u64>,
}

/// Depth buffer for passes that render to an eye's display image.
struct EyeDepth {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: (u32, u32),
}

impl EyeDepth {
    fn new(device: &wgpu::Device, size: (u32, u32)) -> Self {
        let (texture, view) = create_depth_texture(device, size.0, size.1);
        Self {
            _texture: texture,
            view,
            size,
        }
    }
}

/// Explicit rendering context. Owns the device handles, resources and render graph.
pub struct Renderer {
    context: GpuContext,
    registry: ResourceRegistry,
    graph: RenderGraph,
    state_cache: StateCache,
    pipelines: PipelineCache,
    uniforms: UniformRing,
    timer: Option<GpuFrameTimer>,
    eye_depth: [Option<EyeDepth>; EYE_COUNT],
    sync: SyncOptions,
    clearing: bool,
    frames: u64,
    start: Instant,
}

impl Renderer {
    /// Creates a renderer on an existing device.
    pub fn new(context: GpuContext, options: &RendererOptions) -> RenderResult<Self> {
        let registry = ResourceRegistry::new(&context.device, &context.queue, &options.limits)?;

        let slots = options.limits.passes * options.limits.draw_calls_per_pass * EYE_COUNT;
        let slots = u32::try_from(slots).unwrap_or(u32::MAX);
        let uniforms = UniformRing::new(&context.device, registry.draw_layout(), slots);

        let timer = if options.gpu_timing {
            GpuFrameTimer::new(&context.device, &context.queue)
        } else {
            None
        };

        log::info!(
            "renderer ready on {} ({} uniform slots, gpu timing {})",
            context.adapter_name,
            uniforms.capacity(),
            timer.is_some()
        );

        Ok(Self {
            context,
            registry,
            graph: RenderGraph::new(&options.limits),
            state_cache: StateCache::new(),
            pipelines: PipelineCache::new(),
            uniforms,
            timer,
            eye_depth: [None, None],
            sync: options.sync,
            clearing: true,
            frames: 0,
            start: Instant::now(),
        })
    }

    /// Creates a device with no surface and a renderer on it.
    pub fn new_headless(options: &RendererOptions) -> RenderResult<Self> {
        let context = GpuContext::new_headless_blocking(options)?;
        Self::new(context, options)
    }

    pub fn context(&self) -> &GpuContext {
        &self.context
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.context.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.context.queue
    }

    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Meshes and targets are freed through [`Renderer::free_mesh`] and
    /// [`Renderer::free_target`], which reject resources the graph still uses.
    pub fn registry_mut(&mut self) -> &mut ResourceRegistry {
        &mut self.registry
    }

    pub fn graph(&self) -> &RenderGraph {
        &self.graph
    }

    pub fn builtins(&self) -> Builtins {
        self.registry.builtins()
    }

    pub fn sync_options(&self) -> &SyncOptions {
        &self.sync
    }

    /// Number of pipelines built so far.
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Frames rendered since creation.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Turns pass clears on or off for subsequent frames. With clearing off every
    /// pass draws over what its target already holds.
    pub fn set_clearing(&mut self, enabled: bool) {
        self.clearing = enabled;
    }

    /// Forgets the state the cache believes is applied, so the next draw issues
    /// every state command.
    pub fn invalidate_state(&mut self) {
        self.state_cache.invalidate();
    }
}
