//! Walking the render graph for both eyes.
//!
//! Each eye is handled in two steps. Preparation resolves every enabled draw
//! against the registry, runs its state through the state cache, selects the
//! pipeline and stages the uniforms, failing before any command is recorded.
//! Encoding then records the passes in order and submits them once for the eye.

use volxr_core::{
    ClearPolicy, DrawMatrices, MaterialHandle, MeshHandle, RenderTargetRef,
};

use super::{EyeDepth, FrameStats, Renderer};
use crate::error::{RenderError, RenderResult};
use crate::eye::{EyeImageSource, EyeView, EYE_COUNT};
use crate::material::MaterialTexture;
use crate::pipeline::{AppliedState, PipelineId, PipelineKey};
use crate::texture::TARGET_COLOR_FORMAT;
use crate::uniforms::DrawUniforms;

struct PreparedDraw {
    pipeline: PipelineId,
    mesh: MeshHandle,
    material: MaterialHandle,
    uniform_offset: u32,
}

struct PreparedPass {
    target: RenderTargetRef,
    clear: ClearPolicy,
    draws: Vec<PreparedDraw>,
}

fn color_load_op(clear: Option<[f32; 4]>) -> wgpu::LoadOp<wgpu::Color> {
    match clear {
        Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(r),
            g: f64::from(g),
            b: f64::from(b),
            a: f64::from(a),
        }),
        None => wgpu::LoadOp::Load,
    }
}

fn depth_load_op(clear: Option<f32>) -> wgpu::LoadOp<f32> {
    clear.map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear)
}

impl Renderer {
    /// Renders every enabled draw call of every pass, once per eye.
    ///
    /// Passes targeting the display draw into the image `images[eye]` hands out;
    /// it is acquired before the eye's first display pass and released after the
    /// eye is submitted. Draw calls with a transform get the eye's view and
    /// projection; all get the elapsed time.
    pub fn render_frame(
        &mut self,
        eyes: &[EyeView; EYE_COUNT],
        images: [&mut dyn EyeImageSource; EYE_COUNT],
    ) -> RenderResult<FrameStats> {
        let mut stats = FrameStats::default();
        let time = self.start.elapsed().as_secs_f32();
        self.uniforms.reset();

        let mut prepared = Vec::with_capacity(EYE_COUNT);
        for (eye, image) in eyes.iter().zip(images.iter()) {
            prepared.push(self.prepare_eye(eye, image.format(), time, &mut stats)?);
        }
        self.uniforms.upload(&self.context.queue);

        let timed = self.timer.is_some() && self.graph.pass_count() > 0;
        for (index, (passes, image)) in prepared.iter().zip(images).enumerate() {
            let last_eye = index + 1 == EYE_COUNT;
            self.encode_eye(index, passes, image, last_eye && timed, &mut stats)?;
        }

        if timed {
            if let Some(timer) = &self.timer {
                stats.gpu_time_ns = Some(timer.read_ns(&self.context.device, &self.sync)?);
            }
        }

        self.frames += 1;
        log::trace!("frame {} done: {stats:?}", self.frames);
        Ok(stats)
    }

    /// Clears both eye images to `color` without walking the graph.
    pub fn clear_eyes(
        &mut self,
        images: [&mut dyn EyeImageSource; EYE_COUNT],
        color: [f32; 4],
    ) -> RenderResult<()> {
        for image in images {
            let view = image.acquire()?;
            let mut encoder =
                self.context
                    .device
                    .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                        label: Some("clear eye encoder"),
                    });
            {
                let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("clear eye"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: color_load_op(Some(color)),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
            }
            self.context.queue.submit(std::iter::once(encoder.finish()));
            image.release()?;
        }
        Ok(())
    }

    fn prepare_eye(
        &mut self,
        eye: &EyeView,
        display_format: wgpu::TextureFormat,
        time: f32,
        stats: &mut FrameStats,
    ) -> RenderResult<Vec<PreparedPass>> {
        let Self {
            context,
            registry,
            graph,
            state_cache,
            pipelines,
            uniforms,
            ..
        } = self;

        let mut prepared = Vec::with_capacity(graph.pass_count());
        for (pass_handle, pass) in graph.passes() {
            let color_format = match pass.target {
                RenderTargetRef::Display => display_format,
                RenderTargetRef::Offscreen(target) => {
                    registry.target(target)?;
                    TARGET_COLOR_FORMAT
                }
            };

            let mut draws = Vec::with_capacity(pass.len());
            for (dc_handle, dc) in pass.draw_calls() {
                if !dc.enabled {
                    stats.skipped_draws += 1;
                    continue;
                }

                registry.prepare_material(dc.material)?;
                let mesh = registry.mesh(dc.mesh)?;
                let material = registry.material(dc.material)?;
                let program = registry.shader(material.shader)?;

                if program.layout != mesh.layout {
                    return Err(RenderError::precondition(format!(
                        "draw {dc_handle:?} in pass {pass_handle:?}: shader '{}' reads {:?} vertices, mesh has {:?}",
                        program.label, program.layout, mesh.layout
                    )));
                }
                if let RenderTargetRef::Offscreen(target) = pass.target {
                    if material.texture == MaterialTexture::Target(target) {
                        return Err(RenderError::precondition(format!(
                            "draw {dc_handle:?} samples target {target:?} while rendering to it"
                        )));
                    }
                }

                let mut applied = AppliedState {
                    state: *state_cache.current(),
                    commands: 0,
                };
                state_cache.apply(&dc.state, &mut applied);
                debug_assert_eq!(applied.state, dc.state);
                stats.state_commands += u32::try_from(applied.commands).unwrap_or(u32::MAX);

                let pipeline = pipelines.get_or_create(
                    &context.device,
                    PipelineKey {
                        shader: material.shader,
                        state: applied.state,
                        color_format,
                    },
                    program,
                    registry.pipeline_layout(program.texture),
                )?;

                // Shaders that read no transform uniform skip the matrix work.
                let draw_uniforms = match &dc.transform {
                    Some(transform) if program.uses.any_transform() => DrawUniforms::transformed(
                        &DrawMatrices::new(transform.to_matrix(), eye.view, eye.projection),
                        time,
                    ),
                    _ => DrawUniforms::untransformed(time),
                };
                let uniform_offset =
                    uniforms
                        .push(&draw_uniforms)
                        .ok_or_else(|| RenderError::CapacityExceeded {
                            resource: "draw uniform slots".into(),
                            limit: u64::from(uniforms.capacity()),
                        })?;

                draws.push(PreparedDraw {
                    pipeline,
                    mesh: dc.mesh,
                    material: dc.material,
                    uniform_offset,
                });
            }

            prepared.push(PreparedPass {
                target: pass.target,
                clear: pass.clear,
                draws,
            });
        }
        Ok(prepared)
    }

    /// Records and submits one eye. The display image, if acquired, is released
    /// whether or not encoding succeeds.
    fn encode_eye(
        &mut self,
        eye: usize,
        passes: &[PreparedPass],
        image: &mut dyn EyeImageSource,
        resolve_timer: bool,
        stats: &mut FrameStats,
    ) -> RenderResult<()> {
        let uses_display = passes
            .iter()
            .any(|p| p.target == RenderTargetRef::Display);
        let display = if uses_display {
            let size = image.size();
            if self.eye_depth[eye].as_ref().is_none_or(|d| d.size != size) {
                self.eye_depth[eye] = Some(EyeDepth::new(&self.context.device, size));
            }
            Some(image.acquire()?)
        } else {
            None
        };

        let encoded = self.record_passes(eye, passes, display.as_ref(), resolve_timer, stats);
        let encoded = encoded.map(|commands| {
            self.context.queue.submit(std::iter::once(commands));
        });
        if display.is_some() {
            image.release()?;
        }
        encoded
    }

    fn record_passes(
        &self,
        eye: usize,
        passes: &[PreparedPass],
        display: Option<&wgpu::TextureView>,
        resolve_timer: bool,
        stats: &mut FrameStats,
    ) -> RenderResult<wgpu::CommandBuffer> {
        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });

        for (index, pass) in passes.iter().enumerate() {
            let (color_view, depth_view) = match pass.target {
                RenderTargetRef::Display => {
                    let color = display.ok_or_else(|| {
                        RenderError::precondition("display pass without an eye image")
                    })?;
                    let depth = self.eye_depth[eye].as_ref().ok_or_else(|| {
                        RenderError::precondition("display pass without a depth buffer")
                    })?;
                    (color, &depth.view)
                }
                RenderTargetRef::Offscreen(target) => {
                    let target = self.registry.target(target)?;
                    (&target.color_view, &target.depth_view)
                }
            };

            let (color_clear, depth_clear) = if self.clearing {
                (pass.clear.color, pass.clear.depth)
            } else {
                (None, None)
            };
            let timestamp_writes = self.timer.as_ref().and_then(|timer| {
                timer.pass_writes(eye, index == 0, index + 1 == passes.len())
            });

            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("graph pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: color_load_op(color_clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load_op(depth_clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes,
                occlusion_query_set: None,
            });

            let mut bound = None;
            for draw in &pass.draws {
                if bound != Some(draw.pipeline) {
                    render_pass.set_pipeline(self.pipelines.get(draw.pipeline));
                    bound = Some(draw.pipeline);
                    stats.pipeline_binds += 1;
                }
                render_pass.set_bind_group(0, self.uniforms.bind_group(), &[draw.uniform_offset]);
                render_pass.set_bind_group(1, self.registry.material_bind_group(draw.material)?, &[]);

                let mesh = self.registry.mesh(draw.mesh)?;
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                match &mesh.indices {
                    Some(indices) => {
                        render_pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint16);
                        render_pass.draw_indexed(0..indices.count, 0, 0..1);
                    }
                    None => render_pass.draw(0..mesh.vertex_count, 0..1),
                }
                stats.draws += 1;
            }
            stats.passes += 1;
        }

        if resolve_timer {
            if let Some(timer) = &self.timer {
                timer.resolve(&mut encoder);
            }
        }
        Ok(encoder.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserve_maps_to_load() {
        let clear = ClearPolicy::preserve();
        assert_eq!(color_load_op(clear.color), wgpu::LoadOp::Load);
        assert_eq!(depth_load_op(clear.depth), wgpu::LoadOp::Load);
    }

    #[test]
    fn test_clear_maps_to_clear_ops() {
        let clear = ClearPolicy::color_and_depth([0.0, 0.0, 1.0, 1.0]);
        assert_eq!(
            color_load_op(clear.color),
            wgpu::LoadOp::Clear(wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 1.0,
                a: 1.0
            })
        );
        assert_eq!(depth_load_op(clear.depth), wgpu::LoadOp::Clear(1.0));
    }
}
