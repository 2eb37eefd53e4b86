//! Render pipeline cache keyed by applied state.
//!
//! wgpu bakes fixed-function state into pipelines, so "applying" a state change means
//! selecting (and on first use, building) the pipeline for the new combination.

use std::collections::HashMap;

use volxr_core::{
    BlendFactor, BlendFunc, DepthCompare, FrontFace, PipelineState, ShaderHandle, StateCommand,
    StateSink,
};

use crate::error::{RenderError, RenderResult};
use crate::shader::ShaderProgram;
use crate::texture::{TextureKind, DEPTH_FORMAT};

/// Folds state commands into the state that pipelines are selected by.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppliedState {
    pub state: PipelineState,
    pub commands: usize,
}

impl StateSink for AppliedState {
    fn emit(&mut self, command: StateCommand) {
        self.state.apply_command(command);
        self.commands += 1;
    }
}

/// Everything a render pipeline depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderHandle,
    pub state: PipelineState,
    pub color_format: wgpu::TextureFormat,
}

/// Index of a pipeline inside a [`PipelineCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineId(usize);

/// Pipeline layouts, one per material binding shape.
pub struct PipelineLayouts {
    pub untextured: wgpu::PipelineLayout,
    pub texture_2d: wgpu::PipelineLayout,
    pub texture_3d: wgpu::PipelineLayout,
}

impl PipelineLayouts {
    pub fn get(&self, kind: Option<TextureKind>) -> &wgpu::PipelineLayout {
        match kind {
            None => &self.untextured,
            Some(TextureKind::D2) => &self.texture_2d,
            Some(TextureKind::D3) => &self.texture_3d,
        }
    }
}

/// Builds pipelines on demand and keeps them for the life of the renderer.
#[derive(Default)]
pub struct PipelineCache {
    lookup: HashMap<PipelineKey, PipelineId>,
    pipelines: Vec<wgpu::RenderPipeline>,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Returns the pipeline for `key`, building it if needed.
    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
        program: &ShaderProgram,
        layout: &wgpu::PipelineLayout,
    ) -> RenderResult<PipelineId> {
        if let Some(id) = self.lookup.get(&key) {
            return Ok(*id);
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = create_render_pipeline(device, &key, program, layout);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::PipelineCreationFailed(format!(
                "{}: {err}",
                program.label
            )));
        }

        let id = PipelineId(self.pipelines.len());
        self.pipelines.push(pipeline);
        self.lookup.insert(key, id);
        log::debug!("built pipeline {id:?} for '{}' {:?}", program.label, key.state);
        Ok(id)
    }

    pub fn get(&self, id: PipelineId) -> &wgpu::RenderPipeline {
        &self.pipelines[id.0]
    }
}

fn create_render_pipeline(
    device: &wgpu::Device,
    key: &PipelineKey,
    program: &ShaderProgram,
    layout: &wgpu::PipelineLayout,
) -> wgpu::RenderPipeline {
    let state = &key.state;
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&program.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: &program.module,
            entry_point: Some(&program.vertex_entry),
            buffers: &[program.layout.buffer_layout()],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: &program.module,
            entry_point: Some(&program.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: key.color_format,
                blend: state.blend_enabled.then(|| blend_state(state.blend)),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: front_face(state.front_face),
            cull_mode: state.cull_enabled.then_some(wgpu::Face::Back),
            ..Default::default()
        },
        depth_stencil: Some(depth_stencil_state(state)),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

/// Depth state for a pipeline. With the depth test off every fragment passes and
/// nothing is written, whatever the requested write flag.
pub fn depth_stencil_state(state: &PipelineState) -> wgpu::DepthStencilState {
    let (compare, write) = if state.depth_test {
        (compare_function(state.depth_compare), state.depth_write)
    } else {
        (wgpu::CompareFunction::Always, false)
    };
    wgpu::DepthStencilState {
        format: DEPTH_FORMAT,
        depth_write_enabled: write,
        depth_compare: compare,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

pub fn compare_function(compare: DepthCompare) -> wgpu::CompareFunction {
    match compare {
        DepthCompare::Never => wgpu::CompareFunction::Never,
        DepthCompare::Less => wgpu::CompareFunction::Less,
        DepthCompare::Equal => wgpu::CompareFunction::Equal,
        DepthCompare::LessEqual => wgpu::CompareFunction::LessEqual,
        DepthCompare::Greater => wgpu::CompareFunction::Greater,
        DepthCompare::NotEqual => wgpu::CompareFunction::NotEqual,
        DepthCompare::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
        DepthCompare::Always => wgpu::CompareFunction::Always,
    }
}

pub fn front_face(face: FrontFace) -> wgpu::FrontFace {
    match face {
        FrontFace::Ccw => wgpu::FrontFace::Ccw,
        FrontFace::Cw => wgpu::FrontFace::Cw,
    }
}

fn blend_factor(factor: BlendFactor) -> wgpu::BlendFactor {
    match factor {
        BlendFactor::Zero => wgpu::BlendFactor::Zero,
        BlendFactor::One => wgpu::BlendFactor::One,
        BlendFactor::SrcAlpha => wgpu::BlendFactor::SrcAlpha,
        BlendFactor::OneMinusSrcAlpha => wgpu::BlendFactor::OneMinusSrcAlpha,
        BlendFactor::DstAlpha => wgpu::BlendFactor::DstAlpha,
        BlendFactor::OneMinusDstAlpha => wgpu::BlendFactor::OneMinusDstAlpha,
        BlendFactor::SrcColor => wgpu::BlendFactor::Src,
        BlendFactor::OneMinusSrcColor => wgpu::BlendFactor::OneMinusSrc,
        BlendFactor::DstColor => wgpu::BlendFactor::Dst,
        BlendFactor::OneMinusDstColor => wgpu::BlendFactor::OneMinusDst,
    }
}

/// The same factors drive color and alpha.
pub fn blend_state(func: BlendFunc) -> wgpu::BlendState {
    let component = wgpu::BlendComponent {
        src_factor: blend_factor(func.src),
        dst_factor: blend_factor(func.dst),
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: component,
        alpha: component,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_disabled_means_always_and_no_write() {
        let state = PipelineState {
            depth_test: false,
            depth_write: true,
            ..PipelineState::default()
        };
        let ds = depth_stencil_state(&state);
        assert_eq!(ds.depth_compare, wgpu::CompareFunction::Always);
        assert!(!ds.depth_write_enabled);
    }

    #[test]
    fn test_depth_compare_mapping() {
        let state = PipelineState::default().with_depth_compare(DepthCompare::LessEqual);
        assert_eq!(
            depth_stencil_state(&state).depth_compare,
            wgpu::CompareFunction::LessEqual
        );
    }

    #[test]
    fn test_default_blend_is_premultiplied() {
        let blend = blend_state(BlendFunc::default());
        assert_eq!(blend.color.src_factor, wgpu::BlendFactor::One);
        assert_eq!(blend.color.dst_factor, wgpu::BlendFactor::OneMinusSrcAlpha);
    }

    #[test]
    fn test_applied_state_follows_commands() {
        let mut applied = AppliedState::default();
        let mut cache = volxr_core::StateCache::new();
        let requested = PipelineState::fullscreen();
        let issued = cache.apply(&requested, &mut applied);
        assert_eq!(issued, applied.commands);
        assert_eq!(applied.state, requested);
    }
}
