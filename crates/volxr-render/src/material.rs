//! Materials: a shader plus the values bound alongside it.

use bytemuck::{Pod, Zeroable};
use volxr_core::{ShaderHandle, TargetHandle, TextureHandle};

/// Material uniform block (group 1, binding 0).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialUniforms {
    pub color: [f32; 4],
}

impl Default for MaterialUniforms {
    fn default() -> Self {
        Self {
            color: [1.0, 1.0, 1.0, 1.0],
        }
    }
}

/// Texture a material samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialTexture {
    None,
    Texture(TextureHandle),
    /// The color image of an offscreen target, as rendered by an earlier pass.
    Target(TargetHandle),
}

/// What a caller provides to create a material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDescriptor {
    pub color: [f32; 4],
    pub texture: MaterialTexture,
    /// Linear filtering for the bound texture; nearest otherwise.
    pub linear_filter: bool,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            color: MaterialUniforms::default().color,
            texture: MaterialTexture::None,
            linear_filter: true,
        }
    }
}

impl MaterialDescriptor {
    pub fn color(color: [f32; 4]) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn textured(texture: MaterialTexture) -> Self {
        Self {
            texture,
            ..Self::default()
        }
    }
}

/// A registered material.
pub struct Material {
    pub shader: ShaderHandle,
    pub texture: MaterialTexture,
    pub linear_filter: bool,
    pub uniforms: MaterialUniforms,
    pub uniform_buffer: wgpu::Buffer,
    /// Bind group and the revision of the bound image it was built against.
    pub(crate) bind_group: Option<(u64, wgpu::BindGroup)>,
}

impl Material {
    /// The cached bind group, if it is still current for `revision`.
    pub fn bind_group(&self, revision: u64) -> Option<&wgpu::BindGroup> {
        self.bind_group
            .as_ref()
            .filter(|(rev, _)| *rev == revision)
            .map(|(_, bg)| bg)
    }
}
