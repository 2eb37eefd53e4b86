//! Shader management.
//!
//! Application shaders are WGSL bodies. The builder prepends a prelude declaring the
//! per-draw uniform block (group 0) and the material block (group 1), so every shader
//! sees the same names:
//!
//! ```wgsl
//! draw_uniforms.u_model_mat          draw_uniforms.u_vp_mat
//! draw_uniforms.u_view_mat           draw_uniforms.u_proj_mat
//! draw_uniforms.u_camera_eye_local   draw_uniforms.u_time
//! material_uniforms.color
//! material_texture / material_sampler   (when the shader samples a texture)
//! ```
//!
//! Which of these a body actually touches is recorded in [`UniformUsage`].

use crate::error::{RenderError, RenderResult};
use crate::mesh::VertexLayout;
use crate::texture::TextureKind;

const DRAW_PRELUDE: &str = "\
struct DrawUniforms {
    u_model_mat: mat4x4<f32>,
    u_vp_mat: mat4x4<f32>,
    u_view_mat: mat4x4<f32>,
    u_proj_mat: mat4x4<f32>,
    u_camera_eye_local: vec3<f32>,
    u_time: f32,
}

@group(0) @binding(0) var<uniform> draw_uniforms: DrawUniforms;

struct MaterialUniforms {
    color: vec4<f32>,
}

@group(1) @binding(0) var<uniform> material_uniforms: MaterialUniforms;
";

const TEXTURE_2D_PRELUDE: &str = "
@group(1) @binding(1) var material_texture: texture_2d<f32>;
@group(1) @binding(2) var material_sampler: sampler;
";

const TEXTURE_3D_PRELUDE: &str = "
@group(1) @binding(1) var material_texture: texture_3d<f32>;
@group(1) @binding(2) var material_sampler: sampler;
";

/// Which per-draw uniforms a shader body reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UniformUsage {
    pub model: bool,
    pub view_projection: bool,
    pub view: bool,
    pub projection: bool,
    pub camera_eye_local: bool,
    pub time: bool,
}

impl UniformUsage {
    /// Scans a shader body for uniform names.
    pub fn scan(source: &str) -> Self {
        Self {
            model: source.contains("u_model_mat"),
            view_projection: source.contains("u_vp_mat"),
            view: source.contains("u_view_mat"),
            projection: source.contains("u_proj_mat"),
            camera_eye_local: source.contains("u_camera_eye_local"),
            time: source.contains("u_time"),
        }
    }

    /// Returns true if any transform-dependent uniform is read.
    pub fn any_transform(&self) -> bool {
        self.model || self.view_projection || self.view || self.projection || self.camera_eye_local
    }
}

/// A compiled shader and what it expects from a draw.
pub struct ShaderProgram {
    pub module: wgpu::ShaderModule,
    pub vertex_entry: String,
    pub fragment_entry: String,
    pub layout: VertexLayout,
    pub texture: Option<TextureKind>,
    pub uses: UniformUsage,
    pub label: String,
}

/// Builder for creating shader programs.
pub struct ShaderBuilder {
    source: Option<String>,
    vertex_entry: String,
    fragment_entry: String,
    label: Option<String>,
    layout: VertexLayout,
    texture: Option<TextureKind>,
}

impl ShaderBuilder {
    /// Creates a new shader builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: None,
            vertex_entry: "vs_main".to_string(),
            fragment_entry: "fs_main".to_string(),
            label: None,
            layout: VertexLayout::Standard,
            texture: None,
        }
    }

    /// Sets the shader body (WGSL, without the uniform prelude).
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Sets the vertex shader entry point.
    #[must_use]
    pub fn with_vertex_entry(mut self, entry: impl Into<String>) -> Self {
        self.vertex_entry = entry.into();
        self
    }

    /// Sets the fragment shader entry point.
    #[must_use]
    pub fn with_fragment_entry(mut self, entry: impl Into<String>) -> Self {
        self.fragment_entry = entry.into();
        self
    }

    /// Sets the shader label for debugging.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Declares the vertex layout the vertex stage consumes.
    #[must_use]
    pub fn with_vertex_layout(mut self, layout: VertexLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Declares that the material binds a texture of this kind.
    #[must_use]
    pub fn with_texture(mut self, kind: TextureKind) -> Self {
        self.texture = Some(kind);
        self
    }

    /// Full WGSL source: prelude followed by the body.
    pub fn combined_source(&self) -> RenderResult<String> {
        let body = self
            .source
            .as_ref()
            .ok_or_else(|| RenderError::ShaderCompilationFailed("missing shader source".into()))?;
        let texture = match self.texture {
            None => "",
            Some(TextureKind::D2) => TEXTURE_2D_PRELUDE,
            Some(TextureKind::D3) => TEXTURE_3D_PRELUDE,
        };
        Ok(format!("{DRAW_PRELUDE}{texture}\n{body}"))
    }

    /// Compiles the module, reporting WGSL errors instead of losing the device.
    pub fn build(self, device: &wgpu::Device) -> RenderResult<ShaderProgram> {
        let source = self.combined_source()?;
        let label = self.label.unwrap_or_else(|| "unnamed shader".to_string());

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompilationFailed(format!("{label}: {err}")));
        }

        let uses = UniformUsage::scan(self.source.as_deref().unwrap_or_default());
        log::debug!("compiled shader '{label}' ({uses:?})");

        Ok(ShaderProgram {
            module,
            vertex_entry: self.vertex_entry,
            fragment_entry: self.fragment_entry,
            layout: self.layout,
            texture: self.texture,
            uses,
            label,
        })
    }
}

impl Default for ShaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_finds_used_names() {
        let uses = UniformUsage::scan(
            "fn vs_main() { let p = draw_uniforms.u_vp_mat * draw_uniforms.u_model_mat; }",
        );
        assert!(uses.model);
        assert!(uses.view_projection);
        assert!(!uses.view);
        assert!(!uses.time);
        assert!(uses.any_transform());
    }

    #[test]
    fn test_scan_untransformed_shader() {
        let uses = UniformUsage::scan("fn fs_main() -> vec4<f32> { return material_uniforms.color; }");
        assert_eq!(uses, UniformUsage::default());
        assert!(!uses.any_transform());
    }

    #[test]
    fn test_prelude_texture_bindings() {
        let plain = ShaderBuilder::new().with_source("// body").combined_source().unwrap();
        assert!(!plain.contains("material_texture"));

        let volume = ShaderBuilder::new()
            .with_source("// body")
            .with_texture(TextureKind::D3)
            .combined_source()
            .unwrap();
        assert!(volume.contains("texture_3d<f32>"));
        assert!(volume.ends_with("// body"));
    }

    #[test]
    fn test_missing_source() {
        let err = ShaderBuilder::new().combined_source().unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompilationFailed(_)));
    }
}
