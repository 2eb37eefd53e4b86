//! Fixed-capacity resource pools and the bindings derived from them.
//!
//! Every mesh, texture, offscreen target, shader and material the renderer draws
//! with lives here behind a generation-checked handle. Pools have hard ceilings
//! taken from [`RegistryLimits`]; a full pool reports `CapacityExceeded`.
//!
//! A few resources are registered at construction and count against the pools:
//! the unit quad and the unlit, isosurface and blit shaders.

use volxr_core::{
    tag, DensityVolume, MaterialHandle, MeshHandle, Pool, RegistryLimits, ShaderHandle,
    TargetHandle, TextureHandle,
};

use crate::buffer::create_uniform_buffer;
use crate::error::{RenderError, RenderResult};
use crate::material::{Material, MaterialDescriptor, MaterialTexture, MaterialUniforms};
use crate::mesh::{quad_vertices, GpuMesh, Vertex, VertexLayout};
use crate::pipeline::PipelineLayouts;
use crate::shader::{ShaderBuilder, ShaderProgram};
use crate::texture::{GpuTexture, OffscreenTarget, TextureKind};
use crate::uniforms::UniformRing;

const UNLIT_SHADER: &str = include_str!("shaders/unlit.wgsl");
const ISOSURFACE_SHADER: &str = include_str!("shaders/isosurface.wgsl");
const BLIT_SHADER: &str = include_str!("shaders/blit.wgsl");

/// Handles of the resources registered at construction.
#[derive(Debug, Clone, Copy)]
pub struct Builtins {
    /// Unit quad spanning clip space, used by fullscreen passes.
    pub quad: MeshHandle,
    /// Flat material color on [`VertexLayout::Standard`] meshes.
    pub unlit: ShaderHandle,
    /// Two-sided eye-lit shading for extracted, position-only meshes.
    pub isosurface: ShaderHandle,
    /// Samples a 2-D texture or target across the quad.
    pub blit: ShaderHandle,
}

/// Bind group layouts for group 1, one per material binding shape.
struct MaterialLayouts {
    untextured: wgpu::BindGroupLayout,
    texture_2d: wgpu::BindGroupLayout,
    texture_3d: wgpu::BindGroupLayout,
}

impl MaterialLayouts {
    fn get(&self, kind: Option<TextureKind>) -> &wgpu::BindGroupLayout {
        match kind {
            None => &self.untextured,
            Some(TextureKind::D2) => &self.texture_2d,
            Some(TextureKind::D3) => &self.texture_3d,
        }
    }
}

struct Samplers {
    image_linear: wgpu::Sampler,
    image_nearest: wgpu::Sampler,
    volume_linear: wgpu::Sampler,
    volume_nearest: wgpu::Sampler,
}

impl Samplers {
    fn new(device: &wgpu::Device) -> Self {
        Self {
            image_linear: create_sampler(
                device,
                wgpu::AddressMode::ClampToEdge,
                wgpu::FilterMode::Linear,
            ),
            image_nearest: create_sampler(
                device,
                wgpu::AddressMode::ClampToEdge,
                wgpu::FilterMode::Nearest,
            ),
            volume_linear: create_sampler(
                device,
                wgpu::AddressMode::MirrorRepeat,
                wgpu::FilterMode::Linear,
            ),
            volume_nearest: create_sampler(
                device,
                wgpu::AddressMode::MirrorRepeat,
                wgpu::FilterMode::Nearest,
            ),
        }
    }

    fn get(&self, kind: TextureKind, linear: bool) -> &wgpu::Sampler {
        match (kind, linear) {
            (TextureKind::D2, true) => &self.image_linear,
            (TextureKind::D2, false) => &self.image_nearest,
            (TextureKind::D3, true) => &self.volume_linear,
            (TextureKind::D3, false) => &self.volume_nearest,
        }
    }
}

/// Creates a single-level sampler with one address mode on every axis.
pub fn create_sampler(
    device: &wgpu::Device,
    address_mode: wgpu::AddressMode,
    filter: wgpu::FilterMode,
) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("material sampler"),
        address_mode_u: address_mode,
        address_mode_v: address_mode,
        address_mode_w: address_mode,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn create_material_layout(
    device: &wgpu::Device,
    kind: Option<TextureKind>,
) -> wgpu::BindGroupLayout {
    let mut entries = vec![wgpu::BindGroupLayoutEntry {
        binding: 0,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }];
    if let Some(kind) = kind {
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 1,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: match kind {
                    TextureKind::D2 => wgpu::TextureViewDimension::D2,
                    TextureKind::D3 => wgpu::TextureViewDimension::D3,
                },
                multisampled: false,
            },
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: 2,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
    }
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("material layout"),
        entries: &entries,
    })
}

fn create_pipeline_layout(
    device: &wgpu::Device,
    draw_layout: &wgpu::BindGroupLayout,
    material_layout: &wgpu::BindGroupLayout,
) -> wgpu::PipelineLayout {
    device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("draw pipeline layout"),
        bind_group_layouts: &[draw_layout, material_layout],
        push_constant_ranges: &[],
    })
}

/// Owner of every GPU resource a render graph refers to.
///
/// Holds clones of the device and queue; wgpu devices are reference counted.
pub struct ResourceRegistry {
    device: wgpu::Device,
    queue: wgpu::Queue,
    meshes: Pool<tag::Mesh, GpuMesh>,
    textures: Pool<tag::Texture, GpuTexture>,
    targets: Pool<tag::Target, OffscreenTarget>,
    shaders: Pool<tag::Shader, ShaderProgram>,
    materials: Pool<tag::Material, Material>,
    draw_layout: wgpu::BindGroupLayout,
    material_layouts: MaterialLayouts,
    pipeline_layouts: PipelineLayouts,
    samplers: Samplers,
    builtins: Builtins,
}

impl ResourceRegistry {
    /// Creates the pools and registers the built-in quad and shaders.
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        limits: &RegistryLimits,
    ) -> RenderResult<Self> {
        let mut meshes = Pool::new("mesh", limits.meshes);
        let mut shaders = Pool::new("shader", limits.shaders);

        let (vertices, indices) = quad_vertices();
        let quad = meshes.insert(GpuMesh::new(
            device,
            &vertices,
            Some(&indices),
            "builtin quad",
        )?)?;

        let unlit = shaders.insert(
            ShaderBuilder::new()
                .with_label("builtin unlit")
                .with_source(UNLIT_SHADER)
                .build(device)?,
        )?;
        let isosurface = shaders.insert(
            ShaderBuilder::new()
                .with_label("builtin isosurface")
                .with_source(ISOSURFACE_SHADER)
                .with_vertex_layout(VertexLayout::PositionOnly)
                .build(device)?,
        )?;
        let blit = shaders.insert(
            ShaderBuilder::new()
                .with_label("builtin blit")
                .with_source(BLIT_SHADER)
                .with_texture(TextureKind::D2)
                .build(device)?,
        )?;

        let draw_layout = UniformRing::bind_group_layout(device);
        let material_layouts = MaterialLayouts {
            untextured: create_material_layout(device, None),
            texture_2d: create_material_layout(device, Some(TextureKind::D2)),
            texture_3d: create_material_layout(device, Some(TextureKind::D3)),
        };
        let pipeline_layouts = PipelineLayouts {
            untextured: create_pipeline_layout(device, &draw_layout, &material_layouts.untextured),
            texture_2d: create_pipeline_layout(device, &draw_layout, &material_layouts.texture_2d),
            texture_3d: create_pipeline_layout(device, &draw_layout, &material_layouts.texture_3d),
        };

        log::debug!("resource registry ready with limits {limits:?}");

        Ok(Self {
            device: device.clone(),
            queue: queue.clone(),
            meshes,
            textures: Pool::new("texture", limits.textures),
            targets: Pool::new("offscreen target", limits.targets),
            shaders,
            materials: Pool::new("material", limits.materials),
            draw_layout,
            material_layouts,
            pipeline_layouts,
            samplers: Samplers::new(device),
            builtins: Builtins {
                quad,
                unlit,
                isosurface,
                blit,
            },
        })
    }

    pub fn builtins(&self) -> Builtins {
        self.builtins
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Layout of the per-draw uniform group.
    pub fn draw_layout(&self) -> &wgpu::BindGroupLayout {
        &self.draw_layout
    }

    /// Pipeline layout for shaders binding a texture of `kind` (or none).
    pub fn pipeline_layout(&self, kind: Option<TextureKind>) -> &wgpu::PipelineLayout {
        self.pipeline_layouts.get(kind)
    }

    // ---- meshes ----

    /// Uploads a mesh and registers it.
    pub fn create_mesh(
        &mut self,
        vertices: &[Vertex],
        indices: Option<&[u16]>,
    ) -> RenderResult<MeshHandle> {
        self.ensure_mesh_slot()?;
        let mesh = GpuMesh::new(&self.device, vertices, indices, "mesh")?;
        Ok(self.meshes.insert(mesh)?)
    }

    /// Fails with `CapacityExceeded` when no mesh slot is free.
    pub fn ensure_mesh_slot(&self) -> RenderResult<()> {
        if self.meshes.is_full() {
            return Err(pool_full("mesh", self.meshes.capacity()));
        }
        Ok(())
    }

    /// Registers a mesh built elsewhere, such as an extracted isosurface.
    pub fn insert_mesh(&mut self, mesh: GpuMesh) -> RenderResult<MeshHandle> {
        Ok(self.meshes.insert(mesh)?)
    }

    /// Stores `mesh` under an existing handle and returns the previous one, which
    /// the caller may destroy.
    pub fn replace_mesh(&mut self, handle: MeshHandle, mesh: GpuMesh) -> RenderResult<GpuMesh> {
        if handle == self.builtins.quad {
            return Err(RenderError::precondition("the built-in quad cannot be replaced"));
        }
        Ok(self.meshes.replace(handle, mesh)?)
    }

    /// Destroys a mesh and frees its slot. Callers check the render graph.
    pub(crate) fn free_mesh(&mut self, handle: MeshHandle) -> RenderResult<()> {
        if handle == self.builtins.quad {
            return Err(RenderError::precondition("the built-in quad cannot be freed"));
        }
        let mesh = self.meshes.remove(handle)?;
        mesh.destroy();
        Ok(())
    }

    pub fn mesh(&self, handle: MeshHandle) -> RenderResult<&GpuMesh> {
        Ok(self.meshes.get(handle)?)
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ---- textures ----

    /// Uploads a density volume as a 3-D texture.
    pub fn create_volume_texture(&mut self, volume: &DensityVolume) -> RenderResult<TextureHandle> {
        if self.textures.is_full() {
            return Err(pool_full("texture", self.textures.capacity()));
        }
        let texture = GpuTexture::from_volume(&self.device, &self.queue, volume)?;
        Ok(self.textures.insert(texture)?)
    }

    /// Uploads tightly packed RGBA8 pixels as a 2-D texture.
    pub fn create_texture_2d(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<TextureHandle> {
        if self.textures.is_full() {
            return Err(pool_full("texture", self.textures.capacity()));
        }
        let texture = GpuTexture::from_rgba(&self.device, &self.queue, width, height, rgba)?;
        Ok(self.textures.insert(texture)?)
    }

    /// Destroys a texture no material samples.
    pub fn free_texture(&mut self, handle: TextureHandle) -> RenderResult<()> {
        self.ensure_unsampled(MaterialTexture::Texture(handle))?;
        let texture = self.textures.remove(handle)?;
        texture.texture.destroy();
        Ok(())
    }

    pub fn texture(&self, handle: TextureHandle) -> RenderResult<&GpuTexture> {
        Ok(self.textures.get(handle)?)
    }

    // ---- offscreen targets ----

    /// Creates an offscreen color + depth target.
    pub fn create_target(&mut self, width: u32, height: u32) -> RenderResult<TargetHandle> {
        if self.targets.is_full() {
            return Err(pool_full("offscreen target", self.targets.capacity()));
        }
        let target = OffscreenTarget::new(&self.device, width, height)?;
        let handle = self.targets.insert(target)?;
        log::debug!("created offscreen target {handle:?} at {width}x{height}");
        Ok(handle)
    }

    /// Recreates a target's images at a new size under the same handle.
    ///
    /// Draw calls rendering to the target and materials sampling it keep working;
    /// sampling bind groups are rebuilt on next use.
    pub fn reinit_target(
        &mut self,
        handle: TargetHandle,
        width: u32,
        height: u32,
    ) -> RenderResult<()> {
        let target = self.targets.get_mut(handle)?;
        target.reinit(&self.device, width, height)
    }

    /// Destroys a target no material samples. Callers check the render graph.
    pub(crate) fn free_target(&mut self, handle: TargetHandle) -> RenderResult<()> {
        self.ensure_unsampled(MaterialTexture::Target(handle))?;
        let target = self.targets.remove(handle)?;
        target.destroy();
        Ok(())
    }

    pub fn target(&self, handle: TargetHandle) -> RenderResult<&OffscreenTarget> {
        Ok(self.targets.get(handle)?)
    }

    // ---- shaders and materials ----

    /// Compiles and registers a shader.
    pub fn create_shader(&mut self, builder: ShaderBuilder) -> RenderResult<ShaderHandle> {
        if self.shaders.is_full() {
            return Err(pool_full("shader", self.shaders.capacity()));
        }
        let program = builder.build(&self.device)?;
        Ok(self.shaders.insert(program)?)
    }

    pub fn shader(&self, handle: ShaderHandle) -> RenderResult<&ShaderProgram> {
        Ok(self.shaders.get(handle)?)
    }

    /// Creates a material for `shader`. The bound texture, if any, must have the
    /// dimensionality the shader declares.
    pub fn create_material(
        &mut self,
        shader: ShaderHandle,
        descriptor: MaterialDescriptor,
    ) -> RenderResult<MaterialHandle> {
        let expected = self.shaders.get(shader)?.texture;
        let provided = self.texture_kind(descriptor.texture)?;
        if expected != provided {
            return Err(RenderError::precondition(format!(
                "shader {shader:?} expects {expected:?} texture binding, material provides {provided:?}"
            )));
        }
        if self.materials.is_full() {
            return Err(pool_full("material", self.materials.capacity()));
        }

        let uniforms = MaterialUniforms {
            color: descriptor.color,
        };
        let uniform_buffer = create_uniform_buffer(&self.device, &uniforms, Some("material uniforms"));
        let handle = self.materials.insert(Material {
            shader,
            texture: descriptor.texture,
            linear_filter: descriptor.linear_filter,
            uniforms,
            uniform_buffer,
            bind_group: None,
        })?;
        log::debug!("created material {handle:?} for shader {shader:?}");
        Ok(handle)
    }

    /// Changes a material's color. Visible from the next submitted draw.
    pub fn set_material_color(&mut self, handle: MaterialHandle, color: [f32; 4]) -> RenderResult<()> {
        let material = self.materials.get_mut(handle)?;
        material.uniforms.color = color;
        self.queue
            .write_buffer(&material.uniform_buffer, 0, bytemuck::bytes_of(&material.uniforms));
        Ok(())
    }

    pub fn material(&self, handle: MaterialHandle) -> RenderResult<&Material> {
        Ok(self.materials.get(handle)?)
    }

    /// Builds the material's bind group if it is missing or the sampled target was
    /// re-initialised since it was built.
    pub fn prepare_material(&mut self, handle: MaterialHandle) -> RenderResult<()> {
        let material = self.materials.get(handle)?;
        let revision = self.texture_revision(material.texture)?;
        if material.bind_group(revision).is_some() {
            return Ok(());
        }

        let kind = self.shaders.get(material.shader)?.texture;
        let layout = self.material_layouts.get(kind);
        let view = match material.texture {
            MaterialTexture::None => None,
            MaterialTexture::Texture(t) => Some(&self.textures.get(t)?.view),
            MaterialTexture::Target(t) => Some(&self.targets.get(t)?.color_view),
        };

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: material.uniform_buffer.as_entire_binding(),
        }];
        if let (Some(kind), Some(view)) = (kind, view) {
            entries.push(wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(view),
            });
            entries.push(wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(
                    self.samplers.get(kind, material.linear_filter),
                ),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("material bind group"),
            layout,
            entries: &entries,
        });

        self.materials.get_mut(handle)?.bind_group = Some((revision, bind_group));
        log::debug!("built bind group for material {handle:?} (revision {revision})");
        Ok(())
    }

    /// The bind group built by [`prepare_material`](Self::prepare_material).
    pub fn material_bind_group(&self, handle: MaterialHandle) -> RenderResult<&wgpu::BindGroup> {
        let material = self.materials.get(handle)?;
        let revision = self.texture_revision(material.texture)?;
        material.bind_group(revision).ok_or_else(|| {
            RenderError::precondition(format!("material {handle:?} used before it was prepared"))
        })
    }

    fn texture_kind(&self, texture: MaterialTexture) -> RenderResult<Option<TextureKind>> {
        Ok(match texture {
            MaterialTexture::None => None,
            MaterialTexture::Texture(t) => Some(self.textures.get(t)?.kind),
            MaterialTexture::Target(t) => {
                self.targets.get(t)?;
                Some(TextureKind::D2)
            }
        })
    }

    fn texture_revision(&self, texture: MaterialTexture) -> RenderResult<u64> {
        Ok(match texture {
            MaterialTexture::Target(t) => self.targets.get(t)?.revision,
            MaterialTexture::None | MaterialTexture::Texture(_) => 0,
        })
    }

    fn ensure_unsampled(&self, texture: MaterialTexture) -> RenderResult<()> {
        if let Some((material, _)) = self.materials.iter().find(|(_, m)| m.texture == texture) {
            return Err(RenderError::precondition(format!(
                "{texture:?} is still sampled by material {material:?}"
            )));
        }
        Ok(())
    }

}

/// Checked before creating GPU objects so a full pool does not allocate first.
fn pool_full(resource: &str, limit: usize) -> RenderError {
    log::warn!("{resource} pool is full ({limit})");
    RenderError::CapacityExceeded {
        resource: resource.to_string(),
        limit: u64::try_from(limit).unwrap_or(u64::MAX),
    }
}

impl Drop for ResourceRegistry {
    fn drop(&mut self) {
        for mesh in self.meshes.drain() {
            mesh.destroy();
        }
        for target in self.targets.drain() {
            target.destroy();
        }
        for texture in self.textures.drain() {
            texture.texture.destroy();
        }
    }
}
