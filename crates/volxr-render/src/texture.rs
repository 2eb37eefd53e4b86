//! Textures and offscreen render targets.

use volxr_core::DensityVolume;

use crate::error::{RenderError, RenderResult};

/// Color format of offscreen targets.
pub const TARGET_COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
/// Depth format used by every pass.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

/// Dimensionality of a sampled texture, as a material sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    D3,
}

/// A sampled texture with its default view.
#[derive(Debug)]
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub kind: TextureKind,
}

impl GpuTexture {
    /// Uploads a density volume as a single-channel 3-D texture.
    pub fn from_volume(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        volume: &DensityVolume,
    ) -> RenderResult<Self> {
        let dims = volume.dims();
        let max = device.limits().max_texture_dimension_3d;
        if dims.max_element() > max {
            return Err(RenderError::TextureCreationFailed(format!(
                "volume {dims} exceeds the 3-D texture limit of {max}"
            )));
        }
        let size = wgpu::Extent3d {
            width: dims.x,
            height: dims.y,
            depth_or_array_layers: dims.z,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("density volume"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D3,
            format: wgpu::TextureFormat::R8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            volume.data(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(dims.x),
                rows_per_image: Some(dims.y),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        log::debug!("uploaded density volume {dims}");
        Ok(Self {
            texture,
            view,
            kind: TextureKind::D3,
        })
    }

    /// Uploads tightly packed RGBA8 pixels as a 2-D texture.
    pub fn from_rgba(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> RenderResult<Self> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() != expected || width == 0 || height == 0 {
            return Err(RenderError::SizeMismatch {
                expected,
                actual: rgba.len(),
            });
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("rgba texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(Self {
            texture,
            view,
            kind: TextureKind::D2,
        })
    }
}

/// Creates a depth texture and its view.
pub fn create_depth_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

/// An offscreen color + depth pair.
///
/// Resizing recreates both images; `revision` increases each time so bind groups
/// that sample the color image know to rebuild.
#[derive(Debug)]
pub struct OffscreenTarget {
    pub color: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth: wgpu::Texture,
    pub depth_view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub revision: u64,
}

impl OffscreenTarget {
    /// Creates a target of the given size.
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> RenderResult<Self> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::TextureCreationFailed(format!(
                "invalid target size {width}x{height} (limit {max})"
            )));
        }
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen color"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let (depth, depth_view) = create_depth_texture(device, width, height);
        Ok(Self {
            color,
            color_view,
            depth,
            depth_view,
            width,
            height,
            revision: 0,
        })
    }

    /// Destroys the backing images and recreates them at a new size.
    pub fn reinit(&mut self, device: &wgpu::Device, width: u32, height: u32) -> RenderResult<()> {
        let mut fresh = Self::new(device, width, height)?;
        self.color.destroy();
        self.depth.destroy();
        fresh.revision = self.revision + 1;
        *self = fresh;
        log::debug!("offscreen target reinitialised at {width}x{height}");
        Ok(())
    }

    pub fn destroy(&self) {
        self.color.destroy();
        self.depth.destroy();
    }
}
