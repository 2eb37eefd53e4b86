//! Per-eye inputs: matrices and the images a frame is rendered into.

use glam::Mat4;
use volxr_core::SyncOptions;

use crate::capture::read_texture_rgba;
use crate::error::{RenderError, RenderResult};
use crate::texture::TARGET_COLOR_FORMAT;

/// Number of views rendered per frame.
pub const EYE_COUNT: usize = 2;

/// Camera matrices for one eye.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeView {
    pub view: Mat4,
    pub projection: Mat4,
}

impl Default for EyeView {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

impl EyeView {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self { view, projection }
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view
    }
}

/// Where an eye's display image comes from, typically an XR swapchain.
///
/// The renderer acquires at most once per eye per frame, before the first pass that
/// targets the display, and releases after the eye's last pass.
pub trait EyeImageSource {
    /// Returns a view of the image to render into.
    fn acquire(&mut self) -> RenderResult<wgpu::TextureView>;
    /// Hands the image back once its commands are submitted.
    fn release(&mut self) -> RenderResult<()>;
    /// Image size in pixels.
    fn size(&self) -> (u32, u32);
    fn format(&self) -> wgpu::TextureFormat;
}

/// A single owned texture standing in for a swapchain; used headless and in tests.
pub struct TextureEyeSource {
    texture: wgpu::Texture,
    acquired: bool,
    acquisitions: u64,
}

impl TextureEyeSource {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> RenderResult<Self> {
        if width == 0 || height == 0 {
            return Err(RenderError::TextureCreationFailed(format!(
                "invalid eye image size {width}x{height}"
            )));
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("eye image"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        Ok(Self {
            texture,
            acquired: false,
            acquisitions: 0,
        })
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// How many times the image has been acquired.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions
    }

    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    /// Reads the image back as RGBA8.
    pub fn read_pixels(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        sync: &SyncOptions,
    ) -> RenderResult<Vec<u8>> {
        read_texture_rgba(device, queue, &self.texture, sync)
    }
}

impl EyeImageSource for TextureEyeSource {
    fn acquire(&mut self) -> RenderResult<wgpu::TextureView> {
        if self.acquired {
            return Err(RenderError::precondition("eye image acquired twice"));
        }
        self.acquired = true;
        self.acquisitions += 1;
        Ok(self
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default()))
    }

    fn release(&mut self) -> RenderResult<()> {
        if !self.acquired {
            return Err(RenderError::precondition("eye image released without acquire"));
        }
        self.acquired = false;
        Ok(())
    }

    fn size(&self) -> (u32, u32) {
        (self.texture.width(), self.texture.height())
    }

    fn format(&self) -> wgpu::TextureFormat {
        self.texture.format()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_view_projection_order() {
        let view = Mat4::from_translation(Vec3::new(0.0, 0.0, -2.0));
        let projection = Mat4::from_scale(Vec3::splat(0.5));
        let eye = EyeView::new(view, projection);
        let p = eye.view_projection().transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-6);
    }
}
