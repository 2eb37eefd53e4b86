//! Reading rendered images back to the host.

use std::path::Path;

use image::{ImageBuffer, Rgba};
use volxr_core::SyncOptions;

use crate::buffer::create_readback_buffer;
use crate::error::{RenderError, RenderResult};
use crate::sync::{map_read_blocking, read_mapped};
use crate::texture::OffscreenTarget;

/// Calculates bytes per row with proper alignment for wgpu buffer copies.
pub fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

/// Copies a 4-byte-per-pixel texture into host memory, row padding removed.
///
/// The texture needs `COPY_SRC` usage. Waits for the copy within the `sync` budget.
pub fn read_texture_rgba(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    sync: &SyncOptions,
) -> RenderResult<Vec<u8>> {
    let width = texture.width();
    let height = texture.height();
    let bytes_per_row = aligned_bytes_per_row(width);
    let buffer = create_readback_buffer(
        device,
        u64::from(bytes_per_row) * u64::from(height),
        Some("capture readback"),
    );

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("capture copy encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(std::iter::once(encoder.finish()));

    map_read_blocking(device, &buffer, sync)?;
    let padded = read_mapped(&buffer, bytes_per_row as usize * height as usize)?;
    buffer.destroy();

    let row_bytes = width as usize * 4;
    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in padded.chunks_exact(bytes_per_row as usize) {
        pixels.extend_from_slice(&row[..row_bytes]);
    }

    if matches!(
        texture.format(),
        wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
    ) {
        for px in pixels.chunks_exact_mut(4) {
            px.swap(0, 2);
        }
    }
    Ok(pixels)
}

/// Reads an offscreen target's color image as tightly packed RGBA8.
pub fn read_target_pixels(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    target: &OffscreenTarget,
    sync: &SyncOptions,
) -> RenderResult<Vec<u8>> {
    read_texture_rgba(device, queue, &target.color, sync)
}

fn to_image(rgba: &[u8], width: u32, height: u32) -> RenderResult<ImageBuffer<Rgba<u8>, Vec<u8>>> {
    let expected = width as usize * height as usize * 4;
    if rgba.len() != expected {
        return Err(RenderError::SizeMismatch {
            expected,
            actual: rgba.len(),
        });
    }
    ImageBuffer::from_raw(width, height, rgba.to_vec())
        .ok_or_else(|| RenderError::ImageOutput("invalid image dimensions".into()))
}

/// Encodes RGBA8 pixels as PNG in memory.
pub fn encode_png(rgba: &[u8], width: u32, height: u32) -> RenderResult<Vec<u8>> {
    let img = to_image(rgba, width, height)?;
    let mut buffer = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buffer, image::ImageFormat::Png)
        .map_err(|e| RenderError::ImageOutput(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// Writes RGBA8 pixels to a PNG file.
pub fn save_png(path: impl AsRef<Path>, rgba: &[u8], width: u32, height: u32) -> RenderResult<()> {
    let path = path.as_ref();
    let img = to_image(rgba, width, height)?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| RenderError::ImageOutput(format!("{}: {e}", path.display())))?;
    log::info!("saved {width}x{height} image to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_alignment() {
        assert_eq!(aligned_bytes_per_row(4), 256);
        assert_eq!(aligned_bytes_per_row(64), 256);
        assert_eq!(aligned_bytes_per_row(65), 512);
    }

    #[test]
    fn test_encode_png_signature() {
        let rgba = [0u8, 0, 255, 255].repeat(4);
        let png = encode_png(&rgba, 2, 2).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_encode_png_rejects_wrong_size() {
        let err = encode_png(&[0u8; 12], 2, 2).unwrap_err();
        assert!(matches!(
            err,
            RenderError::SizeMismatch {
                expected: 16,
                actual: 12
            }
        ));
    }
}
