//! GPU buffer management.

use wgpu::util::DeviceExt;

use crate::error::{RenderError, RenderResult};

/// Creates a vertex buffer from data.
pub fn create_vertex_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    data: &[T],
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::cast_slice(data),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates a 16-bit index buffer from data.
pub fn create_index_buffer(
    device: &wgpu::Device,
    data: &[u16],
    label: Option<&str>,
) -> wgpu::Buffer {
    // Index copies must be 4-byte aligned; pad odd counts with a trailing zero.
    let mut padded = data.to_vec();
    if padded.len() % 2 == 1 {
        padded.push(0);
    }
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::cast_slice(&padded),
        usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates a uniform buffer from data.
pub fn create_uniform_buffer<T: bytemuck::Pod>(
    device: &wgpu::Device,
    data: &T,
    label: Option<&str>,
) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label,
        contents: bytemuck::bytes_of(data),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

/// Creates a host-readable buffer for copying results back.
pub fn create_readback_buffer(device: &wgpu::Device, size: u64, label: Option<&str>) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label,
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

/// Creates an uninitialised buffer, turning allocation failure into an error instead
/// of a device-lost panic.
pub fn try_create_buffer(
    device: &wgpu::Device,
    descriptor: &wgpu::BufferDescriptor<'_>,
) -> RenderResult<wgpu::Buffer> {
    let limits = device.limits();
    if descriptor.size > limits.max_buffer_size {
        return Err(RenderError::CapacityExceeded {
            resource: format!("buffer {:?}", descriptor.label.unwrap_or("unnamed")),
            limit: limits.max_buffer_size,
        });
    }

    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    let buffer = device.create_buffer(descriptor);
    if let Some(err) = pollster::block_on(device.pop_error_scope()) {
        return Err(RenderError::BufferCreationFailed(format!(
            "{}: {err}",
            descriptor.label.unwrap_or("unnamed")
        )));
    }
    Ok(buffer)
}

/// Rounds `value` up to a multiple of `align`.
pub fn align_to(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}
