//! Per-draw uniforms and the dynamic-offset ring they live in.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use volxr_core::DrawMatrices;

use crate::buffer::align_to;

/// Per-draw uniform block (group 0, binding 0). 272 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct DrawUniforms {
    pub model: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub camera_eye_local: [f32; 3],
    pub time: f32,
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self::untransformed(0.0)
    }
}

impl DrawUniforms {
    /// Uniforms for a draw with a transform.
    pub fn transformed(matrices: &DrawMatrices, time: f32) -> Self {
        Self {
            model: matrices.model.to_cols_array_2d(),
            view_projection: matrices.view_projection.to_cols_array_2d(),
            view: matrices.view.to_cols_array_2d(),
            projection: matrices.projection.to_cols_array_2d(),
            camera_eye_local: matrices.camera_eye_local.to_array(),
            time,
        }
    }

    /// Uniforms for a draw without a transform: identity matrices, so positions
    /// reach the rasterizer as clip coordinates. Only the time is meaningful.
    pub fn untransformed(time: f32) -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            model: identity,
            view_projection: identity,
            view: identity,
            projection: identity,
            camera_eye_local: Vec3::ZERO.to_array(),
            time,
        }
    }
}

/// Size of one [`DrawUniforms`] block.
pub const DRAW_UNIFORMS_SIZE: u64 = std::mem::size_of::<DrawUniforms>() as u64;

/// A single uniform buffer holding one [`DrawUniforms`] slot per draw, bound with a
/// dynamic offset.
///
/// Slots are staged on the host and uploaded with one write before each submit.
pub struct UniformRing {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    staging: Vec<u8>,
    stride: u64,
    capacity: u32,
    next: u32,
}

impl UniformRing {
    /// Bind group layout matching the ring: one dynamic uniform buffer.
    pub fn bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("draw uniforms layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(DRAW_UNIFORMS_SIZE),
                },
                count: None,
            }],
        })
    }

    /// Creates a ring with `capacity` slots.
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: u32) -> Self {
        let align = u64::from(device.limits().min_uniform_buffer_offset_alignment);
        let stride = align_to(DRAW_UNIFORMS_SIZE, align);
        let capacity = capacity.max(1);
        let size = stride * u64::from(capacity);

        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("draw uniform ring"),
            size,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("draw uniform ring"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(DRAW_UNIFORMS_SIZE),
                }),
            }],
        });

        #[allow(clippy::cast_possible_truncation)]
        let staging = vec![0u8; size as usize];
        Self {
            buffer,
            bind_group,
            staging,
            stride,
            capacity,
            next: 0,
        }
    }

    pub fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Starts a new batch of draws.
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Stages one block and returns its dynamic offset, or `None` when full.
    pub fn push(&mut self, uniforms: &DrawUniforms) -> Option<u32> {
        if self.next >= self.capacity {
            return None;
        }
        let offset = u64::from(self.next) * self.stride;
        #[allow(clippy::cast_possible_truncation)]
        let start = offset as usize;
        let bytes = bytemuck::bytes_of(uniforms);
        self.staging[start..start + bytes.len()].copy_from_slice(bytes);
        self.next += 1;
        u32::try_from(offset).ok()
    }

    /// Uploads every block staged since the last reset.
    pub fn upload(&self, queue: &wgpu::Queue) {
        if self.next == 0 {
            return;
        }
        #[allow(clippy::cast_possible_truncation)]
        let used = (u64::from(self.next) * self.stride) as usize;
        queue.write_buffer(&self.buffer, 0, &self.staging[..used]);
    }
}
