//! GPU meshes.

use bytemuck::{Pod, Zeroable};

use crate::buffer::{create_index_buffer, create_vertex_buffer};
use crate::error::{RenderError, RenderResult};

/// Interleaved vertex: position, uv, normal. 32 bytes.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
        }
    }
}

/// Vertex buffer layouts a shader can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// [`Vertex`]: position, uv, normal.
    Standard,
    /// Bare `vec3<f32>` positions, as produced by isosurface extraction.
    PositionOnly,
}

const STANDARD_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x2, 2 => Float32x3];
const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

impl VertexLayout {
    /// Bytes per vertex.
    pub fn stride(self) -> u64 {
        match self {
            Self::Standard => std::mem::size_of::<Vertex>() as u64,
            Self::PositionOnly => 12,
        }
    }

    /// The wgpu description of this layout.
    pub fn buffer_layout(self) -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: self.stride(),
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: match self {
                Self::Standard => &STANDARD_ATTRIBUTES,
                Self::PositionOnly => &POSITION_ATTRIBUTES,
            },
        }
    }
}

/// Indices of an indexed mesh.
#[derive(Debug)]
pub struct IndexData {
    pub buffer: wgpu::Buffer,
    pub count: u32,
}

/// A drawable mesh: vertex storage, optional 16-bit indices, and a triangle-list
/// primitive count.
#[derive(Debug)]
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub indices: Option<IndexData>,
    /// Vertices drawn when not indexed.
    pub vertex_count: u32,
    pub layout: VertexLayout,
}

impl GpuMesh {
    /// Uploads interleaved vertices and optional indices.
    pub fn new(
        device: &wgpu::Device,
        vertices: &[Vertex],
        indices: Option<&[u16]>,
        label: &str,
    ) -> RenderResult<Self> {
        if vertices.is_empty() {
            return Err(RenderError::precondition(format!("mesh '{label}' has no vertices")));
        }
        let vertex_count = u32::try_from(vertices.len())
            .map_err(|_| RenderError::BufferCreationFailed(format!("mesh '{label}' too large")))?;

        let indices = match indices {
            Some(idx) => {
                if let Some(bad) = idx.iter().find(|&&i| u32::from(i) >= vertex_count) {
                    return Err(RenderError::precondition(format!(
                        "mesh '{label}' index {bad} out of range ({vertex_count} vertices)"
                    )));
                }
                let count = u32::try_from(idx.len()).map_err(|_| {
                    RenderError::BufferCreationFailed(format!("mesh '{label}' too many indices"))
                })?;
                Some(IndexData {
                    buffer: create_index_buffer(device, idx, Some(label)),
                    count,
                })
            }
            None => None,
        };

        Ok(Self {
            vertex_buffer: create_vertex_buffer(device, vertices, Some(label)),
            indices,
            vertex_count,
            layout: VertexLayout::Standard,
        })
    }

    /// Wraps a position-only buffer produced on the GPU. No data is copied.
    pub fn from_positions(buffer: wgpu::Buffer, vertex_count: u32) -> Self {
        Self {
            vertex_buffer: buffer,
            indices: None,
            vertex_count,
            layout: VertexLayout::PositionOnly,
        }
    }

    pub fn is_indexed(&self) -> bool {
        self.indices.is_some()
    }

    /// Number of triangles drawn.
    pub fn triangle_count(&self) -> u32 {
        self.indices
            .as_ref()
            .map_or(self.vertex_count, |i| i.count)
            / 3
    }

    /// Releases GPU memory now rather than on drop.
    pub fn destroy(&self) {
        self.vertex_buffer.destroy();
        if let Some(indices) = &self.indices {
            indices.buffer.destroy();
        }
    }
}

/// Unit quad in the z = 0 plane spanning `[-1, 1]^2`, counter-clockwise, with uvs
/// in top-left image convention.
pub fn quad_vertices() -> ([Vertex; 4], [u16; 6]) {
    let n = [0.0, 0.0, 1.0];
    (
        [
            Vertex::new([-1.0, -1.0, 0.0], [0.0, 1.0], n),
            Vertex::new([1.0, -1.0, 0.0], [1.0, 1.0], n),
            Vertex::new([1.0, 1.0, 0.0], [1.0, 0.0], n),
            Vertex::new([-1.0, 1.0, 0.0], [0.0, 0.0], n),
        ],
        [0, 1, 2, 0, 2, 3],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_stride() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(VertexLayout::Standard.stride(), 32);
        assert_eq!(VertexLayout::PositionOnly.stride(), 12);
    }

    #[test]
    fn test_quad_is_counter_clockwise() {
        let (v, idx) = quad_vertices();
        for tri in idx.chunks(3) {
            let a = glam::Vec3::from(v[tri[0] as usize].position);
            let b = glam::Vec3::from(v[tri[1] as usize].position);
            let c = glam::Vec3::from(v[tri[2] as usize].position);
            assert!((b - a).cross(c - a).z > 0.0);
        }
    }
}
