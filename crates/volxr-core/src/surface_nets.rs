//! Surface-nets isosurface extraction, CPU reference.
//!
//! Two passes over an `N^3` grid of cells laid over the unit cube:
//!
//! 1. **Classify**: each cell samples the density at its 8 corners. Corners above the
//!    threshold set a bit in an occupancy mask. Cells that are fully inside or fully
//!    outside are empty; every other cell records the mean of its inside corners.
//! 2. **Triangulate**: each non-empty cell `c` tests the XY, XZ and YZ planes. For a
//!    plane with axes `a`, `b` it emits `(c, c+a, c+b)` and `(c, c-a, c-b)` whenever
//!    both neighbours exist and are non-empty.
//!
//! The GPU extractor runs the same two passes as compute shaders; this module is the
//! executable definition used to check it.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use bytemuck::{Pod, Zeroable};
use glam::{IVec3, UVec3, Vec3};

use crate::error::{CoreError, Result};
use crate::volume::DensityVolume;

/// Worst-case vertex budget per cell used to size output buffers.
pub const DEFAULT_MAX_VERTICES_PER_CELL: u32 = 36;

/// Most triangles a single cell can emit: two per plane, three planes.
pub const MAX_TRIANGLES_PER_CELL: u32 = 6;

/// Axis pairs tested by the triangulation pass, in emission order.
pub const PLANES: [(IVec3, IVec3); 3] = [
    (IVec3::X, IVec3::Y),
    (IVec3::X, IVec3::Z),
    (IVec3::Y, IVec3::Z),
];

/// Per-cell output of the classification pass.
///
/// Layout matches the storage buffer the compute shaders share: 16 bytes, position
/// then mask. A zero mask means no surface crosses the cell.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CellRecord {
    pub position: [f32; 3],
    pub mask: u32,
}

impl CellRecord {
    pub const EMPTY: Self = Self {
        position: [0.0; 3],
        mask: 0,
    };

    pub fn is_empty(&self) -> bool {
        self.mask == 0
    }

    pub fn position(&self) -> Vec3 {
        Vec3::from_array(self.position)
    }
}

/// Offset of corner `k` of a cell, bit 0 = x, bit 1 = y, bit 2 = z.
pub fn corner_offset(k: u32) -> UVec3 {
    UVec3::new(k & 1, (k >> 1) & 1, (k >> 2) & 1)
}

/// Flattened index of a cell, x-fastest.
pub fn cell_index(cell: UVec3, n: u32) -> usize {
    cell.x as usize + cell.y as usize * n as usize + cell.z as usize * (n as usize).pow(2)
}

/// Number of vertex slots reserved for an `n^3` extraction.
pub fn vertex_capacity(n: u32, max_vertices_per_cell: u32) -> u64 {
    u64::from(n).pow(3) * u64::from(max_vertices_per_cell)
}

/// Pass 1: classifies every cell of an `n^3` grid.
pub fn classify(volume: &DensityVolume, n: u32, threshold: f32) -> Result<Vec<CellRecord>> {
    if n == 0 {
        return Err(CoreError::precondition("sampling rate must be non-zero"));
    }
    let inv = 1.0 / n as f32;
    let mut records = vec![CellRecord::EMPTY; (n as usize).pow(3)];
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let cell = UVec3::new(x, y, z);
                records[cell_index(cell, n)] = classify_cell(volume, cell, inv, threshold);
            }
        }
    }
    Ok(records)
}

fn classify_cell(volume: &DensityVolume, cell: UVec3, inv: f32, threshold: f32) -> CellRecord {
    let mut mask = 0u32;
    let mut sum = Vec3::ZERO;
    let mut count = 0u32;
    for k in 0..8 {
        let p = (cell + corner_offset(k)).as_vec3() * inv;
        if volume.sample(p) > threshold {
            mask |= 1 << k;
            sum += p;
            count += 1;
        }
    }
    if count == 0 || count == 8 {
        return CellRecord::EMPTY;
    }
    CellRecord {
        position: (sum / count as f32).to_array(),
        mask,
    }
}

/// Pass 2: emits the unindexed triangle list for classified records.
pub fn triangulate(records: &[CellRecord], n: u32) -> Result<Vec<Vec3>> {
    let expected = (n as usize).pow(3);
    if records.len() != expected {
        return Err(CoreError::SizeMismatch {
            expected,
            actual: records.len(),
        });
    }

    let neighbour = |c: IVec3| {
        let in_range = c.cmpge(IVec3::ZERO).all() && c.cmplt(IVec3::splat(n as i32)).all();
        if !in_range {
            return None;
        }
        let record = &records[cell_index(c.as_uvec3(), n)];
        (!record.is_empty()).then_some(record)
    };

    let mut vertices = Vec::new();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let cell = UVec3::new(x, y, z);
                let current = &records[cell_index(cell, n)];
                if current.is_empty() {
                    continue;
                }
                let c = cell.as_ivec3();
                for (a, b) in PLANES {
                    for sign in [1, -1] {
                        let pair = (neighbour(c + a * sign), neighbour(c + b * sign));
                        if let (Some(ra), Some(rb)) = pair {
                            vertices.push(current.position());
                            vertices.push(ra.position());
                            vertices.push(rb.position());
                        }
                    }
                }
            }
        }
    }
    Ok(vertices)
}

/// Runs both passes.
pub fn extract(volume: &DensityVolume, n: u32, threshold: f32) -> Result<Vec<Vec3>> {
    let records = classify(volume, n, threshold)?;
    triangulate(&records, n)
}
