//! Dense 8-bit density volumes.

#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_possible_wrap
)]

use glam::{UVec3, Vec3};

use crate::error::{CoreError, Result};

/// An immutable grid of density samples, one byte per voxel.
///
/// Voxels are stored x-fastest: `x + y * w + z * w * h`. Sampling uses normalized
/// coordinates in `[0, 1]^3` with linear filtering and mirrored-repeat addressing,
/// matching how the volume is read on the GPU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DensityVolume {
    dims: UVec3,
    data: Vec<u8>,
}

impl DensityVolume {
    /// Wraps raw voxel bytes.
    pub fn new(dims: UVec3, data: Vec<u8>) -> Result<Self> {
        if dims.min_element() == 0 {
            return Err(CoreError::precondition(format!(
                "volume dimensions must be non-zero, got {dims}"
            )));
        }
        let expected = dims.x as usize * dims.y as usize * dims.z as usize;
        if data.len() != expected {
            return Err(CoreError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { dims, data })
    }

    /// Builds a volume by evaluating `f` at each voxel index.
    pub fn from_fn(dims: UVec3, mut f: impl FnMut(UVec3) -> u8) -> Result<Self> {
        let mut data = Vec::with_capacity(dims.x as usize * dims.y as usize * dims.z as usize);
        for z in 0..dims.z {
            for y in 0..dims.y {
                for x in 0..dims.x {
                    data.push(f(UVec3::new(x, y, z)));
                }
            }
        }
        Self::new(dims, data)
    }

    /// A filled sphere: voxels whose centre lies within `radius` (normalized units) of
    /// the volume centre are 255, the rest 0.
    pub fn sphere(dim: u32, radius: f32) -> Result<Self> {
        let dims = UVec3::splat(dim);
        let size = dims.as_vec3();
        Self::from_fn(dims, |p| {
            let centre = (p.as_vec3() + 0.5) / size;
            if centre.distance(Vec3::splat(0.5)) <= radius {
                255
            } else {
                0
            }
        })
    }

    /// Grid dimensions in voxels.
    pub fn dims(&self) -> UVec3 {
        self.dims
    }

    /// Raw voxel bytes, x-fastest.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Voxel value at an integer coordinate. Coordinates outside the grid are
    /// mirrored back in.
    pub fn texel(&self, x: i32, y: i32, z: i32) -> u8 {
        let x = mirror(x, self.dims.x);
        let y = mirror(y, self.dims.y);
        let z = mirror(z, self.dims.z);
        self.data[x + y * self.dims.x as usize + z * (self.dims.x * self.dims.y) as usize]
    }

    /// Trilinearly filtered density in `[0, 1]` at a normalized coordinate.
    pub fn sample(&self, p: Vec3) -> f32 {
        // Texel centres sit at (i + 0.5) / size.
        let t = p * self.dims.as_vec3() - 0.5;
        let base = t.floor();
        let f = t - base;
        let (bx, by, bz) = (base.x as i32, base.y as i32, base.z as i32);

        let mut acc = 0.0;
        for corner in 0..8 {
            let dx = corner & 1;
            let dy = (corner >> 1) & 1;
            let dz = (corner >> 2) & 1;
            let wx = if dx == 1 { f.x } else { 1.0 - f.x };
            let wy = if dy == 1 { f.y } else { 1.0 - f.y };
            let wz = if dz == 1 { f.z } else { 1.0 - f.z };
            let v = f32::from(self.texel(bx + dx, by + dy, bz + dz)) / 255.0;
            acc += v * wx * wy * wz;
        }
        acc
    }
}

/// Mirrored-repeat addressing of an integer texel index.
fn mirror(i: i32, size: u32) -> usize {
    let size = size as i32;
    let period = 2 * size;
    let m = i.rem_euclid(period);
    if m >= size {
        (period - 1 - m) as usize
    } else {
        m as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_mismatch() {
        let err = DensityVolume::new(UVec3::new(2, 2, 2), vec![0; 7]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::SizeMismatch {
                expected: 8,
                actual: 7
            }
        ));
    }

    #[test]
    fn test_zero_dims_rejected() {
        let err = DensityVolume::new(UVec3::new(0, 2, 2), vec![]).unwrap_err();
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn test_mirror_addressing() {
        assert_eq!(mirror(-1, 4), 0);
        assert_eq!(mirror(4, 4), 3);
        assert_eq!(mirror(5, 4), 2);
        assert_eq!(mirror(8, 4), 0);
    }

    #[test]
    fn test_sample_at_texel_centre_is_exact() {
        let vol = DensityVolume::from_fn(UVec3::new(4, 4, 4), |p| (p.x * 60) as u8).unwrap();
        let centre = Vec3::new(2.5, 1.5, 0.5) / 4.0;
        let expected = 120.0 / 255.0;
        assert!((vol.sample(centre) - expected).abs() < 1e-5);
    }

    #[test]
    fn test_sample_interpolates_between_texels() {
        let vol = DensityVolume::from_fn(UVec3::new(2, 1, 1), |p| if p.x == 0 { 0 } else { 255 })
            .unwrap();
        // Halfway between the two texel centres.
        assert!((vol.sample(Vec3::new(0.5, 0.5, 0.5)) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_sphere_is_symmetric() {
        let vol = DensityVolume::sphere(8, 0.3).unwrap();
        assert_eq!(vol.texel(0, 0, 0), 0);
        assert_eq!(vol.texel(3, 3, 3), 255);
        assert_eq!(vol.texel(4, 4, 4), 255);
        assert_eq!(vol.texel(1, 3, 3), vol.texel(6, 3, 3));
    }
}
