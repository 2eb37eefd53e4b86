//! Model transforms for draw calls.

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// A model transform stored as separate components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Translation component.
    pub translation: Vec3,
    /// Rotation component as a quaternion.
    pub rotation: Quat,
    /// Scale component.
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    /// Creates a new identity transform.
    #[must_use]
    pub fn identity() -> Self {
        Self::default()
    }

    /// Creates a transform from a translation.
    #[must_use]
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    /// Creates a transform from a uniform or per-axis scale.
    #[must_use]
    pub fn from_scale(scale: Vec3) -> Self {
        Self {
            scale,
            ..Default::default()
        }
    }

    /// Decomposes a matrix. Shear is lost.
    #[must_use]
    pub fn from_matrix(matrix: Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    #[must_use]
    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// The model matrix: scale, then rotate, then translate.
    #[must_use]
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Per-draw matrices derived from a model transform and an eye's camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawMatrices {
    pub model: Mat4,
    pub view: Mat4,
    pub projection: Mat4,
    pub view_projection: Mat4,
    /// Eye position expressed in the model's local space.
    pub camera_eye_local: Vec3,
}

impl DrawMatrices {
    /// Computes the matrices for one draw.
    ///
    /// The eye position is `inverse(model) * inverse(view) * origin`. A singular
    /// model matrix leaves the eye at the local origin.
    #[must_use]
    pub fn new(model: Mat4, view: Mat4, projection: Mat4) -> Self {
        let eye_world = view.inverse().transform_point3(Vec3::ZERO);
        let inverse_model = model.inverse();
        let camera_eye_local = if inverse_model.is_finite() {
            inverse_model.transform_point3(eye_world)
        } else {
            Vec3::ZERO
        };
        Self {
            model,
            view,
            projection,
            view_projection: projection * view,
            camera_eye_local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matrix() {
        assert_eq!(Transform::identity().to_matrix(), Mat4::IDENTITY);
    }

    #[test]
    fn test_matrix_round_trip() {
        let t = Transform::from_translation(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Quat::from_rotation_y(0.5))
            .with_scale(Vec3::splat(2.0));
        let back = Transform::from_matrix(t.to_matrix());
        assert!((back.translation - t.translation).length() < 1e-5);
        assert!((back.scale - t.scale).length() < 1e-5);
    }

    #[test]
    fn test_camera_eye_local() {
        // Eye at world (0, 0, 5) looking at the origin.
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let model = Transform::from_translation(Vec3::new(0.0, 0.0, 1.0))
            .with_scale(Vec3::splat(2.0))
            .to_matrix();
        let m = DrawMatrices::new(model, view, Mat4::IDENTITY);
        // World (0,0,5) -> minus translation (0,0,4) -> divided by scale (0,0,2).
        assert!((m.camera_eye_local - Vec3::new(0.0, 0.0, 2.0)).length() < 1e-4);
    }

    #[test]
    fn test_small_uniform_scale_is_invertible() {
        // det = 0.004^3, far below f32::EPSILON, yet the matrix inverts fine.
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        let model = Transform::from_scale(Vec3::splat(0.004)).to_matrix();
        let m = DrawMatrices::new(model, view, Mat4::IDENTITY);
        assert!((m.camera_eye_local - Vec3::new(0.0, 0.0, 1250.0)).length() < 0.5);
    }

    #[test]
    fn test_singular_model_keeps_origin() {
        let m = DrawMatrices::new(Mat4::ZERO, Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(m.camera_eye_local, Vec3::ZERO);
    }
}
