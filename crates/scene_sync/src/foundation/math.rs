//! Math utilities and types
//!
//! Host scene graphs author transforms in double precision, so every type
//! here is `f64`. Render backends down-convert when they pull values.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3};

/// 3D vector type
pub type Vec3 = Vector3<f64>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f64>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f64>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and uniform scale
    pub fn from_position_scale(position: Vec3, scale: f64) -> Self {
        Self {
            position,
            scale: Vec3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Compose into a 4x4 matrix: scale, then rotate, then translate
    pub fn to_matrix(&self) -> Mat4 {
        let translation = Mat4::new_translation(&self.position);
        let rotation = self.rotation.to_homogeneous();
        let scale = Mat4::new_nonuniform_scaling(&self.scale);
        translation * rotation * scale
    }
}

/// Accumulate local matrices from root to leaf into a world matrix.
///
/// The iterator yields the root first; each subsequent matrix is applied
/// in the parent's space.
pub fn compose_world<I>(locals: I) -> Mat4
where
    I: IntoIterator<Item = Mat4>,
{
    locals
        .into_iter()
        .fold(Mat4::identity(), |world, local| world * local)
}

/// Extract the translation column of an affine matrix
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transform_to_matrix_translation() {
        let t = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let m = t.to_matrix();
        assert_relative_eq!(translation_of(&m), Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_compose_world_applies_parent_first() {
        let parent = Transform::from_position_scale(Vec3::new(10.0, 0.0, 0.0), 2.0).to_matrix();
        let child = Transform::from_position(Vec3::new(1.0, 0.0, 0.0)).to_matrix();

        let world = compose_world([parent, child]);

        // Child offset is scaled by the parent before the parent translation
        assert_relative_eq!(translation_of(&world), Vec3::new(12.0, 0.0, 0.0));
    }

    #[test]
    fn test_compose_world_empty_is_identity() {
        let world = compose_world(std::iter::empty());
        assert_relative_eq!(world, Mat4::identity());
    }
}
