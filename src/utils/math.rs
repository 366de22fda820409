use glam::{Quat, Vec3};
use std::fmt;
use std::ops::Mul;

/// 3D vector as it travels on the wire: `{x, y, z}` in meters
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.3}, {:.3}, {:.3})", self.x, self.y, self.z)
    }
}

impl From<Vec3> for Vector3 {
    fn from(v: Vec3) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vector3> for Vec3 {
    fn from(v: Vector3) -> Self {
        Vec3::new(v.x, v.y, v.z)
    }
}

/// Rotation quaternion as it travels on the wire: `{x, y, z, w}`
#[derive(Debug, Clone, Copy, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

impl From<Quat> for Quaternion {
    fn from(q: Quat) -> Self {
        Self::new(q.x, q.y, q.z, q.w)
    }
}

impl From<Quaternion> for Quat {
    /// Incoming rotations are normalized; a zero quaternion becomes identity.
    fn from(q: Quaternion) -> Self {
        let raw = Quat::from_xyzw(q.x, q.y, q.z, q.w);
        if raw.length_squared() <= f32::EPSILON {
            Quat::IDENTITY
        } else {
            raw.normalize()
        }
    }
}

/// Rigid transform (no scale) used by the scene graph
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(translation: Vec3, rotation: Quat) -> Self {
        Self { translation, rotation }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(translation, Quat::IDENTITY)
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            translation: rotation * -self.translation,
            rotation,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    /// Pointing direction of controllers and cameras (local -Z)
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Transform {
    type Output = Transform;

    /// `parent * child` yields the child's transform in the parent's space
    fn mul(self, child: Transform) -> Transform {
        Transform {
            translation: self.transform_point(child.translation),
            rotation: (self.rotation * child.rotation).normalize(),
        }
    }
}

/// Approximate comparisons used by tests and by the reattach no-op check
pub mod approx {
    use glam::{Quat, Vec3};

    pub const EPSILON: f32 = 1e-5;

    pub fn vec3_eq(a: Vec3, b: Vec3, tolerance: f32) -> bool {
        (a - b).abs().max_element() <= tolerance
    }

    /// `q` and `-q` describe the same rotation
    pub fn quat_eq(a: Quat, b: Quat, tolerance: f32) -> bool {
        a.dot(b).abs() >= 1.0 - tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_transform_inverse_roundtrip() {
        let t = Transform::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(FRAC_PI_2));
        let identity = t * t.inverse();
        assert!(approx::vec3_eq(identity.translation, Vec3::ZERO, approx::EPSILON));
        assert!(approx::quat_eq(identity.rotation, Quat::IDENTITY, approx::EPSILON));
    }

    #[test]
    fn test_forward_follows_rotation() {
        let t = Transform::new(Vec3::ZERO, Quat::from_rotation_y(FRAC_PI_2));
        // Yawing left by 90 degrees turns -Z into -X
        assert!(approx::vec3_eq(t.forward(), Vec3::NEG_X, approx::EPSILON));
    }

    #[test]
    fn test_zero_quaternion_becomes_identity() {
        let q: Quat = Quaternion::new(0.0, 0.0, 0.0, 0.0).into();
        assert_eq!(q, Quat::IDENTITY);
    }
}
