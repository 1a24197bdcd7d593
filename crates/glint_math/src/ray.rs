use crate::{Mat4, Vec3};

/// A ray in 3D space with an origin and a direction.
///
/// The direction is *not* normalized by contract. Transforming a ray into an
/// object's local frame keeps the parameter `t` meaningful in both frames,
/// which is what the traversal relies on, and the volumetric test scales its
/// distances by `direction().length()`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    origin: Vec3,
    direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    #[inline]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Get the origin point of the ray.
    #[inline]
    pub fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Get the direction vector of the ray.
    #[inline]
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Get the point along the ray at parameter t.
    ///
    /// Returns: origin + t * direction
    #[inline]
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Express this ray in another frame (typically an object's inverse transform).
    ///
    /// The direction is transformed without translation and without
    /// renormalization, so `self.at(t)` and `transformed.at(t)` describe the same point.
    #[inline]
    pub fn transformed(&self, m: &Mat4) -> Ray {
        Ray::new(m.transform_point3(self.origin), m.transform_vector3(self.direction))
    }
}

impl Default for Ray {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            direction: Vec3::NEG_Z,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_ray_creation() {
        let origin = Vec3::new(1.0, 2.0, 3.0);
        let direction = Vec3::new(0.0, 1.0, 0.0);
        let ray = Ray::new(origin, direction);

        assert_eq!(ray.origin(), origin);
        assert_eq!(ray.direction(), direction);
    }

    #[test]
    fn test_ray_at() {
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        assert_eq!(ray.at(0.0), Vec3::ZERO);
        assert_eq!(ray.at(1.0), Vec3::X);
        assert_eq!(ray.at(2.0), Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(ray.at(-1.0), Vec3::new(-1.0, 0.0, 0.0));
    }

    #[test]
    fn test_ray_direction_not_normalized() {
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -4.0));
        assert_eq!(ray.direction().length(), 4.0);
        assert_eq!(ray.at(0.5), Vec3::new(0.0, 0.0, -2.0));
    }

    #[test]
    fn test_transformed_preserves_parameter() {
        let to_world = Mat4::from_scale_rotation_translation(
            Vec3::splat(2.0),
            Quat::from_rotation_y(0.7),
            Vec3::new(3.0, -1.0, 5.0),
        );
        let to_local = to_world.inverse();

        let ray = Ray::new(Vec3::new(1.0, 2.0, 3.0), Vec3::new(0.3, -0.2, -1.0));
        let local = ray.transformed(&to_local);

        let t = 1.75;
        let back = to_world.transform_point3(local.at(t));
        assert!((back - ray.at(t)).length() < 1e-4);
    }
}
