// Transform utilities for Mat4
//
// Extends glam::Mat4 with the pieces the tracer and the scene builder need on
// top of transform_point3()/transform_vector3()/inverse().

use crate::Aabb;
use glam::{Mat4, Vec3};

/// Extension trait for Mat4 to provide additional transform utilities
pub trait Mat4Ext {
    /// Transform a surface normal given the *inverse* of the object-to-world
    /// matrix. Uses the inverse transpose so non-uniform scale keeps normals
    /// perpendicular to the surface. The result is normalized.
    fn transform_normal_by_inverse(&self, normal: Vec3) -> Vec3;

    /// Transform an axis-aligned bounding box.
    /// Computes the bounding box of all 8 transformed corners.
    fn transform_aabb(&self, aabb: &Aabb) -> Aabb;
}

impl Mat4Ext for Mat4 {
    fn transform_normal_by_inverse(&self, normal: Vec3) -> Vec3 {
        self.transpose().transform_vector3(normal).normalize_or_zero()
    }

    fn transform_aabb(&self, aabb: &Aabb) -> Aabb {
        if aabb.is_empty() {
            return Aabb::EMPTY;
        }

        let lo = aabb.min();
        let hi = aabb.max();

        let mut result_min = Vec3::splat(f32::INFINITY);
        let mut result_max = Vec3::splat(f32::NEG_INFINITY);
        for corner in 0..8 {
            let p = Vec3::new(
                if corner & 1 == 0 { lo.x } else { hi.x },
                if corner & 2 == 0 { lo.y } else { hi.y },
                if corner & 4 == 0 { lo.z } else { hi.z },
            );
            let q = self.transform_point3(p);
            result_min = result_min.min(q);
            result_max = result_max.max(q);
        }

        Aabb::from_points(result_min, result_max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_transform_aabb_translation() {
        let mat = Mat4::from_translation(Vec3::new(5.0, 5.0, 5.0));
        let aabb = Aabb::from_points(Vec3::ZERO, Vec3::ONE);
        let transformed = mat.transform_aabb(&aabb);

        assert!((transformed.min() - Vec3::splat(5.0)).length() < 0.001);
        assert!((transformed.max() - Vec3::splat(6.0)).length() < 0.001);
    }

    #[test]
    fn test_transform_aabb_rotation_grows_box() {
        let mat = Mat4::from_rotation_y(std::f32::consts::FRAC_PI_4);
        let aabb = Aabb::from_points(Vec3::splat(-1.0), Vec3::splat(1.0));
        let transformed = mat.transform_aabb(&aabb);

        let expected = 2.0_f32.sqrt();
        assert!((transformed.x.max - expected).abs() < 0.001);
        assert!((transformed.y.max - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_transform_aabb_empty_stays_empty() {
        let mat = Mat4::from_scale(Vec3::splat(3.0));
        assert!(mat.transform_aabb(&Aabb::EMPTY).is_empty());
    }

    #[test]
    fn test_normal_under_non_uniform_scale() {
        // A sphere squashed along Y: the normal at the top must still point up,
        // and a 45 degree normal must tilt toward the squashed axis.
        let to_world = Mat4::from_scale(Vec3::new(1.0, 0.5, 1.0));
        let inv = to_world.inverse();

        let up = inv.transform_normal_by_inverse(Vec3::Y);
        assert!((up - Vec3::Y).length() < 1e-5);

        let diag = inv.transform_normal_by_inverse(Vec3::new(1.0, 1.0, 0.0).normalize());
        assert!(diag.y > diag.x);
        assert!((diag.length() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_normal_under_rotation() {
        let to_world = Mat4::from_quat(Quat::from_rotation_z(std::f32::consts::FRAC_PI_2));
        let inv = to_world.inverse();

        let n = inv.transform_normal_by_inverse(Vec3::X);
        assert!((n - Vec3::Y).length() < 1e-5);
    }
}
