//! Primary ray generation with pixel jitter and a thin-lens model.

use glint_math::{Camera, Ray, Vec2, Vec3};
use rand::RngCore;

use crate::sampling::{gen_f32, random_in_unit_disk};

/// Generate a jittered camera ray through pixel `(x, y)`.
///
/// The jitter is uniform in `[-1, 1]` pixels on both axes, so neighbouring
/// pixels' footprints overlap (a tent-like reconstruction over many passes).
/// With a non-zero aperture the origin is moved across the lens and the ray
/// re-aimed at the point `focus_distance` along the pinhole direction.
pub fn generate_ray(camera: &Camera, x: u32, y: u32, width: u32, height: u32, rng: &mut dyn RngCore) -> Ray {
    let jitter = Vec2::new(gen_f32(rng) * 2.0 - 1.0, gen_f32(rng) * 2.0 - 1.0);
    let uv = Vec2::new(
        (x as f32 + 0.5 + jitter.x) / width.max(1) as f32,
        (y as f32 + 0.5 + jitter.y) / height.max(1) as f32,
    );
    let pinhole = camera.pick_ray(uv);

    if camera.aperture <= 0.0 {
        return pinhole;
    }

    let world = camera.world_transform();
    let right: Vec3 = world.x_axis.truncate();
    let up: Vec3 = world.y_axis.truncate();

    let lens = random_in_unit_disk(rng) * (0.5 * camera.aperture);
    let focus_point = pinhole.origin() + camera.focus_distance * pinhole.direction().normalize_or_zero();
    let origin = pinhole.origin() + right * lens.x + up * lens.y;

    Ray::new(origin, focus_point - origin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn camera() -> Camera {
        Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0)
    }

    #[test]
    fn test_pinhole_rays_start_at_camera() {
        let mut rng = StdRng::seed_from_u64(42);
        let cam = camera();
        for _ in 0..50 {
            let ray = generate_ray(&cam, 3, 7, 16, 16, &mut rng);
            assert_eq!(ray.origin(), cam.position);
        }
    }

    #[test]
    fn test_center_pixel_jitter_stays_near_axis() {
        let mut rng = StdRng::seed_from_u64(42);
        let cam = camera();
        // Center pixel of a 101-wide image: jitter moves the ray by at most one pixel.
        let half_width = (cam.fov_y * 0.5).tan();
        let max_offset = 2.0 * half_width * 1.5 / 101.0;
        for _ in 0..100 {
            let dir = generate_ray(&cam, 50, 50, 101, 101, &mut rng).direction();
            let dir = dir / -dir.z;
            assert!(dir.x.abs() <= max_offset && dir.y.abs() <= max_offset);
        }
    }

    #[test]
    fn test_rows_go_down_the_image() {
        let mut rng = StdRng::seed_from_u64(42);
        let cam = camera();
        let top = generate_ray(&cam, 8, 0, 16, 16, &mut rng).direction();
        let bottom = generate_ray(&cam, 8, 15, 16, 16, &mut rng).direction();
        assert!(top.y > 0.0);
        assert!(bottom.y < 0.0);
    }

    #[test]
    fn test_thin_lens_converges_at_focus_distance() {
        let mut rng = StdRng::seed_from_u64(42);
        let cam = camera().with_lens(0.5, 5.0);

        let mut origins_differ = false;
        for _ in 0..50 {
            let ray = generate_ray(&cam, 50, 50, 101, 101, &mut rng);
            if (ray.origin() - cam.position).length() > 1e-4 {
                origins_differ = true;
            }
            // The lens offset lies in the camera's XY plane.
            assert!((ray.origin().z - cam.position.z).abs() < 1e-4);
            assert!((ray.origin() - cam.position).length() <= 0.25 + 1e-4);

            // Every center-pixel ray passes close to the focus point on the axis.
            let t = (ray.origin().z - 0.0) / -ray.direction().z;
            let at_focus = ray.at(t);
            assert!(at_focus.truncate().length() < 0.1, "{at_focus:?}");
        }
        assert!(origins_differ);
    }
}
