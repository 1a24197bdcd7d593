use crate::Ray;
use glam::{Mat4, Vec2, Vec3};

/// Perspective camera shared by the viewport and the path tracer.
///
/// The tracer only needs [`Camera::pick_ray`], the lens parameters and the
/// world transform; the view/projection matrices serve the interactive side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Lens diameter for depth of field. 0 = pinhole.
    pub aperture: f32,
    /// Distance along the view direction that is in perfect focus.
    pub focus_distance: f32,
}

impl Camera {
    /// Create a new camera
    pub fn new(position: Vec3, target: Vec3, aspect: f32) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            fov_y: 45.0_f32.to_radians(),
            aspect,
            near: 0.1,
            far: 100.0,
            aperture: 0.0,
            focus_distance: (target - position).length().max(1e-3),
        }
    }

    /// Set lens settings.
    pub fn with_lens(mut self, aperture: f32, focus_distance: f32) -> Self {
        self.aperture = aperture.max(0.0);
        self.focus_distance = focus_distance.max(1e-3);
        self
    }

    /// Set the vertical field of view in degrees.
    pub fn with_fov_degrees(mut self, fov: f32) -> Self {
        self.fov_y = fov.to_radians();
        self
    }

    /// Get the view matrix (world → camera space)
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix (camera → clip space)
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    /// Camera → world transform. Its X/Y/Z axes are right/up/back.
    pub fn world_transform(&self) -> Mat4 {
        self.view_matrix().inverse()
    }

    /// Update aspect ratio (e.g., on window resize)
    pub fn set_aspect(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Map a normalized screen coordinate to a world-space ray.
    ///
    /// `uv` is in `[0,1]²` with `(0,0)` at the top-left corner of the image.
    /// The returned direction is not normalized.
    pub fn pick_ray(&self, uv: Vec2) -> Ray {
        let half_height = (self.fov_y * 0.5).tan();
        let ndc_x = 2.0 * uv.x - 1.0;
        let ndc_y = 1.0 - 2.0 * uv.y;
        let camera_dir = Vec3::new(ndc_x * half_height * self.aspect, ndc_y * half_height, -1.0);

        let direction = self.world_transform().transform_vector3(camera_dir);
        Ray::new(self.position, direction)
    }

    /// Rotate the camera around its target (tumble).
    pub fn orbit(&mut self, delta_yaw: f32, delta_pitch: f32) {
        let offset = self.position - self.target;
        let radius = offset.length();
        if radius <= f32::EPSILON {
            return;
        }

        let yaw = offset.x.atan2(offset.z) + delta_yaw;
        let limit = std::f32::consts::FRAC_PI_2 - 0.01;
        let pitch = ((offset.y / radius).asin() + delta_pitch).clamp(-limit, limit);

        self.position = self.target
            + radius * Vec3::new(pitch.cos() * yaw.sin(), pitch.sin(), pitch.cos() * yaw.cos());
    }

    /// Move toward (negative) or away from (positive) the target.
    pub fn dolly(&mut self, amount: f32) {
        let offset = self.position - self.target;
        let radius = (offset.length() + amount).max(0.05);
        self.position = self.target + offset.normalize_or_zero() * radius;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> Camera {
        Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 1.0)
    }

    #[test]
    fn test_camera_creation() {
        let camera = Camera::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, 16.0 / 9.0);

        assert_eq!(camera.position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(camera.aspect, 16.0 / 9.0);
        assert_eq!(camera.aperture, 0.0);
        assert!((camera.focus_distance - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_pick_ray_center_looks_at_target() {
        let camera = test_camera();
        let ray = camera.pick_ray(Vec2::splat(0.5));

        assert_eq!(ray.origin(), camera.position);
        let dir = ray.direction().normalize();
        assert!((dir - Vec3::NEG_Z).length() < 1e-5);
    }

    #[test]
    fn test_pick_ray_corners() {
        let camera = test_camera();

        // Top-left of the image points up and to the left.
        let top_left = camera.pick_ray(Vec2::ZERO).direction();
        assert!(top_left.x < 0.0 && top_left.y > 0.0);

        // Bottom-right points down and to the right.
        let bottom_right = camera.pick_ray(Vec2::ONE).direction();
        assert!(bottom_right.x > 0.0 && bottom_right.y < 0.0);
    }

    #[test]
    fn test_world_transform_axes() {
        let camera = test_camera();
        let world = camera.world_transform();

        assert!((world.transform_point3(Vec3::ZERO) - camera.position).length() < 1e-5);
        assert!((world.transform_vector3(Vec3::X) - Vec3::X).length() < 1e-5);
        assert!((world.transform_vector3(Vec3::Y) - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_orbit_keeps_distance() {
        let mut camera = test_camera();
        camera.orbit(0.5, 0.3);

        assert!(((camera.position - camera.target).length() - 5.0).abs() < 1e-4);
        assert!(camera.position.y > 0.0);
    }

    #[test]
    fn test_dolly() {
        let mut camera = test_camera();
        camera.dolly(-2.0);
        assert!((camera.position.z - 3.0).abs() < 1e-5);

        camera.dolly(-100.0);
        assert!(camera.position.z > 0.0);
    }

    #[test]
    fn test_aspect_update() {
        let mut camera = test_camera();
        camera.set_aspect(16.0 / 9.0);
        assert_eq!(camera.aspect, 16.0 / 9.0);
    }
}
