//! # Scene Camera
//!
//! Perspective camera that owns its view frustum. Every change to placement
//! or lens rebuilds the frustum, so culling code can hold a reference to the
//! camera and always test against current planes.
//!
//! ## Matrix Convention
//! - View space is right-handed, Y-up, looking down -Z
//! - An axis flip (`X`) turns it into a +Z-forward, Y-down space
//! - The projection maps depth to `[0, 1]`
//! - `view_projection = P * X * V`

use crate::core::config::CameraConfig;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::gpu::Viewport;
use crate::scene::volumes::FrustumVolume;

/// Squared sine of the smallest angle accepted between view direction and up
const PARALLEL_TOLERANCE: f32 = 1.0e-6;

/// Perspective camera with a cached frustum
///
/// Fields are private: mutation goes through setters so the cached matrices
/// and frustum never go stale.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov: f32,
    near: f32,
    far: f32,
    viewport: Viewport,
    view: Mat4,
    projection: Mat4,
    view_projection: Mat4,
    frustum: FrustumVolume,
}

impl Camera {
    /// Create a new perspective camera looking at the origin
    ///
    /// # Arguments
    /// * `position` - Camera position in world space
    /// * `fov_degrees` - Vertical field of view in degrees
    /// * `viewport` - Viewport the camera renders into; supplies the aspect ratio
    /// * `near` - Distance to near clipping plane (must be > 0)
    /// * `far` - Distance to far clipping plane (must be > near)
    pub fn perspective(position: Vec3, fov_degrees: f32, viewport: Viewport, near: f32, far: f32) -> Self {
        let mut camera = Self {
            position,
            target: Vec3::zeros(),
            up: Vec3::y(),
            fov: fov_degrees.to_radians(),
            near,
            far,
            viewport,
            view: Mat4::identity(),
            projection: Mat4::identity(),
            view_projection: Mat4::identity(),
            frustum: FrustumVolume::from_view_projection(&Mat4::identity()),
        };
        camera.rebuild();
        camera
    }

    /// Create a camera from configuration
    ///
    /// The configuration is expected to be validated; see [`CameraConfig::validate`].
    pub fn from_config(config: &CameraConfig, viewport: Viewport) -> Self {
        let mut camera = Self::perspective(config.position(), config.fov_degrees, viewport, config.near, config.far);
        camera.look_at(config.target(), config.up());
        camera
    }

    /// Update camera position in world space
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        log::trace!("Camera position updated to: {:?}", position);
        self.rebuild();
    }

    /// Update camera target (look-at point)
    pub fn set_target(&mut self, target: Vec3) {
        self.target = target;
        log::trace!("Camera target updated to: {:?}", target);
        self.rebuild();
    }

    /// Set the target point and up vector together
    ///
    /// # Arguments
    /// * `target` - Point in world space to look at
    /// * `up` - Up vector; need not be perpendicular to the view direction.
    ///   When it is parallel, a world axis stands in for it.
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.target = target;
        self.up = up;
        log::trace!("Camera look_at updated - target: {:?}, up: {:?}", target, up);
        self.rebuild();
    }

    /// Move position and target together
    pub fn translate(&mut self, offset: Vec3) {
        self.position += offset;
        self.target += offset;
        self.rebuild();
    }

    /// Change the lens
    pub fn set_lens(&mut self, fov_degrees: f32, near: f32, far: f32) {
        self.fov = fov_degrees.to_radians();
        self.near = near;
        self.far = far;
        self.rebuild();
    }

    /// Update the viewport; the aspect ratio follows
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if (self.viewport.aspect_ratio() - viewport.aspect_ratio()).abs() > 0.01 {
            log::debug!(
                "Camera aspect ratio changed: {:.3} -> {:.3}",
                self.viewport.aspect_ratio(),
                viewport.aspect_ratio()
            );
        }
        self.viewport = viewport;
        self.rebuild();
    }

    fn rebuild(&mut self) {
        let forward = self.target - self.position;
        if forward.norm_squared() <= f32::EPSILON {
            log::warn!("Camera target coincides with its position {:?}; keeping the previous view", self.position);
        } else {
            self.view = Mat4::look_at(self.position, self.target, self.view_up(&forward));
        }
        self.projection = Mat4::perspective(self.fov, self.viewport.aspect_ratio(), self.near, self.far);
        self.view_projection = self.projection * Mat4::view_axis_flip() * self.view;
        self.frustum = FrustumVolume::from_view_projection(&self.view_projection);
    }

    /// Up vector for `look_at`, swapped for a world axis when the configured
    /// one is parallel to `forward`
    fn view_up(&self, forward: &Vec3) -> Vec3 {
        let direction = forward.normalize();
        let up = self.up.try_normalize(f32::EPSILON).unwrap_or_else(Vec3::y);
        if direction.cross(&up).norm_squared() > PARALLEL_TOLERANCE {
            return up;
        }
        let fallback = if direction.z.abs() < 0.9 { Vec3::z() } else { Vec3::x() };
        log::warn!("Camera view direction {:?} is parallel to up {:?}; using {:?} as up", direction, self.up, fallback);
        fallback
    }

    /// Camera position in world space
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Look-at target in world space
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Viewport the camera renders into
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// World-to-view matrix
    pub fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// View-to-clip matrix
    pub fn projection_matrix(&self) -> &Mat4 {
        &self.projection
    }

    /// World-to-clip matrix, `P * X * V`
    pub fn view_projection_matrix(&self) -> &Mat4 {
        &self.view_projection
    }

    /// Frustum matching the current view-projection
    pub fn frustum(&self) -> &FrustumVolume {
        &self.frustum
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::volumes::AabbVolume;

    fn unit_box_at(center: Vec3) -> AabbVolume {
        AabbVolume::from_center_extents(center, Vec3::repeat(1.0)).unwrap()
    }

    #[test]
    fn test_frustum_follows_target() {
        let mut camera = Camera::perspective(Vec3::zeros(), 60.0, Viewport::new(800.0, 600.0), 0.1, 100.0);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        let ahead = unit_box_at(Vec3::new(0.0, 0.0, -20.0));
        let behind = unit_box_at(Vec3::new(0.0, 0.0, 20.0));

        assert!(camera.frustum().intersects(&ahead));
        assert!(!camera.frustum().intersects(&behind));

        camera.set_target(Vec3::new(0.0, 0.0, 1.0));
        assert!(!camera.frustum().intersects(&ahead));
        assert!(camera.frustum().intersects(&behind));
    }

    #[test]
    fn test_from_config_looks_at_origin() {
        let camera = Camera::from_config(&CameraConfig::default(), Viewport::new(1280.0, 720.0));

        assert_eq!(camera.position(), Vec3::new(-45.0, 37.0, -60.0));
        assert!(camera.frustum().contains_point(&Vec3::zeros()));
        assert!(!camera.frustum().contains_point(&Vec3::new(-90.0, 74.0, -120.0)));
    }

    #[test]
    fn test_lens_change_moves_far_plane() {
        let mut camera = Camera::perspective(Vec3::zeros(), 60.0, Viewport::new(100.0, 100.0), 0.1, 100.0);
        camera.set_target(Vec3::new(0.0, 0.0, -1.0));
        let distant = unit_box_at(Vec3::new(0.0, 0.0, -500.0));
        assert!(!camera.frustum().intersects(&distant));

        camera.set_lens(60.0, 0.1, 1000.0);
        assert!(camera.frustum().intersects(&distant));
    }

    #[test]
    fn test_looking_along_up_stays_finite() {
        let mut camera = Camera::perspective(Vec3::new(0.0, 100.0, 20.0), 60.0, Viewport::new(320.0, 240.0), 0.1, 1000.0);
        camera.set_target(Vec3::new(0.0, 0.0, 20.0));

        assert!(camera.view_projection_matrix().iter().all(|value| value.is_finite()));
        let below = AabbVolume::new(Vec3::new(-1.0, -1.0, 19.0), Vec3::new(1.0, 1.0, 21.0)).unwrap();
        assert!(camera.frustum().intersects(&below));
        assert!(!camera.frustum().intersects(&unit_box_at(Vec3::new(0.0, 200.0, 20.0))));

        // Straight up from below, and along z with a z up vector
        camera.set_position(Vec3::new(0.0, -50.0, 20.0));
        assert!(camera.view_projection_matrix().iter().all(|value| value.is_finite()));
        assert!(camera.frustum().intersects(&below));

        camera.look_at(Vec3::new(0.0, -50.0, 60.0), Vec3::z());
        assert!(camera.view_projection_matrix().iter().all(|value| value.is_finite()));
        assert!(camera.frustum().intersects(&unit_box_at(Vec3::new(0.0, -50.0, 40.0))));
    }

    #[test]
    fn test_target_on_position_keeps_previous_view() {
        let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 10.0), 60.0, Viewport::new(320.0, 240.0), 0.1, 100.0);
        let view = *camera.view_matrix();

        camera.set_target(Vec3::new(0.0, 0.0, 10.0));

        assert_eq!(camera.view_matrix(), &view);
        assert!(camera.view_projection_matrix().iter().all(|value| value.is_finite()));
    }
}
