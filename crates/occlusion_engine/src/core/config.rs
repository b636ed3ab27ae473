//! # Renderer and Application Configuration
//!
//! Configuration structures for the visibility renderer. Every structure is
//! serializable through the [`Config`] trait (TOML or RON) and carries a
//! `validate` method that is run before the values are used.
//!
//! ## Configuration Categories
//!
//! - **Renderer Config**: frame pool depth, LOD step, occlusion capacity, debug passes
//! - **Camera Config**: initial eye, target and lens
//! - **Application Config**: top-level aggregate used by the viewer

use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;
use crate::gpu::Viewport;

pub use crate::config::{Config, ConfigError};

/// Default distance covered by a single LOD level
pub const DEFAULT_LOD_DISTANCE_STEP: f32 = 200.0;

/// Default number of frames the CPU may record ahead of the GPU
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 3;

/// Upper bound for buffered frames
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// # Renderer Configuration
///
/// Controls frame buffering, LOD selection and the optional debug passes of
/// the frame renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of buffered frames in the frame pool
    pub frames_in_flight: usize,
    /// World distance covered by each LOD level
    pub lod_distance_step: f32,
    /// Occlusion query capacity; defaults to the scene's occludee count
    pub occlusion_capacity: Option<usize>,
    /// Wrap the main pass in a pipeline statistics query
    pub enable_statistics_query: bool,
    /// Draw node bounds on top of the main pass
    pub draw_bounding_boxes: bool,
    /// Render target clear color
    pub clear_color: [f32; 4],
    /// Depth clear value
    pub clear_depth: f32,
    /// Viewport width in pixels
    pub width: u32,
    /// Viewport height in pixels
    pub height: u32,
}

impl RendererConfig {
    /// Create a renderer configuration with defaults
    pub fn new() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            lod_distance_step: DEFAULT_LOD_DISTANCE_STEP,
            occlusion_capacity: None,
            enable_statistics_query: cfg!(debug_assertions),
            draw_bounding_boxes: false,
            clear_color: [0.4, 0.6, 0.9, 1.0],
            clear_depth: 1.0,
            width: 1280,
            height: 720,
        }
    }

    /// Set the number of buffered frames
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Set the LOD distance step
    pub fn with_lod_distance_step(mut self, step: f32) -> Self {
        self.lod_distance_step = step;
        self
    }

    /// Override the occlusion query capacity
    pub fn with_occlusion_capacity(mut self, capacity: usize) -> Self {
        self.occlusion_capacity = Some(capacity);
        self
    }

    /// Enable or disable the pipeline statistics query
    pub fn with_statistics_query(mut self, enabled: bool) -> Self {
        self.enable_statistics_query = enabled;
        self
    }

    /// Enable or disable the bounding box overlay
    pub fn with_bounding_boxes(mut self, enabled: bool) -> Self {
        self.draw_bounding_boxes = enabled;
        self
    }

    /// Set the viewport size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Full-window viewport for the configured size
    pub fn viewport(&self) -> Viewport {
        Viewport::new(self.width as f32, self.height as f32)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("Frames in flight must be at least 1".to_string());
        }

        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!("Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}"));
        }

        if !(self.lod_distance_step.is_finite() && self.lod_distance_step > 0.0) {
            return Err(format!("LOD distance step must be positive, got {}", self.lod_distance_step));
        }

        if self.occlusion_capacity == Some(0) {
            return Err("Occlusion capacity must be at least 1 when set".to_string());
        }

        if self.width == 0 || self.height == 0 {
            return Err("Viewport size must be non-zero".to_string());
        }

        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// # Camera Configuration
///
/// Initial placement and lens of the scene camera. The field of view is in
/// degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Eye position
    pub position: [f32; 3],
    /// Look-at target
    pub target: [f32; 3],
    /// Up direction
    pub up: [f32; 3],
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip distance
    pub near: f32,
    /// Far clip distance
    pub far: f32,
}

impl CameraConfig {
    /// Eye position as a vector
    pub fn position(&self) -> Vec3 {
        Vec3::from(self.position)
    }

    /// Target as a vector
    pub fn target(&self) -> Vec3 {
        Vec3::from(self.target)
    }

    /// Up direction as a vector
    pub fn up(&self) -> Vec3 {
        Vec3::from(self.up)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if !(self.fov_degrees > 0.0 && self.fov_degrees < 180.0) {
            return Err(format!("Field of view must be in (0, 180) degrees, got {}", self.fov_degrees));
        }

        if !(self.near > 0.0 && self.far > self.near) {
            return Err(format!("Clip planes must satisfy 0 < near < far, got {} / {}", self.near, self.far));
        }

        if self.position == self.target {
            return Err("Camera position and target must differ".to_string());
        }

        if self.up().cross(&(self.target() - self.position())).norm_squared() <= f32::EPSILON {
            return Err("Camera up direction must not be parallel to the view direction".to_string());
        }

        Ok(())
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            position: [-45.0, 37.0, -60.0],
            target: [0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0],
            fov_degrees: 45.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

/// # Complete Application Configuration
///
/// Top-level configuration that encompasses the renderer, the camera and the
/// logging filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Default log filter (overridden by `RUST_LOG`)
    pub log_level: String,
    /// Renderer configuration
    pub renderer: RendererConfig,
    /// Camera configuration
    pub camera: CameraConfig,
}

impl ApplicationConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.renderer.validate()?;
        self.camera.validate()?;
        Ok(())
    }

    /// Load from file and validate
    pub fn load_validated(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            renderer: RendererConfig::default(),
            camera: CameraConfig::default(),
        }
    }
}

impl Config for ApplicationConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    #[test]
    fn test_defaults_are_valid() {
        assert!(ApplicationConfig::default().validate().is_ok());
        assert_eq!(RendererConfig::default().frames_in_flight, 3);
        assert_eq!(RendererConfig::default().lod_distance_step, 200.0);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        assert!(RendererConfig::new().with_frames_in_flight(0).validate().is_err());
        assert!(RendererConfig::new().with_frames_in_flight(9).validate().is_err());
        assert!(RendererConfig::new().with_frames_in_flight(8).validate().is_ok());
    }

    #[test]
    fn test_lod_step_must_be_positive() {
        assert!(RendererConfig::new().with_lod_distance_step(0.0).validate().is_err());
        assert!(RendererConfig::new().with_lod_distance_step(f32::NAN).validate().is_err());
    }

    #[test]
    fn test_camera_rejects_degenerate_lens() {
        let config = CameraConfig { near: 10.0, far: 1.0, ..CameraConfig::default() };
        assert!(config.validate().is_err());

        let config = CameraConfig { up: [0.0, 1.0, 0.0], position: [0.0, 5.0, 0.0], ..CameraConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_ron_fills_defaults() {
        let text = "(renderer: (frames_in_flight: 2, draw_bounding_boxes: true))";
        let config = ApplicationConfig::from_str_with_format(text, ConfigFormat::Ron).unwrap();

        assert_eq!(config.renderer.frames_in_flight, 2);
        assert!(config.renderer.draw_bounding_boxes);
        assert_eq!(config.camera, CameraConfig::default());
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ApplicationConfig {
            renderer: RendererConfig::new().with_occlusion_capacity(16),
            ..ApplicationConfig::default()
        };
        let text = config.to_string_with_format(ConfigFormat::Toml).unwrap();
        let parsed = ApplicationConfig::from_str_with_format(&text, ConfigFormat::Toml).unwrap();

        assert_eq!(parsed, config);
    }
}
