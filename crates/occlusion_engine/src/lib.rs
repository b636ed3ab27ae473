//! # Occlusion Engine
//!
//! Frame-oriented GPU work scheduling with hardware occlusion culling.
//!
//! ## Features
//!
//! - **Task Graph**: Named tasks per frame, ordered by declared dependencies
//!   and synchronized with per-queue fences
//! - **Occlusion Queries**: One binary query per occludee, resolved into
//!   predication buffers that skip hidden draws on the GPU
//! - **Scene Traversal**: Hierarchical scenes with distance-based LOD
//! - **Recording Backend**: Deterministic software GPU for tools and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use occlusion_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RendererConfig::default();
//!     let mut camera = Camera::perspective(Vec3::new(0.0, 5.0, -20.0), 45.0, config.viewport(), 0.1, 1000.0);
//!     camera.set_target(Vec3::zeros());
//!
//!     let mut renderer = FrameRenderer::new(RecordingDevice::new(), config)?;
//!     let mut scene = renderer.load_scene(&SceneDescription::occlusion_grid(4, 4, 10.0))?;
//!     let report = renderer.render_frame(&mut scene, &camera)?;
//!     println!("{} draws", report.render.drawn);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod gpu;
pub mod render;
pub mod scene;
pub mod visibility;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError, ConfigFormat},
        core::{ApplicationConfig, CameraConfig, RendererConfig},
        foundation::math::{Mat4, Vec3},
        gpu::{recording::RecordingDevice, CommandList, GpuDevice, GpuResources, QueueType},
        render::{Frame, FramePool, FrameRenderer, FrameReport, RenderError, TaskGraphError},
        scene::{AabbVolume, Camera, FrustumVolume, NodeId, Scene, SceneDescription},
        visibility::{LodSelector, OcclusionQuery},
    };
}
