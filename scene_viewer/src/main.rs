//! Occlusion culling scene viewer
//!
//! Loads a scene (or generates a wall with a grid of boxes behind it),
//! orbits the camera around it and renders frames on the recording device,
//! logging what each pass did.
//!
//! ```text
//! scene_viewer [--config config.toml] [--scene scene.ron] [--frames 120]
//! ```

use std::path::PathBuf;

use clap::Parser;
use occlusion_engine::config::Config;
use occlusion_engine::core::ApplicationConfig;
use occlusion_engine::foundation::math::Vec3;
use occlusion_engine::gpu::recording::RecordingDevice;
use occlusion_engine::render::{root, FrameRenderer};
use occlusion_engine::scene::{AabbVolume, Camera, Scene, SceneDescription};

const DEFAULT_FRAMES: u64 = 120;
const ORBIT_DEGREES_PER_FRAME: f32 = 1.5;

#[derive(Parser, Debug)]
#[command(name = "scene_viewer", about = "Renders an occlusion culled scene on the recording device")]
struct Args {
    /// Application config (TOML or RON)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Scene description (RON or TOML); generates an occlusion grid when omitted
    #[arg(long, value_name = "FILE")]
    scene: Option<PathBuf>,

    /// Number of frames to render
    #[arg(long, default_value_t = DEFAULT_FRAMES)]
    frames: u64,
}

/// Occluder boxes in world space
fn occluder_bounds(scene: &Scene) -> Vec<AabbVolume> {
    scene
        .nodes()
        .filter_map(|(_, node)| node.geometry().filter(|g| g.occluder).map(|g| g.bounds))
        .collect()
}

/// Stand in for the depth test: a box is visible when any corner has a clear
/// line of sight to the eye
fn install_visibility_test(device: &RecordingDevice, eye: Vec3, occluders: Vec<AabbVolume>) -> Result<(), Box<dyn std::error::Error>> {
    device.set_visibility_test(root::OCCLUSION_BOUNDS, move |min, max| {
        let Some(bounds) = AabbVolume::new(*min, *max) else {
            return true;
        };
        bounds
            .corners()
            .iter()
            .any(|corner| !occluders.iter().any(|occluder| occluder.intersects_segment(&eye, corner)))
    })?;
    Ok(())
}

fn orbit(camera: &mut Camera, focus: Vec3, degrees: f32) {
    let offset = camera.position() - focus;
    let (sin, cos) = degrees.to_radians().sin_cos();
    let rotated = Vec3::new(offset.x * cos + offset.z * sin, offset.y, -offset.x * sin + offset.z * cos);
    camera.set_position(focus + rotated);
    camera.set_target(focus);
}

fn run(args: &Args, config: ApplicationConfig) -> Result<(), Box<dyn std::error::Error>> {
    let description = match &args.scene {
        Some(path) => {
            log::info!("Loading scene from {}", path.display());
            SceneDescription::load_from_file(path)?
        }
        None => {
            log::info!("No scene given, generating occlusion grid");
            SceneDescription::occlusion_grid(6, 8, 12.0)
        }
    };

    let viewport = config.renderer.viewport();
    let mut renderer = FrameRenderer::new(RecordingDevice::new(), config.renderer.clone())?;
    let mut scene = renderer.load_scene(&description)?;
    renderer.device().set_execution_log_enabled(false)?;

    let focus = scene.focus_point();
    let occluders = occluder_bounds(&scene);
    let mut camera = Camera::from_config(&config.camera, viewport);

    let mut drawn = 0;
    for _ in 0..args.frames {
        install_visibility_test(renderer.device(), camera.position(), occluders.clone())?;
        let report = renderer.render_frame(&mut scene, &camera)?;
        log::debug!(
            "Frame {} (slot {}): {} queries, {} drawn, {} outside frustum",
            report.frame_number,
            report.slot,
            report.occlusion.queries_issued,
            report.render.drawn,
            report.render.frustum_culled
        );
        drawn += report.render.drawn;
        orbit(&mut camera, focus, ORBIT_DEGREES_PER_FRAME);
    }
    renderer.wait_idle()?;

    let stats = renderer.device().stats()?;
    log::info!(
        "Rendered {} frames: {} draws recorded, {} executed, {} skipped by predication, {} queries resolved",
        renderer.frames_rendered(),
        drawn,
        stats.draws_executed,
        stats.draws_suppressed,
        stats.queries_resolved
    );
    if let Some(statistics) = renderer.pipeline_statistics()? {
        log::info!("Last frame: {} primitives, {} pixel shader invocations", statistics.ia_primitives, statistics.ps_invocations);
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ApplicationConfig::load_validated(path)?,
        None => ApplicationConfig::default(),
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.log_level.as_str())).init();
    log::info!("Starting scene viewer");

    match run(&args, config) {
        Ok(()) => {
            log::info!("Scene viewer finished successfully");
            Ok(())
        }
        Err(e) => {
            log::error!("Scene viewer error: {e}");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_arguments() {
        let args = Args::try_parse_from(["scene_viewer"]).unwrap();
        assert!(args.config.is_none());
        assert!(args.scene.is_none());
        assert_eq!(args.frames, DEFAULT_FRAMES);
    }

    #[test]
    fn test_named_options() {
        let args = Args::try_parse_from(["scene_viewer", "--scene", "city.ron", "--frames", "5"]).unwrap();
        assert!(args.config.is_none());
        assert_eq!(args.scene, Some(PathBuf::from("city.ron")));
        assert_eq!(args.frames, 5);
    }

    #[test]
    fn test_invalid_frame_count_is_rejected() {
        assert!(Args::try_parse_from(["scene_viewer", "--frames", "many"]).is_err());
        assert!(Args::try_parse_from(["scene_viewer", "city.ron"]).is_err());
    }
}
