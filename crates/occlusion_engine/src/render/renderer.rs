//! Per-frame render orchestration
//!
//! [`FrameRenderer`] records one frame as five tasks chained by
//! dependencies:
//!
//! ```text
//! clear -> depth -> occlusion -> render -> present
//! ```
//!
//! `depth` lays down occluder depth, `occlusion` tests every occludee's
//! bounds against it, `render` draws the whole scene with occludees
//! predicated on their query results, and `present` copies the color target
//! into the swap chain.

use std::time::Duration;

use bytemuck::{Pod, Zeroable};

use super::error::RenderResult;
use super::frame::FrameTargets;
use super::frame_pool::FramePool;
use super::queues::CommandQueues;
use super::root;
use crate::config::ConfigError;
use crate::core::RendererConfig;
use crate::foundation::math::Mat4;
use crate::foundation::time::FrameTimer;
use crate::gpu::{
    BufferDesc, BufferHandle, BufferUsage, CommandList, GpuDevice, GpuResources, PipelineDesc,
    PipelineHandle, PipelineStatistics, PrimitiveTopology, QueueType, ResourceState, TextureHandle,
    Viewport,
};
use crate::scene::{Camera, DrawContext, Scene, SceneDescription, TraversalStats};
use crate::visibility::{LodSelector, StatisticsQuery};

/// Hemisphere ambient light colors
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AmbientLight {
    /// Color for upward-facing normals
    pub up: [f32; 4],
    /// Color for downward-facing normals
    pub down: [f32; 4],
}

impl Default for AmbientLight {
    fn default() -> Self {
        Self { up: [0.0, 0.8, 0.7, 1.0], down: [0.3, 0.0, 0.3, 1.0] }
    }
}

/// Pipeline states used by the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScenePipelines {
    /// Lit, textured scene geometry
    pub render: PipelineHandle,
    /// Wireframe bounding boxes expanded from points
    pub bounds: PipelineHandle,
    /// Depth-only occluder pass
    pub depth: PipelineHandle,
    /// Depth-tested, write-disabled bounding box proxies
    pub occlusion: PipelineHandle,
}

impl ScenePipelines {
    /// Create the four pipelines
    pub fn new(resources: &dyn GpuResources) -> RenderResult<Self> {
        Ok(Self {
            render: resources.create_pipeline(&PipelineDesc::new(
                "TriangleRenderPipeline",
                PrimitiveTopology::TriangleList,
                true,
                true,
            ))?,
            bounds: resources.create_pipeline(&PipelineDesc::new(
                "AABBRenderPipeline",
                PrimitiveTopology::PointList,
                false,
                true,
            ))?,
            depth: resources.create_pipeline(&PipelineDesc::new(
                "DepthPretestPipeline",
                PrimitiveTopology::TriangleList,
                true,
                false,
            ))?,
            occlusion: resources.create_pipeline(&PipelineDesc::new(
                "OcclusionCullingPipeline",
                PrimitiveTopology::PointList,
                false,
                false,
            ))?,
        })
    }
}

/// What one call to [`FrameRenderer::render_frame`] recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    /// Frames rendered before this one
    pub frame_number: u64,
    /// Frame pool slot used
    pub slot: usize,
    /// Occluders drawn into depth
    pub depth: TraversalStats,
    /// Occlusion queries recorded
    pub occlusion: TraversalStats,
    /// Main pass draws
    pub render: TraversalStats,
    /// Bounding boxes drawn by the overlay
    pub bounds_drawn: usize,
    /// Task names in execution order
    pub task_order: Vec<String>,
}

/// Records and submits frames for a scene
pub struct FrameRenderer<D: GpuDevice> {
    device: D,
    config: RendererConfig,
    queues: CommandQueues,
    frames: FramePool<D>,
    pipelines: ScenePipelines,
    ambient: BufferHandle,
    statistics: Option<StatisticsQuery>,
    frames_rendered: u64,
    fps_timer: FrameTimer,
    statistics_timer: FrameTimer,
}

impl<D: GpuDevice> FrameRenderer<D> {
    /// Create queues, frames, pipelines and the ambient light buffer
    pub fn new(device: D, config: RendererConfig) -> RenderResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let queues = CommandQueues::new(&device)?;
        let frames = FramePool::new(&device, config.frames_in_flight, config.width, config.height)?;
        let pipelines = ScenePipelines::new(&device)?;

        let ambient_light = AmbientLight::default();
        let ambient = device.create_buffer(&BufferDesc::new(
            "Ambient",
            std::mem::size_of::<AmbientLight>() as u64,
            BufferUsage::CONSTANT | BufferUsage::UPLOAD,
            ResourceState::GenericRead,
        ))?;
        device.write_buffer(ambient, 0, bytemuck::bytes_of(&ambient_light))?;

        let statistics = if config.enable_statistics_query {
            Some(StatisticsQuery::new(&device)?)
        } else {
            None
        };

        log::info!(
            "Frame renderer ready: {} frames in flight, statistics {}, bounding boxes {}",
            config.frames_in_flight,
            if statistics.is_some() { "on" } else { "off" },
            if config.draw_bounding_boxes { "on" } else { "off" }
        );

        Ok(Self {
            device,
            config,
            queues,
            frames,
            pipelines,
            ambient,
            statistics,
            frames_rendered: 0,
            fps_timer: FrameTimer::default(),
            statistics_timer: FrameTimer::new(Duration::from_secs(5)),
        })
    }

    /// Underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Renderer configuration
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Pipelines used by the passes
    pub fn pipelines(&self) -> &ScenePipelines {
        &self.pipelines
    }

    /// Ambient light constant buffer
    pub fn ambient_buffer(&self) -> BufferHandle {
        self.ambient
    }

    /// Number of buffered frames
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Frames rendered so far
    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Record work into an `upload` task, submit it and wait for completion
    pub fn upload_content<T>(
        &mut self,
        record: impl FnOnce(&D, &mut dyn CommandList) -> RenderResult<T>,
    ) -> RenderResult<T> {
        let device = &self.device;
        let queues = &self.queues;
        let frame = self.frames.begin_frame(device, queues)?;
        let task = frame.create_task(device, QueueType::Direct, None, "upload")?;
        let value = record(device, frame.command_list(task)?)?;
        frame.submit(device, queues)?;
        frame.wait_cpu(device, queues)?;
        log::debug!("Upload task finished");
        Ok(value)
    }

    /// Build a scene from a description, upload it and wait for the upload
    pub fn load_scene(&mut self, desc: &SceneDescription) -> RenderResult<Scene> {
        let frame_slots = self.frames.len();
        let capacity = self.config.occlusion_capacity;
        let mut scene = self.upload_content(|device, upload| {
            Ok(Scene::from_description(desc, device, upload, frame_slots, capacity)?)
        })?;
        scene.finish_upload(&self.device)?;
        Ok(scene.with_lod_selector(LodSelector::new(self.config.lod_distance_step)))
    }

    /// Record and submit one frame
    pub fn render_frame(&mut self, scene: &mut Scene, camera: &Camera) -> RenderResult<FrameReport> {
        let device = &self.device;
        let queues = &self.queues;
        let config = &self.config;
        let pipelines = self.pipelines;
        let ambient = self.ambient;
        let view_projection = *camera.view_projection_matrix();
        let viewport = camera.viewport();

        let frame = self.frames.begin_frame(device, queues)?;
        let slot = frame.slot();
        let targets = frame.targets();
        let ctx = DrawContext::new(device, camera, slot);

        let clear = frame.create_task(device, QueueType::Direct, None, "clear")?;
        record_clear(frame.command_list(clear)?, &targets, config)?;

        let depth = frame.create_task(device, QueueType::Direct, Some(pipelines.depth), "depth")?;
        frame.add_dependency(depth, "clear")?;
        let depth_stats = {
            let cmd = frame.command_list(depth)?;
            cmd.begin_event("Depth Prepass")?;
            bind_pass(cmd, viewport, None, targets.depth, &view_projection)?;
            cmd.set_constant_buffer(root::AMBIENT, ambient)?;
            let stats = scene.draw_occluders(&ctx, cmd)?;
            cmd.end_event()?;
            stats
        };

        let occlusion = frame.create_task(device, QueueType::Direct, Some(pipelines.occlusion), "occlusion")?;
        frame.add_dependency(occlusion, "depth")?;
        let occlusion_stats = {
            let cmd = frame.command_list(occlusion)?;
            cmd.begin_event("Occlusion Culling")?;
            bind_pass(cmd, viewport, None, targets.depth, &view_projection)?;
            let stats = scene.run_occlusion(cmd, camera.frustum())?;
            cmd.end_event()?;
            stats
        };

        let render = frame.create_task(device, QueueType::Direct, Some(pipelines.render), "render")?;
        frame.add_dependency(render, "occlusion")?;
        let (render_stats, bounds_drawn) = {
            let cmd = frame.command_list(render)?;
            cmd.begin_event("Render")?;
            if let Some(query) = self.statistics.as_mut() {
                // A failed frame may have left it open on a discarded list
                query.reset();
                query.begin(cmd)?;
            }
            bind_pass(cmd, viewport, Some(targets.render_target), targets.depth, &view_projection)?;
            cmd.set_constant_buffer(root::AMBIENT, ambient)?;
            let stats = scene.draw(&ctx, cmd)?;
            if let Some(query) = self.statistics.as_mut() {
                query.end(cmd)?;
                query.resolve(cmd)?;
            }

            let mut bounds_drawn = 0;
            if config.draw_bounding_boxes {
                cmd.set_pipeline(pipelines.bounds)?;
                cmd.set_constants_f32(root::BOUNDS_VIEW_PROJECTION, view_projection.as_slice(), 0)?;
                bounds_drawn = scene.draw_bounds(cmd)?;
            }
            cmd.end_event()?;
            (stats, bounds_drawn)
        };

        let present = frame.create_task(device, QueueType::Direct, None, "present")?;
        frame.add_dependency(present, "render")?;
        record_present(frame.command_list(present)?, &targets)?;

        frame.submit(device, queues)?;
        let task_order = frame.submission_names().into_iter().map(str::to_string).collect();

        let report = FrameReport {
            frame_number: self.frames_rendered,
            slot,
            depth: depth_stats,
            occlusion: occlusion_stats,
            render: render_stats,
            bounds_drawn,
            task_order,
        };
        self.frames_rendered += 1;
        log::trace!("Frame {}: {report:?}", report.frame_number);

        if let Some(fps) = self.fps_timer.tick() {
            log::info!("FPS: {fps:.0}");
        }
        if self.statistics_timer.tick().is_some() {
            if let Some(stats) = self.pipeline_statistics()? {
                log::info!("Primitives rendered: {}", stats.ia_primitives);
                log::info!("VS invocations: {}", stats.vs_invocations);
                log::info!("PS invocations: {}", stats.ps_invocations);
            }
        }
        Ok(report)
    }

    /// Counters of the last resolved statistics query, if enabled
    pub fn pipeline_statistics(&self) -> RenderResult<Option<PipelineStatistics>> {
        Ok(self
            .statistics
            .as_ref()
            .map(|query| query.statistics(&self.device))
            .transpose()?)
    }

    /// Wait for every frame in flight
    pub fn wait_idle(&mut self) -> RenderResult<()> {
        self.frames.wait_idle(&self.device, &self.queues)?;
        Ok(())
    }
}

fn bind_pass(
    cmd: &mut dyn CommandList,
    viewport: Viewport,
    color: Option<TextureHandle>,
    depth: TextureHandle,
    view_projection: &Mat4,
) -> RenderResult<()> {
    cmd.set_viewport(viewport)?;
    cmd.set_render_targets(color, Some(depth))?;
    cmd.set_constants_f32(root::VIEW_PROJECTION, view_projection.as_slice(), 0)?;
    Ok(())
}

fn record_clear(cmd: &mut dyn CommandList, targets: &FrameTargets, config: &RendererConfig) -> RenderResult<()> {
    cmd.begin_event("Clear")?;
    cmd.transition_barrier(targets.render_target.into(), ResourceState::RenderTarget)?;
    cmd.clear_render_target(targets.render_target, config.clear_color)?;
    cmd.clear_depth(targets.depth, config.clear_depth)?;
    cmd.end_event()?;
    Ok(())
}

fn record_present(cmd: &mut dyn CommandList, targets: &FrameTargets) -> RenderResult<()> {
    cmd.begin_event("Present")?;
    cmd.transition_barrier(targets.swap_chain.into(), ResourceState::CopyDest)?;
    cmd.transition_barrier(targets.render_target.into(), ResourceState::CopySource)?;
    cmd.copy_resource(targets.render_target.into(), targets.swap_chain.into())?;
    cmd.transition_barrier(targets.swap_chain.into(), ResourceState::Present)?;
    cmd.end_event()?;
    Ok(())
}

impl<D: GpuDevice> Drop for FrameRenderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::warn!("Failed to wait for frames in flight on shutdown: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::gpu::recording::RecordingDevice;

    fn renderer(config: RendererConfig) -> FrameRenderer<RecordingDevice> {
        FrameRenderer::new(RecordingDevice::new(), config).unwrap()
    }

    fn camera(config: &RendererConfig) -> Camera {
        let mut camera = Camera::perspective(Vec3::zeros(), 60.0, config.viewport(), 0.1, 1000.0);
        camera.set_target(Vec3::new(0.0, 0.0, 1.0));
        camera
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let result = FrameRenderer::new(RecordingDevice::new(), RendererConfig::default().with_frames_in_flight(0));
        assert!(matches!(result, Err(crate::render::RenderError::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_ambient_buffer_holds_hemisphere_colors() {
        let renderer = renderer(RendererConfig::default());
        let bytes = renderer.device().buffer_contents(renderer.ambient_buffer()).unwrap();
        let light: AmbientLight = bytemuck::pod_read_unaligned(&bytes);
        assert_eq!(light, AmbientLight::default());
    }

    #[test]
    fn test_frame_runs_five_tasks_in_order() {
        let config = RendererConfig::default().with_statistics_query(false);
        let mut renderer = renderer(config.clone());
        let mut scene = renderer.load_scene(&SceneDescription::occlusion_grid(1, 2, 10.0)).unwrap();

        let report = renderer.render_frame(&mut scene, &camera(&config)).unwrap();

        assert_eq!(report.task_order, ["clear", "depth", "occlusion", "render", "present"]);
        assert_eq!(report.frame_number, 0);
        assert_eq!(report.depth.drawn, 1);
        assert_eq!(report.occlusion.queries_issued, 2);
        assert_eq!(report.render.drawn, 3);
        assert_eq!(renderer.frames_rendered(), 1);

        let targets = renderer.frames.frame(report.slot).unwrap().targets();
        assert_eq!(renderer.device().texture_state(targets.swap_chain).unwrap(), ResourceState::Present);
        assert_eq!(renderer.device().texture_state(targets.render_target).unwrap(), ResourceState::CopySource);
    }

    #[test]
    fn test_slots_cycle_after_upload() {
        let config = RendererConfig::default().with_frames_in_flight(2).with_statistics_query(false);
        let mut renderer = renderer(config.clone());
        let mut scene = renderer.load_scene(&SceneDescription::occlusion_grid(1, 1, 10.0)).unwrap();
        let camera = camera(&config);

        let slots: Vec<_> = (0..4).map(|_| renderer.render_frame(&mut scene, &camera).unwrap().slot).collect();

        // Slot 0 carried the upload
        assert_eq!(slots, [1, 0, 1, 0]);
        renderer.wait_idle().unwrap();
    }

    #[test]
    fn test_statistics_count_main_pass() {
        let config = RendererConfig::default().with_statistics_query(true);
        let mut renderer = renderer(config.clone());
        let mut scene = renderer.load_scene(&SceneDescription::occlusion_grid(1, 1, 10.0)).unwrap();

        renderer.render_frame(&mut scene, &camera(&config)).unwrap();

        let stats = renderer.pipeline_statistics().unwrap().unwrap();
        // Wall and one box, twelve triangles each
        assert_eq!(stats.ia_primitives, 24);
        assert_eq!(stats.vs_invocations, 72);
    }

    #[test]
    fn test_bounding_boxes_are_optional() {
        let config = RendererConfig::default().with_statistics_query(false).with_bounding_boxes(true);
        let mut renderer = renderer(config.clone());
        let mut scene = renderer.load_scene(&SceneDescription::occlusion_grid(2, 2, 10.0)).unwrap();

        let report = renderer.render_frame(&mut scene, &camera(&config)).unwrap();

        assert_eq!(report.bounds_drawn, 5);
    }
}
