//! Scene traversals
//!
//! Every traversal walks the hierarchy children-first and visits each node
//! exactly once. Group nodes contribute only their transforms.

use super::camera::Camera;
use super::error::{SceneError, SceneResult};
use super::node::NodeId;
use super::graph::Scene;
use super::volumes::FrustumVolume;
use crate::gpu::{CommandList, GpuResources, PrimitiveTopology};
use crate::render::root;
use crate::visibility::{QueryOutcome, OCCLUSION_PREDICATE_OP};

/// Inputs shared by the draw traversals
#[derive(Clone, Copy)]
pub struct DrawContext<'a> {
    /// Used to write model matrices
    pub resources: &'a dyn GpuResources,
    /// Viewer; provides frustum and LOD distance
    pub camera: &'a Camera,
    /// Buffered frame index selecting the model matrix buffer
    pub frame_slot: usize,
}

impl<'a> DrawContext<'a> {
    /// Bundle draw inputs
    pub fn new(resources: &'a dyn GpuResources, camera: &'a Camera, frame_slot: usize) -> Self {
        Self { resources, camera, frame_slot }
    }
}

/// Counters gathered by one traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    /// Nodes visited, groups included
    pub visited: usize,
    /// Indexed draws recorded
    pub drawn: usize,
    /// Geometry nodes rejected by the frustum
    pub frustum_culled: usize,
    /// Nodes filtered out by the traversal (groups, wrong occluder role)
    pub skipped: usize,
    /// Occlusion queries recorded
    pub queries_issued: usize,
    /// Occlusion queries skipped for nodes outside the frustum
    pub queries_culled: usize,
}

/// Which geometry nodes a draw traversal covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawFilter {
    All,
    Occluders,
    Occludees,
}

impl Scene {
    /// Node handles in traversal order: children before their parent, roots
    /// and siblings in insertion order
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        // (node, children already expanded)
        let mut stack: Vec<(NodeId, bool)> = self.roots.iter().rev().map(|&id| (id, false)).collect();
        while let Some((id, expanded)) = stack.pop() {
            let Some(node) = self.nodes.get(id) else { continue };
            if expanded {
                order.push(id);
            } else {
                stack.push((id, true));
                stack.extend(node.children.iter().rev().map(|&child| (child, false)));
            }
        }
        order
    }

    /// Record an occlusion query for every occludee
    pub fn run_occlusion(&mut self, command_list: &mut dyn CommandList, frustum: &FrustumVolume) -> SceneResult<TraversalStats> {
        let mut stats = TraversalStats::default();
        for id in self.post_order() {
            stats.visited += 1;
            let node = &self.nodes[id];
            let Some(geometry) = node.geometry().filter(|g| !g.occluder) else {
                stats.skipped += 1;
                continue;
            };
            match self.occlusion.run(id, &geometry.bounds, command_list, frustum)? {
                QueryOutcome::Issued { .. } => stats.queries_issued += 1,
                QueryOutcome::Culled { .. } => stats.queries_culled += 1,
            }
        }
        log::trace!("Occlusion pass: {stats:?}");
        Ok(stats)
    }

    /// Draw every geometry node, occludees under predication
    pub fn draw(&self, ctx: &DrawContext<'_>, command_list: &mut dyn CommandList) -> SceneResult<TraversalStats> {
        self.draw_filtered(ctx, command_list, DrawFilter::All)
    }

    /// Draw occluders only
    pub fn draw_occluders(&self, ctx: &DrawContext<'_>, command_list: &mut dyn CommandList) -> SceneResult<TraversalStats> {
        self.draw_filtered(ctx, command_list, DrawFilter::Occluders)
    }

    /// Draw occludees only
    pub fn draw_occludees(&self, ctx: &DrawContext<'_>, command_list: &mut dyn CommandList) -> SceneResult<TraversalStats> {
        self.draw_filtered(ctx, command_list, DrawFilter::Occludees)
    }

    fn draw_filtered(
        &self,
        ctx: &DrawContext<'_>,
        command_list: &mut dyn CommandList,
        filter: DrawFilter,
    ) -> SceneResult<TraversalStats> {
        let mut stats = TraversalStats::default();
        for id in self.post_order() {
            stats.visited += 1;
            let node = &self.nodes[id];
            let selected = match filter {
                DrawFilter::All => node.geometry().is_some(),
                DrawFilter::Occluders => node.is_occluder(),
                DrawFilter::Occludees => node.is_occludee(),
            };
            if !selected {
                stats.skipped += 1;
                continue;
            }
            if self.draw_node(ctx, command_list, id)? {
                stats.drawn += 1;
            } else {
                stats.frustum_culled += 1;
            }
        }
        Ok(stats)
    }

    /// Record the draw of one node; `false` when the node was culled or has no geometry
    fn draw_node(&self, ctx: &DrawContext<'_>, command_list: &mut dyn CommandList, id: NodeId) -> SceneResult<bool> {
        let node = self.node(id)?;
        let Some(geometry) = node.geometry() else {
            return Ok(false);
        };
        if !ctx.camera.frustum().intersects(&geometry.bounds) {
            log::trace!("Node '{}' outside frustum", node.name);
            return Ok(false);
        }

        match geometry.texture {
            Some(texture) => {
                command_list.set_constants(root::HAS_TEXTURE, &[1], 0)?;
                command_list.set_descriptor_table(root::DIFFUSE_TEXTURE, texture)?;
            }
            None => command_list.set_constants(root::HAS_TEXTURE, &[0], 0)?,
        }

        if self.occlusion.is_created() {
            self.occlusion.set_predication(id, command_list)?;
        } else {
            command_list.set_predication(None, 0, OCCLUSION_PREDICATE_OP)?;
        }

        let eye = ctx.camera.position();
        let lod_index = self
            .lod_selector
            .select_for(&eye, &geometry.bounds, geometry.lods.len())
            .ok_or_else(|| SceneError::EmptyMesh { node: node.name.clone(), lod: 0 })?;
        let lod = &geometry.lods[lod_index];
        log::trace!("Node '{}' drawn at LOD {lod_index}", node.name);

        let transform = self.global_transform(id)?;
        let buffer = geometry
            .transform_buffer(ctx.frame_slot)
            .ok_or_else(|| SceneError::InvalidMesh {
                node: node.name.clone(),
                lod: lod_index,
                reason: "no model matrix buffer".to_string(),
            })?;
        ctx.resources.write_buffer(buffer, 0, bytemuck::cast_slice(transform.as_slice()))?;
        command_list.set_shader_resource(root::MODEL_MATRIX, buffer)?;

        command_list.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        command_list.set_vertex_buffer(0, lod.vertex_buffer)?;
        command_list.set_index_buffer(lod.index_buffer)?;
        command_list.draw_indexed(lod.index_count)?;
        Ok(true)
    }

    /// Draw one point per geometry node carrying its bounds, predication cleared
    ///
    /// Expects the bounding-box pipeline, which expands each point into a
    /// wireframe box.
    pub fn draw_bounds(&self, command_list: &mut dyn CommandList) -> SceneResult<usize> {
        let mut drawn = 0;
        for id in self.post_order() {
            let Some(geometry) = self.nodes[id].geometry() else { continue };
            command_list.set_predication(None, 0, OCCLUSION_PREDICATE_OP)?;
            command_list.set_primitive_topology(PrimitiveTopology::PointList)?;
            command_list.set_constants_f32(root::BOUNDS_EXTENTS, geometry.bounds.min().as_slice(), 0)?;
            command_list.set_constants_f32(root::BOUNDS_EXTENTS, geometry.bounds.max().as_slice(), root::BOUNDS_MAX_OFFSET)?;
            command_list.draw(1)?;
            drawn += 1;
        }
        Ok(drawn)
    }

    /// Draw a node's bounds as a solid box through the shared proxy mesh
    pub fn test_bounds(&self, ctx: &DrawContext<'_>, command_list: &mut dyn CommandList, id: NodeId) -> SceneResult<()> {
        let node = self.node(id)?;
        let Some(geometry) = node.geometry() else {
            log::warn!("Node '{}' has no bounds to test", node.name);
            return Ok(());
        };
        let proxy = self.bounds_mesh.ok_or_else(|| SceneError::InvalidBounds {
            node: node.name.clone(),
            reason: "bounds proxy mesh was never uploaded".to_string(),
        })?;
        let buffer = geometry.transform_buffer(ctx.frame_slot).ok_or_else(|| SceneError::InvalidBounds {
            node: node.name.clone(),
            reason: "no model matrix buffer".to_string(),
        })?;

        let transform = geometry.bounds.unit_cube_transform();
        ctx.resources.write_buffer(buffer, 0, bytemuck::cast_slice(transform.as_slice()))?;
        command_list.set_shader_resource(root::MODEL_MATRIX, buffer)?;

        command_list.set_primitive_topology(PrimitiveTopology::TriangleList)?;
        command_list.set_vertex_buffer(0, proxy.vertex_buffer)?;
        command_list.set_index_buffer(proxy.index_buffer)?;
        command_list.draw_indexed(proxy.index_count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4, Vec3};
    use crate::gpu::recording::{Command, RecordingCommandList, RecordingDevice};
    use crate::gpu::{GpuDevice, QueueType, Viewport};
    use crate::scene::mesh::MeshData;
    use crate::scene::graph::GeometryDesc;
    use approx::assert_relative_eq;

    struct Fixture {
        device: RecordingDevice,
        scene: Scene,
        camera: Camera,
    }

    fn cube_at(name: &str, x: f32, z: f32, lods: usize) -> GeometryDesc {
        let mesh = MeshData::cuboid([-1.0; 3], [1.0; 3], [0.5, 0.5, 0.5]);
        GeometryDesc::new(name, vec![mesh; lods]).with_transform(Mat4::new_translation(&Vec3::new(x, 0.0, z)))
    }

    /// Camera at the origin looking down +Z
    fn fixture(descs: Vec<GeometryDesc>) -> Fixture {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 2);
        let group = scene.add_group(None, "group", Mat4::identity()).unwrap();
        for desc in descs {
            scene.add_geometry(&device, &mut upload, Some(group), desc).unwrap();
        }
        upload.close().unwrap();
        device.execute_command_lists(QueueType::Direct, &[&upload]).unwrap();
        scene.finish_upload(&device).unwrap();
        scene.create_occlusion(&device, None).unwrap();

        let mut camera = Camera::perspective(Vec3::zeros(), 60.0, Viewport::new(800.0, 600.0), 0.1, 2000.0);
        camera.set_target(Vec3::new(0.0, 0.0, 1.0));
        Fixture { device, scene, camera }
    }

    fn list(device: &RecordingDevice) -> RecordingCommandList {
        device.create_command_list(QueueType::Direct, None).unwrap()
    }

    fn draws(list: &RecordingCommandList) -> Vec<u32> {
        list.commands()
            .iter()
            .filter_map(|c| match c {
                Command::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_post_order_visits_children_first() {
        let fx = fixture(vec![cube_at("a", 0.0, 10.0, 1), cube_at("b", 0.0, 20.0, 1)]);
        let names: Vec<_> = fx.scene.post_order().into_iter().map(|id| fx.scene.node(id).unwrap().name().to_string()).collect();
        assert_eq!(names, ["a", "b", "group"]);
    }

    #[test]
    fn test_run_occlusion_skips_occluders_and_groups() {
        let mut fx = fixture(vec![cube_at("wall", 0.0, 10.0, 1).with_occluder(true), cube_at("a", 0.0, 20.0, 1)]);
        let mut cmd = list(&fx.device);

        let stats = fx.scene.run_occlusion(&mut cmd, fx.camera.frustum()).unwrap();

        assert_eq!(stats.visited, 3);
        assert_eq!(stats.queries_issued, 1);
        assert_eq!(stats.skipped, 2);
        let begins = cmd.commands().iter().filter(|c| matches!(c, Command::BeginQuery { .. })).count();
        assert_eq!(begins, 1);
    }

    #[test]
    fn test_draw_filters_by_role_and_frustum() {
        let fx = fixture(vec![
            cube_at("wall", 0.0, 10.0, 1).with_occluder(true),
            cube_at("front", 0.0, 20.0, 1),
            cube_at("behind", 0.0, -20.0, 1),
        ]);
        let ctx = DrawContext::new(&fx.device, &fx.camera, 0);

        let mut cmd = list(&fx.device);
        let all = fx.scene.draw(&ctx, &mut cmd).unwrap();
        assert_eq!((all.visited, all.drawn, all.frustum_culled, all.skipped), (4, 2, 1, 1));

        let mut cmd = list(&fx.device);
        let occluders = fx.scene.draw_occluders(&ctx, &mut cmd).unwrap();
        assert_eq!(occluders.drawn, 1);
        assert_eq!(draws(&cmd), [36]);

        let mut cmd = list(&fx.device);
        let occludees = fx.scene.draw_occludees(&ctx, &mut cmd).unwrap();
        assert_eq!((occludees.drawn, occludees.frustum_culled), (1, 1));
    }

    #[test]
    fn test_draw_writes_global_transform_for_frame_slot() {
        let fx = fixture(vec![cube_at("a", 3.0, 20.0, 1)]);
        let id = fx.scene.find("a").unwrap();
        let mut cmd = list(&fx.device);

        fx.scene.draw(&DrawContext::new(&fx.device, &fx.camera, 1), &mut cmd).unwrap();

        let buffer = fx.scene.node(id).unwrap().geometry().unwrap().transform_buffer(1).unwrap();
        let bytes = fx.device.buffer_contents(buffer).unwrap();
        let values: Vec<f32> = bytes.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
        // Column-major translation column
        assert_relative_eq!(values[12], 3.0);
        assert_relative_eq!(values[14], 20.0);
        assert!(cmd.commands().contains(&Command::SetShaderResource { root_index: root::MODEL_MATRIX, buffer }));
    }

    #[test]
    fn test_draw_binds_predicate_of_queried_node() {
        let mut fx = fixture(vec![cube_at("a", 0.0, 20.0, 1)]);
        let id = fx.scene.find("a").unwrap();
        let mut cmd = list(&fx.device);
        fx.scene.run_occlusion(&mut cmd, fx.camera.frustum()).unwrap();

        let mut cmd = list(&fx.device);
        fx.scene.draw(&DrawContext::new(&fx.device, &fx.camera, 0), &mut cmd).unwrap();

        let result = fx.scene.occlusion().result_buffer(id);
        assert!(result.is_some());
        assert!(cmd.commands().contains(&Command::SetPredication { buffer: result, offset: 0, op: OCCLUSION_PREDICATE_OP }));
    }

    #[test]
    fn test_lod_follows_distance() {
        let fx = fixture(vec![cube_at("near", 0.0, 50.0, 3), cube_at("far", 0.0, 450.0, 3)]);
        let mut cmd = list(&fx.device);
        fx.scene.draw(&DrawContext::new(&fx.device, &fx.camera, 0), &mut cmd).unwrap();

        let lod_buffers: Vec<_> = ["near", "far"]
            .iter()
            .map(|name| fx.scene.node(fx.scene.find(name).unwrap()).unwrap().geometry().unwrap().lods.clone())
            .collect();
        let bound: Vec<_> = cmd
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetVertexBuffer { view, .. } => Some(view.buffer),
                _ => None,
            })
            .collect();

        assert_eq!(bound, [lod_buffers[0][0].vertex_buffer.buffer, lod_buffers[1][2].vertex_buffer.buffer]);
    }

    #[test]
    fn test_texture_flag_follows_node_texture() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);
        let texture = scene.texture_or_placeholder(&device, "bricks").unwrap();
        scene.add_geometry(&device, &mut upload, None, cube_at("textured", 0.0, 20.0, 1).with_texture(texture)).unwrap();
        scene.add_geometry(&device, &mut upload, None, cube_at("plain", 0.0, 30.0, 1)).unwrap();
        let mut camera = Camera::perspective(Vec3::zeros(), 60.0, Viewport::new(800.0, 600.0), 0.1, 2000.0);
        camera.set_target(Vec3::new(0.0, 0.0, 1.0));

        let mut cmd = list(&device);
        scene.draw(&DrawContext::new(&device, &camera, 0), &mut cmd).unwrap();

        let flags: Vec<_> = cmd
            .commands()
            .iter()
            .filter_map(|c| match c {
                Command::SetConstants { root_index: root::HAS_TEXTURE, values, .. } => Some(values.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(flags, [vec![1u32], vec![0u32]]);
        assert!(cmd.commands().contains(&Command::SetDescriptorTable { root_index: root::DIFFUSE_TEXTURE, texture }));
        // Without an occlusion engine the predicate is cleared
        assert!(cmd.commands().contains(&Command::SetPredication { buffer: None, offset: 0, op: OCCLUSION_PREDICATE_OP }));
    }

    #[test]
    fn test_draw_bounds_emits_one_point_per_geometry_node() {
        let fx = fixture(vec![cube_at("a", 0.0, 20.0, 1), cube_at("b", 0.0, -20.0, 1)]);
        let mut cmd = list(&fx.device);

        assert_eq!(fx.scene.draw_bounds(&mut cmd).unwrap(), 2);
        let points = cmd.commands().iter().filter(|c| matches!(c, Command::Draw { vertex_count: 1 })).count();
        assert_eq!(points, 2);
    }

    #[test]
    fn test_bounds_proxy_draws_36_indices() {
        let fx = fixture(vec![cube_at("a", 0.0, 20.0, 1)]);
        let id = fx.scene.find("a").unwrap();
        let mut cmd = list(&fx.device);

        fx.scene.test_bounds(&DrawContext::new(&fx.device, &fx.camera, 0), &mut cmd, id).unwrap();

        assert_eq!(draws(&cmd), [36]);
    }
}
