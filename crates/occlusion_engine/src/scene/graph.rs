//! # Scene
//!
//! Arena of [`SceneNode`]s plus the per-scene GPU state: uploaded LOD
//! buffers, model matrix buffers, textures and the occlusion query engine.
//!
//! Nodes are created through [`Scene::add_group`] and [`Scene::add_geometry`].
//! Geometry uploads are recorded into a caller-supplied command list through
//! staging buffers; once that list has finished executing,
//! [`Scene::finish_upload`] releases the staging memory.

use std::collections::HashMap;

use slotmap::SlotMap;

use super::error::{SceneError, SceneResult};
use super::mesh::{MeshData, Vertex};
use super::node::{GeometryNode, LodMesh, NodeId, NodeKind, SceneNode};
use super::volumes::AabbVolume;
use crate::foundation::math::Mat4;
use crate::gpu::{
    BufferDesc, BufferHandle, BufferUsage, CommandList, GpuResources, IndexBufferView, IndexFormat,
    ResourceState, TextureDesc, TextureHandle, VertexBufferView,
};
use crate::visibility::{LodSelector, OcclusionError, OcclusionQuery};

/// Size in bytes of a model matrix
const MODEL_MATRIX_SIZE: u64 = std::mem::size_of::<[f32; 16]>() as u64;

/// Parameters for a drawable node
#[derive(Debug, Clone)]
pub struct GeometryDesc {
    /// Node name, also used to name its GPU resources
    pub name: String,
    /// Transform relative to the parent
    pub local_transform: Mat4,
    /// World-space bounds; computed from LOD 0 when `None`
    pub bounds: Option<AabbVolume>,
    /// Draw in the depth pre-pass instead of being queried
    pub occluder: bool,
    /// Meshes, most detailed first
    pub lods: Vec<MeshData>,
    /// Diffuse texture
    pub texture: Option<TextureHandle>,
}

impl GeometryDesc {
    /// Describe an occludee with the given LODs at identity transform
    pub fn new(name: impl Into<String>, lods: Vec<MeshData>) -> Self {
        Self {
            name: name.into(),
            local_transform: Mat4::identity(),
            bounds: None,
            occluder: false,
            lods,
            texture: None,
        }
    }

    /// Set the local transform
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.local_transform = transform;
        self
    }

    /// Set explicit world-space bounds
    pub fn with_bounds(mut self, bounds: AabbVolume) -> Self {
        self.bounds = Some(bounds);
        self
    }

    /// Mark as occluder
    pub fn with_occluder(mut self, occluder: bool) -> Self {
        self.occluder = occluder;
        self
    }

    /// Attach a diffuse texture
    pub fn with_texture(mut self, texture: TextureHandle) -> Self {
        self.texture = Some(texture);
        self
    }
}

/// Scene hierarchy and its GPU resources
pub struct Scene {
    name: String,
    pub(crate) nodes: SlotMap<NodeId, SceneNode>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) occlusion: OcclusionQuery,
    pub(crate) lod_selector: LodSelector,
    pub(crate) bounds_mesh: Option<LodMesh>,
    frame_slots: usize,
    textures: HashMap<String, TextureHandle>,
    staging: Vec<BufferHandle>,
}

impl Scene {
    /// Create an empty scene whose model matrices are buffered `frame_slots` times
    pub fn new(name: impl Into<String>, frame_slots: usize) -> Self {
        Self {
            name: name.into(),
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
            occlusion: OcclusionQuery::new(),
            lod_selector: LodSelector::default(),
            bounds_mesh: None,
            frame_slots: frame_slots.max(1),
            textures: HashMap::new(),
            staging: Vec::new(),
        }
    }

    /// Replace the LOD selector
    pub fn with_lod_selector(mut self, selector: LodSelector) -> Self {
        self.lod_selector = selector;
        self
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the scene has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Top-level nodes in insertion order
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Look up a node
    pub fn node(&self, id: NodeId) -> SceneResult<&SceneNode> {
        self.nodes.get(id).ok_or(SceneError::UnknownNode(id))
    }

    /// Find the first node with a name
    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes.iter().find(|(_, node)| node.name == name).map(|(id, _)| id)
    }

    /// Iterate over every node in arena order
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// Occlusion query engine
    pub fn occlusion(&self) -> &OcclusionQuery {
        &self.occlusion
    }

    /// LOD selector used by the draw passes
    pub fn lod_selector(&self) -> &LodSelector {
        &self.lod_selector
    }

    /// Number of nodes that take part in occlusion queries
    pub fn occludee_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_occludee()).count()
    }

    /// Number of occluder nodes
    pub fn occluder_count(&self) -> usize {
        self.nodes.values().filter(|node| node.is_occluder()).count()
    }

    /// Local transform composed with every ancestor, root first
    pub fn global_transform(&self, id: NodeId) -> SceneResult<Mat4> {
        let mut node = self.node(id)?;
        let mut transform = node.local_transform;
        while let Some(parent) = node.parent {
            node = self.node(parent)?;
            transform = node.local_transform * transform;
        }
        Ok(transform)
    }

    /// Create the occlusion query engine
    ///
    /// Capacity defaults to the number of occludees (at least one slot). An
    /// explicit capacity below the occludee count is rejected.
    pub fn create_occlusion(&mut self, resources: &dyn GpuResources, capacity: Option<usize>) -> SceneResult<()> {
        let occludees = self.occludee_count();
        let capacity = capacity.unwrap_or(occludees).max(1);
        if capacity < occludees {
            log::error!("Occlusion capacity {capacity} is below the {occludees} occludees of scene '{}'", self.name);
            return Err(OcclusionError::CapacityExceeded { capacity }.into());
        }
        self.occlusion.create(resources, capacity)?;
        Ok(())
    }

    /// Register a texture under a name
    pub fn register_texture(&mut self, name: impl Into<String>, texture: TextureHandle) {
        self.textures.insert(name.into(), texture);
    }

    /// Texture registered under a name
    pub fn texture(&self, name: &str) -> Option<TextureHandle> {
        self.textures.get(name).copied()
    }

    /// Texture registered under a name, or a new 1x1 texture registered in its place
    pub fn texture_or_placeholder(&mut self, resources: &dyn GpuResources, name: &str) -> SceneResult<TextureHandle> {
        if let Some(texture) = self.texture(name) {
            return Ok(texture);
        }
        let texture = resources.create_texture(&TextureDesc::sampled(name, 1, 1))?;
        log::debug!("Created placeholder texture '{name}'");
        self.register_texture(name, texture);
        Ok(texture)
    }

    fn attach(&mut self, parent: Option<NodeId>, node: SceneNode) -> SceneResult<NodeId> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = self.nodes.insert(node);
        match parent {
            Some(parent) => self.nodes[parent].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Add a grouping node
    pub fn add_group(&mut self, parent: Option<NodeId>, name: impl Into<String>, local_transform: Mat4) -> SceneResult<NodeId> {
        self.attach(parent, SceneNode {
            name: name.into(),
            parent,
            children: Vec::new(),
            local_transform,
            kind: NodeKind::Group,
        })
    }

    /// Add a drawable node, recording its buffer uploads into `upload`
    ///
    /// A description without LODs becomes a group node.
    pub fn add_geometry(
        &mut self,
        resources: &dyn GpuResources,
        upload: &mut dyn CommandList,
        parent: Option<NodeId>,
        desc: GeometryDesc,
    ) -> SceneResult<NodeId> {
        if desc.lods.is_empty() {
            log::debug!("Node '{}' has no LODs, adding it as a group", desc.name);
            return self.add_group(parent, desc.name, desc.local_transform);
        }
        for (lod, mesh) in desc.lods.iter().enumerate() {
            if mesh.is_empty() {
                return Err(SceneError::EmptyMesh { node: desc.name.clone(), lod });
            }
            mesh.validate()
                .map_err(|reason| SceneError::InvalidMesh { node: desc.name.clone(), lod, reason })?;
        }

        let parent_transform = match parent {
            Some(parent) => self.global_transform(parent)?,
            None => Mat4::identity(),
        };
        let bounds = match desc.bounds {
            Some(bounds) => bounds,
            None => Self::mesh_bounds(&desc.name, &desc.lods[0], &(parent_transform * desc.local_transform))?,
        };

        if self.bounds_mesh.is_none() {
            self.bounds_mesh = Some(self.upload_mesh(resources, upload, "Bounds", &AabbVolume::unit_cube_mesh())?);
        }

        let lods = desc
            .lods
            .iter()
            .map(|mesh| self.upload_mesh(resources, upload, &desc.name, mesh))
            .collect::<SceneResult<Vec<_>>>()?;

        let transform_buffers = (0..self.frame_slots)
            .map(|slot| {
                resources.create_buffer(&BufferDesc::new(
                    format!("{}_ModelMatrix_{slot}", desc.name),
                    MODEL_MATRIX_SIZE,
                    BufferUsage::SHADER_RESOURCE | BufferUsage::UPLOAD,
                    ResourceState::GenericRead,
                ))
            })
            .collect::<Result<Vec<_>, _>>()?;

        log::debug!(
            "Added {} '{}' with {} LODs",
            if desc.occluder { "occluder" } else { "occludee" },
            desc.name,
            lods.len()
        );

        self.attach(parent, SceneNode {
            name: desc.name,
            parent,
            children: Vec::new(),
            local_transform: desc.local_transform,
            kind: NodeKind::Geometry(Box::new(GeometryNode {
                bounds,
                occluder: desc.occluder,
                lods,
                texture: desc.texture,
                transform_buffers,
            })),
        })
    }

    fn mesh_bounds(name: &str, mesh: &MeshData, transform: &Mat4) -> SceneResult<AabbVolume> {
        let invalid = |reason: &str| SceneError::InvalidBounds { node: name.to_string(), reason: reason.to_string() };
        let (min, max) = mesh.bounds().ok_or_else(|| invalid("mesh has no vertices"))?;
        let local = AabbVolume::new(min, max).ok_or_else(|| invalid("mesh positions are not finite"))?;
        Ok(local.transformed(transform))
    }

    fn upload_mesh(
        &mut self,
        resources: &dyn GpuResources,
        upload: &mut dyn CommandList,
        name: &str,
        mesh: &MeshData,
    ) -> SceneResult<LodMesh> {
        let vertex_buffer = self.upload_buffer(
            resources,
            upload,
            &format!("{name}_VB"),
            BufferUsage::VERTEX,
            mesh.vertex_bytes(),
            ResourceState::VertexAndConstantBuffer,
        )?;
        let index_buffer = self.upload_buffer(
            resources,
            upload,
            &format!("{name}_IB"),
            BufferUsage::INDEX,
            mesh.index_bytes(),
            ResourceState::IndexBuffer,
        )?;

        Ok(LodMesh {
            vertex_buffer: VertexBufferView {
                buffer: vertex_buffer,
                size_in_bytes: mesh.vertex_bytes().len() as u32,
                stride_in_bytes: std::mem::size_of::<Vertex>() as u32,
            },
            index_buffer: IndexBufferView {
                buffer: index_buffer,
                size_in_bytes: mesh.index_bytes().len() as u32,
                format: IndexFormat::U32,
            },
            index_count: mesh.indices.len() as u32,
        })
    }

    fn upload_buffer(
        &mut self,
        resources: &dyn GpuResources,
        upload: &mut dyn CommandList,
        name: &str,
        usage: BufferUsage,
        data: &[u8],
        final_state: ResourceState,
    ) -> SceneResult<BufferHandle> {
        let size = data.len() as u64;
        let destination = resources.create_buffer(&BufferDesc::new(name, size, usage, ResourceState::CopyDest))?;
        let staging = resources.create_buffer(&BufferDesc::upload(format!("{name} staging"), size))?;
        self.staging.push(staging);

        resources.write_buffer(staging, 0, data)?;
        upload.copy_resource(staging.into(), destination.into())?;
        upload.transition_barrier(destination.into(), final_state)?;
        Ok(destination)
    }

    /// Number of staging buffers waiting for [`Scene::finish_upload`]
    pub fn pending_uploads(&self) -> usize {
        self.staging.len()
    }

    /// Release staging buffers once the upload command list has executed
    pub fn finish_upload(&mut self, resources: &dyn GpuResources) -> SceneResult<()> {
        let count = self.staging.len();
        for buffer in self.staging.drain(..) {
            resources.destroy_buffer(buffer)?;
        }
        if count > 0 {
            log::debug!("Released {count} staging buffers for scene '{}'", self.name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Point3, Vec3};
    use crate::gpu::recording::RecordingDevice;
    use crate::gpu::{GpuDevice, QueueType};
    use approx::assert_relative_eq;

    fn cube(size: f32) -> MeshData {
        MeshData::cuboid([-size; 3], [size; 3], [1.0, 1.0, 1.0])
    }

    #[test]
    fn test_global_transform_composes_ancestors() {
        let mut scene = Scene::new("test", 1);
        let root = scene.add_group(None, "root", Mat4::new_translation(&Vec3::new(10.0, 0.0, 0.0))).unwrap();
        let middle = scene.add_group(Some(root), "middle", Mat4::new_scaling(2.0)).unwrap();
        let leaf = scene.add_group(Some(middle), "leaf", Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0))).unwrap();

        let origin = scene.global_transform(leaf).unwrap().transform_point(&Point3::origin());
        assert_relative_eq!(origin.x, 12.0);
        assert_eq!(scene.node(leaf).unwrap().parent(), Some(middle));
        assert_eq!(scene.node(root).unwrap().children(), &[middle]);
        assert_eq!(scene.roots(), &[root]);
    }

    #[test]
    fn test_unknown_parent_is_rejected() {
        let mut scene = Scene::new("test", 1);
        let stale = scene.add_group(None, "stale", Mat4::identity()).unwrap();
        scene.nodes.remove(stale);

        assert!(matches!(scene.add_group(Some(stale), "child", Mat4::identity()), Err(SceneError::UnknownNode(_))));
    }

    #[test]
    fn test_geometry_upload_goes_through_staging() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 2);

        let id = scene
            .add_geometry(&device, &mut upload, None, GeometryDesc::new("box", vec![cube(1.0), cube(0.5)]))
            .unwrap();
        upload.close().unwrap();
        device.execute_command_lists(QueueType::Direct, &[&upload]).unwrap();

        let geometry = scene.node(id).unwrap().geometry().unwrap();
        assert_eq!(geometry.lods.len(), 2);
        assert_eq!(geometry.transform_buffers.len(), 2);
        assert_eq!(
            device.buffer_state(geometry.lods[1].vertex_buffer.buffer).unwrap(),
            ResourceState::VertexAndConstantBuffer
        );
        assert_eq!(device.buffer_state(geometry.lods[1].index_buffer.buffer).unwrap(), ResourceState::IndexBuffer);

        let expected = bytemuck::cast_slice::<u32, u8>(&cube(0.5).indices).to_vec();
        assert_eq!(device.buffer_contents(geometry.lods[1].index_buffer.buffer).unwrap(), expected);

        // Bounds proxy plus two LODs, vertex and index each
        assert_eq!(scene.pending_uploads(), 6);
        scene.finish_upload(&device).unwrap();
        assert_eq!(scene.pending_uploads(), 0);
    }

    #[test]
    fn test_missing_bounds_come_from_transformed_lod_zero() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);
        let parent = scene.add_group(None, "parent", Mat4::new_translation(&Vec3::new(0.0, 5.0, 0.0))).unwrap();

        let desc = GeometryDesc::new("box", vec![cube(1.0)]).with_transform(Mat4::new_scaling(3.0));
        let id = scene.add_geometry(&device, &mut upload, Some(parent), desc).unwrap();

        let bounds = scene.node(id).unwrap().geometry().unwrap().bounds;
        assert_relative_eq!(bounds.min(), Vec3::new(-3.0, 2.0, -3.0));
        assert_relative_eq!(bounds.max(), Vec3::new(3.0, 8.0, 3.0));
    }

    #[test]
    fn test_node_without_lods_becomes_group() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);

        let id = scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("empty", Vec::new())).unwrap();

        assert!(matches!(scene.node(id).unwrap().kind(), NodeKind::Group));
        assert_eq!(scene.occludee_count(), 0);
        assert!(upload.commands().is_empty());
    }

    #[test]
    fn test_empty_lod_is_rejected() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);

        let result = scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("bad", vec![cube(1.0), MeshData::default()]));
        assert!(matches!(result, Err(SceneError::EmptyMesh { lod: 1, .. })));
    }

    #[test]
    fn test_occlusion_capacity_defaults_to_occludees() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);
        scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("wall", vec![cube(1.0)]).with_occluder(true)).unwrap();
        scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("a", vec![cube(1.0)])).unwrap();
        scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("b", vec![cube(1.0)])).unwrap();

        scene.create_occlusion(&device, None).unwrap();

        assert_eq!(scene.occluder_count(), 1);
        assert_eq!(scene.occlusion().capacity(), 2);
        assert!(matches!(
            scene.create_occlusion(&device, None),
            Err(SceneError::Occlusion(OcclusionError::AlreadyCreated(2)))
        ));
    }

    #[test]
    fn test_occlusion_capacity_below_occludees_is_rejected() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut scene = Scene::new("test", 1);
        scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("a", vec![cube(1.0)])).unwrap();
        scene.add_geometry(&device, &mut upload, None, GeometryDesc::new("b", vec![cube(1.0)])).unwrap();

        assert!(matches!(
            scene.create_occlusion(&device, Some(1)),
            Err(SceneError::Occlusion(OcclusionError::CapacityExceeded { capacity: 1 }))
        ));
        assert!(!scene.occlusion().is_created());
        scene.create_occlusion(&device, Some(4)).unwrap();
        assert_eq!(scene.occlusion().capacity(), 4);
    }

    #[test]
    fn test_placeholder_textures_are_shared_by_name() {
        let device = RecordingDevice::new();
        let mut scene = Scene::new("test", 1);

        let first = scene.texture_or_placeholder(&device, "bricks.png").unwrap();
        let second = scene.texture_or_placeholder(&device, "bricks.png").unwrap();

        assert_eq!(first, second);
        assert_eq!(device.texture_state(first).unwrap(), ResourceState::ShaderResource);
    }
}
