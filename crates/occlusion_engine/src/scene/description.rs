//! Serializable scene descriptions
//!
//! A [`SceneDescription`] is the on-disk form of a scene: a tree of named
//! nodes with row-major local transforms, optional world-space bounds, the
//! occluder flag, inline LOD meshes and an optional texture name. It loads
//! from `.ron` or `.toml` through the [`Config`] trait and is turned into a
//! GPU-backed [`Scene`] by [`Scene::from_description`].

use serde::{Deserialize, Serialize};

use super::error::SceneResult;
use super::mesh::MeshData;
use super::node::NodeId;
use super::graph::{GeometryDesc, Scene};
use super::volumes::AabbVolume;
use crate::config::Config;
use crate::foundation::math::utils::mat4_from_rows;
use crate::foundation::math::Vec3;
use crate::gpu::{CommandList, GpuResources};

const IDENTITY_ROWS: [[f32; 4]; 4] = [
    [1.0, 0.0, 0.0, 0.0],
    [0.0, 1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0, 0.0],
    [0.0, 0.0, 0.0, 1.0],
];

fn identity_rows() -> [[f32; 4]; 4] {
    IDENTITY_ROWS
}

/// Scene file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    /// Scene name
    #[serde(default)]
    pub name: String,
    /// Root nodes
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
}

impl Config for SceneDescription {}

/// One node of a [`SceneDescription`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDescription {
    /// Node name
    pub name: String,
    /// Local transform, row-major with translation in the last column
    #[serde(default = "identity_rows")]
    pub transform: [[f32; 4]; 4],
    /// World-space bounds; derived from LOD 0 when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounds: Option<AabbVolume>,
    /// Occluder flag
    #[serde(default)]
    pub occluder: bool,
    /// LOD meshes, most detailed first; empty for group nodes
    #[serde(default)]
    pub lods: Vec<MeshData>,
    /// Diffuse texture name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub texture: Option<String>,
    /// Child nodes
    #[serde(default)]
    pub children: Vec<NodeDescription>,
}

impl NodeDescription {
    /// Group node with identity transform
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: IDENTITY_ROWS,
            bounds: None,
            occluder: false,
            lods: Vec::new(),
            texture: None,
            children: Vec::new(),
        }
    }

    /// Total number of nodes in this subtree
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(Self::subtree_len).sum::<usize>()
    }
}

impl SceneDescription {
    /// Total number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.iter().map(NodeDescription::subtree_len).sum()
    }

    /// Test layout: one wide occluder wall in front of a grid of smaller
    /// occludee boxes with two LODs each
    ///
    /// The wall stands at `z = spacing`; occludees fill `rows x columns`
    /// cells behind it, centered on the X axis.
    pub fn occlusion_grid(rows: usize, columns: usize, spacing: f32) -> Self {
        let width = columns as f32 * spacing;
        let mut walls = NodeDescription::group("Occluders");
        walls.children.push(NodeDescription {
            occluder: true,
            lods: vec![MeshData::cuboid([-width * 0.5, -spacing, spacing], [width * 0.5, spacing, spacing + 1.0], [0.6, 0.6, 0.6])],
            ..NodeDescription::group("Wall")
        });

        let mut boxes = NodeDescription::group("Occludees");
        let half = spacing * 0.25;
        for row in 0..rows {
            for column in 0..columns {
                let x = (column as f32 - (columns as f32 - 1.0) * 0.5) * spacing;
                let z = (row as f32 + 2.0) * spacing;
                let mut transform = IDENTITY_ROWS;
                transform[0][3] = x;
                transform[2][3] = z;
                let detailed = MeshData::cuboid([-half; 3], [half; 3], [0.9, 0.4, 0.2]);
                let coarse = MeshData::cuboid([-half; 3], [half; 3], [0.4, 0.2, 0.1]);
                boxes.children.push(NodeDescription {
                    transform,
                    lods: vec![detailed, coarse],
                    ..NodeDescription::group(format!("Box_{row}_{column}"))
                });
            }
        }

        Self { name: "OcclusionGrid".to_string(), nodes: vec![walls, boxes] }
    }
}

impl Scene {
    /// Materialize a description: create every node, record the uploads
    /// into `upload` and create the occlusion engine
    ///
    /// `occlusion_capacity` defaults to the number of occludees and may not
    /// be smaller.
    pub fn from_description(
        desc: &SceneDescription,
        resources: &dyn GpuResources,
        upload: &mut dyn CommandList,
        frame_slots: usize,
        occlusion_capacity: Option<usize>,
    ) -> SceneResult<Self> {
        let mut scene = Self::new(desc.name.clone(), frame_slots);
        for node in &desc.nodes {
            scene.add_described(resources, upload, None, node)?;
        }
        scene.create_occlusion(resources, occlusion_capacity)?;
        log::info!(
            "Loaded scene '{}': {} nodes, {} occluders, {} occludees",
            scene.name(),
            scene.len(),
            scene.occluder_count(),
            scene.occludee_count()
        );
        Ok(scene)
    }

    fn add_described(
        &mut self,
        resources: &dyn GpuResources,
        upload: &mut dyn CommandList,
        parent: Option<NodeId>,
        node: &NodeDescription,
    ) -> SceneResult<NodeId> {
        let local_transform = mat4_from_rows(&node.transform);
        if node.lods.is_empty() && node.occluder {
            log::warn!("Node '{}' is marked as occluder but has no LODs", node.name);
        }
        let texture = match &node.texture {
            Some(name) => Some(self.texture_or_placeholder(resources, name)?),
            None => None,
        };
        let id = self.add_geometry(resources, upload, parent, GeometryDesc {
            name: node.name.clone(),
            local_transform,
            bounds: node.bounds,
            occluder: node.occluder,
            lods: node.lods.clone(),
            texture,
        })?;
        for child in &node.children {
            self.add_described(resources, upload, Some(id), child)?;
        }
        Ok(id)
    }

    /// World-space bounds of every geometry node merged together
    pub fn bounds(&self) -> Option<AabbVolume> {
        self.nodes
            .values()
            .filter_map(|node| node.geometry().map(|g| g.bounds))
            .reduce(|a, b| a.merged(&b))
    }

    /// Point a camera can look at to see the whole scene
    pub fn focus_point(&self) -> Vec3 {
        self.bounds().map_or_else(Vec3::zeros, |bounds| bounds.center())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;
    use crate::gpu::recording::RecordingDevice;
    use crate::gpu::{GpuDevice, QueueType};
    use crate::scene::error::SceneError;
    use approx::assert_relative_eq;

    const RON_SCENE: &str = r#"(
        name: "Courtyard",
        nodes: [
            (
                name: "Root",
                transform: (
                    (1.0, 0.0, 0.0, 5.0),
                    (0.0, 1.0, 0.0, 0.0),
                    (0.0, 0.0, 1.0, 0.0),
                    (0.0, 0.0, 0.0, 1.0),
                ),
                children: [
                    (
                        name: "Tri",
                        texture: Some("stone.png"),
                        lods: [
                            (
                                vertices: [
                                    (position: (0.0, 0.0, 0.0)),
                                    (position: (1.0, 0.0, 0.0)),
                                    (position: (0.0, 1.0, 0.0)),
                                ],
                                indices: [0, 1, 2],
                            ),
                        ],
                    ),
                    (
                        name: "Wall",
                        occluder: true,
                        bounds: Some((min: (-1.0, -1.0, -1.0), max: (1.0, 1.0, 1.0))),
                        lods: [
                            (
                                vertices: [
                                    (position: (0.0, 0.0, 0.0)),
                                    (position: (1.0, 0.0, 0.0)),
                                    (position: (0.0, 1.0, 0.0)),
                                ],
                                indices: [0, 1, 2],
                            ),
                        ],
                    ),
                ],
            ),
        ],
    )"#;

    #[test]
    fn test_parse_ron_description() {
        let desc = SceneDescription::from_str_with_format(RON_SCENE, ConfigFormat::Ron).unwrap();

        assert_eq!(desc.name, "Courtyard");
        assert_eq!(desc.node_count(), 3);
        let root = &desc.nodes[0];
        assert_relative_eq!(root.transform[0][3], 5.0);
        assert!(root.lods.is_empty());
        assert_eq!(root.children[0].texture.as_deref(), Some("stone.png"));
        assert_eq!(root.children[0].transform, IDENTITY_ROWS);
        assert!(root.children[1].occluder);
        assert!(root.children[1].bounds.is_some());
    }

    #[test]
    fn test_parse_toml_description() {
        let toml = r#"
            name = "Minimal"

            [[nodes]]
            name = "Empty"
        "#;
        let desc = SceneDescription::from_str_with_format(toml, ConfigFormat::Toml).unwrap();

        assert_eq!(desc.nodes.len(), 1);
        assert_eq!(desc.nodes[0].transform, IDENTITY_ROWS);
        assert!(!desc.nodes[0].occluder);
    }

    #[test]
    fn test_inverted_bounds_fail_to_parse() {
        let ron = r#"(nodes: [(name: "Bad", bounds: Some((min: (1.0, 1.0, 1.0), max: (0.0, 0.0, 0.0))))])"#;
        assert!(SceneDescription::from_str_with_format(ron, ConfigFormat::Ron).is_err());
    }

    #[test]
    fn test_description_builds_scene() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let desc = SceneDescription::from_str_with_format(RON_SCENE, ConfigFormat::Ron).unwrap();

        let scene = Scene::from_description(&desc, &device, &mut upload, 3, None).unwrap();

        assert_eq!(scene.len(), 3);
        assert_eq!(scene.occluder_count(), 1);
        assert_eq!(scene.occlusion().capacity(), 1);
        assert!(scene.texture("stone.png").is_some());

        let tri = scene.node(scene.find("Tri").unwrap()).unwrap();
        let bounds = tri.geometry().unwrap().bounds;
        // Parent translation applies to derived bounds
        assert_relative_eq!(bounds.min(), Vec3::new(5.0, 0.0, 0.0));
        assert_relative_eq!(bounds.max(), Vec3::new(6.0, 1.0, 0.0));
    }

    #[test]
    fn test_malformed_mesh_is_rejected() {
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();
        let mut desc = SceneDescription::default();
        let mut node = NodeDescription::group("Broken");
        node.lods.push(MeshData::new(vec![crate::scene::mesh::Vertex::at([0.0; 3])], vec![0, 1, 2]));
        desc.nodes.push(node);

        let result = Scene::from_description(&desc, &device, &mut upload, 1, None);
        assert!(matches!(result, Err(SceneError::InvalidMesh { lod: 0, .. })));
    }

    #[test]
    fn test_occlusion_grid_layout() {
        let desc = SceneDescription::occlusion_grid(2, 3, 10.0);
        let device = RecordingDevice::new();
        let mut upload = device.create_command_list(QueueType::Direct, None).unwrap();

        let scene = Scene::from_description(&desc, &device, &mut upload, 2, None).unwrap();

        assert_eq!(desc.node_count(), 2 + 1 + 6);
        assert_eq!(scene.occluder_count(), 1);
        assert_eq!(scene.occludee_count(), 6);
        assert_eq!(scene.occlusion().capacity(), 6);
        assert!(scene.bounds().is_some());
    }

    #[test]
    fn test_save_and_reload_ron() {
        let desc = SceneDescription::occlusion_grid(1, 1, 4.0);
        let text = desc.to_string_with_format(ConfigFormat::Ron).unwrap();
        let reloaded = SceneDescription::from_str_with_format(&text, ConfigFormat::Ron).unwrap();
        assert_eq!(reloaded, desc);
    }
}
