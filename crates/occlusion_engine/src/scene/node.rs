//! Scene nodes stored in the scene arena

use crate::foundation::math::Mat4;
use crate::gpu::{BufferHandle, IndexBufferView, TextureHandle, VertexBufferView};
use crate::scene::volumes::AabbVolume;

slotmap::new_key_type! {
    /// Stable handle of a node in its scene
    pub struct NodeId;
}

/// GPU buffers of one level of detail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LodMesh {
    /// Vertex buffer binding
    pub vertex_buffer: VertexBufferView,
    /// Index buffer binding
    pub index_buffer: IndexBufferView,
    /// Indices drawn
    pub index_count: u32,
}

/// Drawable payload of a node
#[derive(Debug, Clone)]
pub struct GeometryNode {
    /// World-space bounds used for culling, occlusion and LOD distance
    pub bounds: AabbVolume,
    /// Occluders are drawn in the depth pre-pass and never queried
    pub occluder: bool,
    /// Levels of detail, most detailed first; never empty
    pub lods: Vec<LodMesh>,
    /// Diffuse texture
    pub texture: Option<TextureHandle>,
    /// Model matrix buffers, one per buffered frame
    pub transform_buffers: Vec<BufferHandle>,
}

impl GeometryNode {
    /// Model matrix buffer used by a frame slot
    pub fn transform_buffer(&self, frame_slot: usize) -> Option<BufferHandle> {
        match self.transform_buffers.len() {
            0 => None,
            len => Some(self.transform_buffers[frame_slot % len]),
        }
    }
}

/// Role of a node
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// Pure grouping node; contributes only its transform
    Group,
    /// Node with LOD meshes
    Geometry(Box<GeometryNode>),
}

/// Node in the scene hierarchy
///
/// Children are owned by the scene arena and listed here by handle; the
/// parent link is a plain back-reference.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) local_transform: Mat4,
    pub(crate) kind: NodeKind,
}

impl SceneNode {
    /// Node name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parent node, `None` for roots
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Child nodes in insertion order
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Transform relative to the parent
    pub fn local_transform(&self) -> &Mat4 {
        &self.local_transform
    }

    /// Node role
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Geometry payload, `None` for groups
    pub fn geometry(&self) -> Option<&GeometryNode> {
        match &self.kind {
            NodeKind::Group => None,
            NodeKind::Geometry(geometry) => Some(&**geometry),
        }
    }

    /// Whether the node is drawn in the depth pre-pass instead of being queried
    pub fn is_occluder(&self) -> bool {
        self.geometry().is_some_and(|g| g.occluder)
    }

    /// Whether the node takes part in occlusion queries
    pub fn is_occludee(&self) -> bool {
        self.geometry().is_some_and(|g| !g.occluder)
    }

    /// Number of LOD meshes
    pub fn lod_count(&self) -> usize {
        self.geometry().map_or(0, |g| g.lods.len())
    }
}
