//! Scene hierarchy, bounding volumes and traversal
//!
//! A [`Scene`] owns its nodes in an arena keyed by [`NodeId`]. Geometry
//! nodes carry LOD meshes, world-space bounds and an occluder flag; the
//! traversals in [`traversal`] record occlusion queries and draws for them.

pub mod camera;
pub mod description;
pub mod error;
pub mod mesh;
pub mod node;
pub mod graph;
pub mod traversal;
pub mod volumes;

pub use camera::Camera;
pub use description::{NodeDescription, SceneDescription};
pub use error::{SceneError, SceneResult};
pub use mesh::{MeshData, Vertex};
pub use node::{GeometryNode, LodMesh, NodeId, NodeKind, SceneNode};
pub use graph::{GeometryDesc, Scene};
pub use traversal::{DrawContext, TraversalStats};
pub use volumes::{AabbVolume, FrustumVolume, Plane};
