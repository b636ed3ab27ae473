//! Mesh data uploaded per LOD

use bytemuck::{Pod, Zeroable};
use serde::{Serialize, Deserialize};

use crate::foundation::math::Vec3;

/// Vertex layout shared by every scene pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    #[serde(default)]
    pub normal: [f32; 3],
    /// Vertex color
    #[serde(default = "default_color")]
    pub color: [f32; 3],
    /// Texture coordinate
    #[serde(default)]
    pub uv: [f32; 2],
}

fn default_color() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

impl Vertex {
    /// Vertex at a position with default attributes
    pub fn at(position: [f32; 3]) -> Self {
        Self { position, color: default_color(), ..Self::default() }
    }
}

/// Indexed triangle list for one level of detail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshData {
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle indices, three per triangle
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Build a mesh from vertices and indices
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Whether the mesh has nothing to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Vertex data as bytes
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data as bytes
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Check that every index refers to a vertex and that the index count forms triangles
    pub fn validate(&self) -> Result<(), String> {
        if self.indices.len() % 3 != 0 {
            return Err(format!("index count {} is not a multiple of 3", self.indices.len()));
        }
        let vertex_count = self.vertices.len();
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            return Err(format!("index {index} out of range for {vertex_count} vertices"));
        }
        Ok(())
    }

    /// Min and max corners of the vertex positions
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let mut positions = self.vertices.iter().map(|v| Vec3::from(v.position));
        let first = positions.next()?;
        Some(positions.fold((first, first), |(min, max), p| (min.inf(&p), max.sup(&p))))
    }

    /// Axis-aligned box spanning `min`..`max`, uniform color
    pub fn cuboid(min: [f32; 3], max: [f32; 3], color: [f32; 3]) -> Self {
        let corners = super::volumes::cube_corners(Vec3::from(min), Vec3::from(max));
        let vertices = corners
            .iter()
            .map(|corner| Vertex { position: (*corner).into(), color, ..Vertex::default() })
            .collect();
        Self::new(vertices, super::volumes::UNIT_CUBE_INDICES.to_vec())
    }
}
