//! Axis-aligned bounding volume

use serde::{Serialize, Deserialize};

use crate::foundation::math::{Mat4, Vec3};
use crate::scene::mesh::{MeshData, Vertex};

/// Triangle indices into [`cube_corners`] order, twelve triangles
pub const UNIT_CUBE_INDICES: [u32; 36] = [
    4, 2, 0,
    2, 7, 3,
    6, 5, 7,
    1, 7, 5,
    0, 3, 1,
    4, 1, 5,
    4, 6, 2,
    2, 6, 7,
    6, 4, 5,
    1, 3, 7,
    0, 2, 3,
    4, 0, 1,
];

/// The eight corners of the box `min`..`max` in proxy-mesh vertex order
pub fn cube_corners(min: Vec3, max: Vec3) -> [Vec3; 8] {
    [
        Vec3::new(max.x, max.y, min.z),
        Vec3::new(max.x, min.y, min.z),
        Vec3::new(max.x, max.y, max.z),
        Vec3::new(max.x, min.y, max.z),
        Vec3::new(min.x, max.y, min.z),
        Vec3::new(min.x, min.y, min.z),
        Vec3::new(min.x, max.y, max.z),
        Vec3::new(min.x, min.y, max.z),
    ]
}

/// Axis-Aligned Bounding Box
///
/// Always satisfies `min <= max` component-wise; construction rejects
/// inverted corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AabbBounds", into = "AabbBounds")]
pub struct AabbVolume {
    min: Vec3,
    max: Vec3,
}

/// Serialized form of [`AabbVolume`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AabbBounds {
    /// Minimum corner
    pub min: [f32; 3],
    /// Maximum corner
    pub max: [f32; 3],
}

impl TryFrom<AabbBounds> for AabbVolume {
    type Error = String;

    fn try_from(bounds: AabbBounds) -> Result<Self, Self::Error> {
        Self::new(bounds.min.into(), bounds.max.into())
            .ok_or_else(|| format!("inverted bounds: min {:?} max {:?}", bounds.min, bounds.max))
    }
}

impl From<AabbVolume> for AabbBounds {
    fn from(volume: AabbVolume) -> Self {
        Self { min: volume.min.into(), max: volume.max.into() }
    }
}

impl AabbVolume {
    /// Create a new AABB from min and max points
    ///
    /// Returns `None` when any component of `min` exceeds `max` or is not finite.
    pub fn new(min: Vec3, max: Vec3) -> Option<Self> {
        let finite = min.iter().chain(max.iter()).all(|v| v.is_finite());
        let ordered = min.iter().zip(max.iter()).all(|(lo, hi)| lo <= hi);
        (finite && ordered).then_some(Self { min, max })
    }

    /// Create an AABB centered at a point with given half-extents
    pub fn from_center_extents(center: Vec3, extents: Vec3) -> Option<Self> {
        Self::new(center - extents, center + extents)
    }

    /// Smallest box containing every point
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = *points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.inf(p), max.sup(p)));
        Self::new(min, max)
    }

    /// Minimum corner
    pub fn min(&self) -> Vec3 {
        self.min
    }

    /// Maximum corner
    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the extents (half-size) of the AABB
    pub fn extents(&self) -> Vec3 {
        (self.max - self.min) * 0.5
    }

    /// Check if this AABB contains a point
    pub fn contains_point(&self, point: &Vec3) -> bool {
        point.x >= self.min.x && point.x <= self.max.x
            && point.y >= self.min.y && point.y <= self.max.y
            && point.z >= self.min.z && point.z <= self.max.z
    }

    /// Check if this AABB intersects another AABB
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x && self.max.x >= other.min.x
            && self.min.y <= other.max.y && self.max.y >= other.min.y
            && self.min.z <= other.max.z && self.max.z >= other.min.z
    }

    /// Check if the segment from `start` to `end` passes through this AABB
    pub fn intersects_segment(&self, start: &Vec3, end: &Vec3) -> bool {
        let direction = end - start;
        let (mut t_min, mut t_max) = (0.0_f32, 1.0_f32);
        for axis in 0..3 {
            if direction[axis].abs() < f32::EPSILON {
                if start[axis] < self.min[axis] || start[axis] > self.max[axis] {
                    return false;
                }
                continue;
            }
            let inv = direction[axis].recip();
            let near = (self.min[axis] - start[axis]) * inv;
            let far = (self.max[axis] - start[axis]) * inv;
            t_min = t_min.max(near.min(far));
            t_max = t_max.min(near.max(far));
            if t_min > t_max {
                return false;
            }
        }
        true
    }

    /// Smallest box containing both
    pub fn merged(&self, other: &Self) -> Self {
        Self { min: self.min.inf(&other.min), max: self.max.sup(&other.max) }
    }

    /// Corners in proxy-mesh vertex order
    pub fn corners(&self) -> [Vec3; 8] {
        cube_corners(self.min, self.max)
    }

    /// Box containing this one after an affine transform
    pub fn transformed(&self, transform: &Mat4) -> Self {
        let corners = self.corners().map(|corner| transform.transform_point(&corner.into()).coords);
        let (min, max) = corners[1..]
            .iter()
            .fold((corners[0], corners[0]), |(min, max), p| (min.inf(p), max.sup(p)));
        Self { min, max }
    }

    /// Transform taking the `[-1, 1]` unit cube onto this box
    pub fn unit_cube_transform(&self) -> Mat4 {
        Mat4::new_translation(&self.center()) * Mat4::new_nonuniform_scaling(&self.extents())
    }

    /// The `[-1, 1]` proxy cube drawn for bounding-box occlusion tests and debug overlays
    pub fn unit_cube_mesh() -> MeshData {
        let vertices = cube_corners(Vec3::repeat(-1.0), Vec3::repeat(1.0))
            .iter()
            .map(|corner| Vertex::at((*corner).into()))
            .collect();
        MeshData::new(vertices, UNIT_CUBE_INDICES.to_vec())
    }
}
