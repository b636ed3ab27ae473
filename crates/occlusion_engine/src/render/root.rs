//! Root parameter slots shared by the scene pipelines and the code that binds them

/// View-projection matrix constants (depth, occlusion and scene pipelines)
pub const VIEW_PROJECTION: u32 = 0;

/// Occlusion proxy bounds: `min.xyz` at offset 0, `max.xyz` at offset 4
pub const OCCLUSION_BOUNDS: u32 = 1;

/// Has-texture flag constant
pub const HAS_TEXTURE: u32 = 1;

/// Ambient light constant buffer
pub const AMBIENT: u32 = 2;

/// Per-node model matrix shader resource
pub const MODEL_MATRIX: u32 = 3;

/// Diffuse texture descriptor table
pub const DIFFUSE_TEXTURE: u32 = 4;

/// Bounding-box overlay extents, laid out like [`OCCLUSION_BOUNDS`]
pub const BOUNDS_EXTENTS: u32 = 0;

/// Bounding-box overlay view-projection matrix
pub const BOUNDS_VIEW_PROJECTION: u32 = 1;

/// Offset of `max.xyz` within a bounds constant block
pub const BOUNDS_MAX_OFFSET: u32 = 4;
