//! Scene error types

use super::node::NodeId;
use crate::config::ConfigError;
use crate::gpu::GpuError;
use crate::visibility::OcclusionError;

/// Errors raised while building or traversing a scene
#[derive(thiserror::Error, Debug)]
pub enum SceneError {
    /// Handle does not belong to this scene
    #[error("Unknown scene node {0:?}")]
    UnknownNode(NodeId),

    /// Bounds are missing, inverted or not finite
    #[error("Invalid bounds for node '{node}': {reason}")]
    InvalidBounds {
        /// Node name
        node: String,
        /// What was wrong
        reason: String,
    },

    /// A LOD mesh has no vertices or no indices
    #[error("LOD {lod} of node '{node}' is empty")]
    EmptyMesh {
        /// Node name
        node: String,
        /// LOD index
        lod: usize,
    },

    /// A LOD mesh has malformed indices
    #[error("LOD {lod} of node '{node}' is malformed: {reason}")]
    InvalidMesh {
        /// Node name
        node: String,
        /// LOD index
        lod: usize,
        /// What was wrong
        reason: String,
    },

    /// Occlusion engine failure
    #[error("Occlusion error: {0}")]
    Occlusion(#[from] OcclusionError),

    /// GPU failure
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Scene description could not be loaded
    #[error("Scene description error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for scene operations
pub type SceneResult<T> = Result<T, SceneError>;
