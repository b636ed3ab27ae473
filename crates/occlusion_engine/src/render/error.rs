//! Render layer error types

use super::frame::FrameState;
use crate::config::ConfigError;
use crate::gpu::GpuError;
use crate::scene::SceneError;

/// Errors raised by frames and tasks
#[derive(thiserror::Error, Debug)]
pub enum TaskGraphError {
    /// A task with this name already exists in the frame
    #[error("Task '{0}' already exists in this frame")]
    DuplicateTask(String),

    /// `add_dependency` named a task the frame does not contain
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency {
        /// Dependent task
        task: String,
        /// Missing predecessor
        dependency: String,
    },

    /// Dependencies form a cycle
    #[error("Dependency cycle involving task '{0}'")]
    DependencyCycle(String),

    /// Task handle does not belong to the frame's current tasks
    #[error("Unknown task #{0}")]
    UnknownTask(usize),

    /// Operation not allowed in the frame's current state
    #[error("Frame {slot} is {actual:?}; {operation} needs it to be {expected}")]
    InvalidFrameState {
        /// Frame slot
        slot: usize,
        /// Attempted operation
        operation: &'static str,
        /// Allowed states
        expected: &'static str,
        /// Current state
        actual: FrameState,
    },

    /// GPU failure
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Result alias for task graph operations
pub type TaskGraphResult<T> = Result<T, TaskGraphError>;

/// Errors raised by the frame renderer
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// Frame or task failure
    #[error("Task graph error: {0}")]
    TaskGraph(#[from] TaskGraphError),

    /// Scene failure
    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),

    /// GPU failure
    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),

    /// Invalid renderer configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Result alias for renderer operations
pub type RenderResult<T> = Result<T, RenderError>;
