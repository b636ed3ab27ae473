//! GPU error types

use super::types::{QueueType, ResourceState};

/// Errors reported by GPU capability implementations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GpuError {
    /// A command was recorded into a closed command list
    #[error("Command list '{0}' is closed")]
    CommandListClosed(String),

    /// An open command list was submitted
    #[error("Command list '{0}' was submitted without being closed")]
    CommandListNotClosed(String),

    /// Handle does not refer to a live object of the expected kind
    #[error("Invalid {0} handle")]
    InvalidHandle(&'static str),

    /// Resource used in a state that does not permit the operation
    #[error("Resource '{resource}' is in state {actual:?}, expected {expected:?}")]
    InvalidResourceState {
        /// Debug name of the resource
        resource: String,
        /// State required by the operation
        expected: ResourceState,
        /// State the resource was in
        actual: ResourceState,
    },

    /// Query index outside the heap
    #[error("Query index {index} out of range for heap of {count}")]
    QueryOutOfRange {
        /// Requested index
        index: u32,
        /// Heap size
        count: u32,
    },

    /// Command list recorded for an incompatible queue
    #[error("Command list for {list:?} queue cannot run on {queue:?} queue")]
    QueueMismatch {
        /// Queue the list was created for
        list: QueueType,
        /// Queue it was submitted to
        queue: QueueType,
    },

    /// Resource creation failed
    #[error("Resource creation failed: {0}")]
    ResourceCreationFailed(String),

    /// CPU wait on a fence value that no queued work will ever signal
    #[error("Fence wait for value {value} can never complete (fence at {completed})")]
    Deadlock {
        /// Requested value
        value: u64,
        /// Value the fence reached
        completed: u64,
    },

    /// Other device failure
    #[error("Device error: {0}")]
    Device(String),
}

/// Result alias for GPU operations
pub type GpuResult<T> = Result<T, GpuError>;
