//! Frame task graph and render orchestration
//!
//! A [`Frame`] collects named [`Task`]s, each owning command lists for one
//! queue. Tasks declare predecessors by name; submission executes them in
//! dependency order with a fence wait for every edge. [`FramePool`] cycles
//! buffered frames, and [`FrameRenderer`] records the occlusion-culled
//! scene passes into them.

pub mod error;
pub mod frame;
pub mod frame_pool;
pub mod queues;
pub mod renderer;
pub mod root;
pub mod task;


pub use error::{RenderError, RenderResult, TaskGraphError, TaskGraphResult};
pub use frame::{Frame, FrameState, FrameTargets};
pub use frame_pool::FramePool;
pub use queues::CommandQueues;
pub use renderer::{AmbientLight, FrameRenderer, FrameReport, ScenePipelines};
pub use task::{Task, TaskId};
