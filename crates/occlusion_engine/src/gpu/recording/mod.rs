//! Deterministic software GPU backend
//!
//! [`RecordingDevice`] implements the capability traits without touching
//! hardware. Command lists record [`Command`]s; submission queues them per
//! queue type and executes them in order, honoring GPU-side fence waits.
//! Execution validates resource states, evaluates occlusion queries through
//! an optional visibility test, applies predication and counts pipeline
//! statistics. Everything that ran is kept in an execution log.

mod command_list;
mod device;
mod executor;

pub use command_list::{Command, RecordingCommandList};
pub use device::{DeviceStats, ExecutionEvent, RecordingDevice, VisibilityFn};
