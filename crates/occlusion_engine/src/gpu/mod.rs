//! GPU abstraction layer
//!
//! Backend-neutral handles, descriptors and capability traits, plus a
//! deterministic software backend used by the demo and the tests.

pub mod types;
pub mod error;
pub mod device;
pub mod recording;

pub use types::*;
pub use error::{GpuError, GpuResult};
pub use device::{CommandList, GpuDevice, GpuResources};
