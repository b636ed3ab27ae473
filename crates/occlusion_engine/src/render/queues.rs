//! Per-queue fences
//!
//! Every queue type owns one monotonically increasing fence. Signals hand
//! out the next value; GPU waits and CPU waits are expressed against those
//! values.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::gpu::{FenceHandle, GpuDevice, GpuResult, QueueType};

/// Fence and counter for each queue type
pub struct CommandQueues {
    fences: [FenceHandle; 3],
    last_signaled: [AtomicU64; 3],
}

impl CommandQueues {
    /// Create one fence per queue type, starting at zero
    pub fn new<D: GpuDevice>(device: &D) -> GpuResult<Self> {
        let fences = [device.create_fence(0)?, device.create_fence(0)?, device.create_fence(0)?];
        log::debug!("Created queue fences");
        Ok(Self {
            fences,
            last_signaled: [AtomicU64::new(0), AtomicU64::new(0), AtomicU64::new(0)],
        })
    }

    /// Fence of a queue
    pub fn fence(&self, queue: QueueType) -> FenceHandle {
        self.fences[queue.index()]
    }

    /// Last value handed out for a queue
    pub fn last_signaled(&self, queue: QueueType) -> u64 {
        self.last_signaled[queue.index()].load(Ordering::Acquire)
    }

    /// Signal the next value on a queue after all work submitted so far
    pub fn signal<D: GpuDevice>(&self, device: &D, queue: QueueType) -> GpuResult<u64> {
        let value = self.last_signaled[queue.index()].fetch_add(1, Ordering::AcqRel) + 1;
        device.signal(queue, self.fence(queue), value)?;
        Ok(value)
    }

    /// Make `queue` wait on the GPU until `on`'s fence reaches `value`
    pub fn wait_gpu<D: GpuDevice>(&self, device: &D, queue: QueueType, on: QueueType, value: u64) -> GpuResult<()> {
        device.wait(queue, self.fence(on), value)
    }

    /// Block until `queue`'s fence reaches `value`
    pub fn wait_cpu<D: GpuDevice>(&self, device: &D, queue: QueueType, value: u64) -> GpuResult<()> {
        if device.completed_value(self.fence(queue))? >= value {
            return Ok(());
        }
        device.wait_for_value(self.fence(queue), value)
    }

    /// Whether `queue`'s fence has reached `value`
    pub fn is_complete<D: GpuDevice>(&self, device: &D, queue: QueueType, value: u64) -> GpuResult<bool> {
        Ok(device.completed_value(self.fence(queue))? >= value)
    }

    /// Signal and wait on every queue
    pub fn flush<D: GpuDevice>(&self, device: &D) -> GpuResult<()> {
        for queue in QueueType::ALL {
            let value = self.signal(device, queue)?;
            self.wait_cpu(device, queue, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;

    #[test]
    fn test_signals_are_monotonic_per_queue() {
        let device = RecordingDevice::new();
        let queues = CommandQueues::new(&device).unwrap();

        assert_eq!(queues.signal(&device, QueueType::Direct).unwrap(), 1);
        assert_eq!(queues.signal(&device, QueueType::Direct).unwrap(), 2);
        assert_eq!(queues.signal(&device, QueueType::Copy).unwrap(), 1);
        assert_eq!(queues.last_signaled(QueueType::Compute), 0);
        assert!(queues.is_complete(&device, QueueType::Direct, 2).unwrap());
    }

    #[test]
    fn test_cross_queue_wait_holds_until_signal() {
        let device = RecordingDevice::new();
        let queues = CommandQueues::new(&device).unwrap();

        queues.wait_gpu(&device, QueueType::Direct, QueueType::Copy, 1).unwrap();
        let direct = queues.signal(&device, QueueType::Direct).unwrap();
        assert!(!queues.is_complete(&device, QueueType::Direct, direct).unwrap());

        queues.signal(&device, QueueType::Copy).unwrap();
        assert!(queues.is_complete(&device, QueueType::Direct, direct).unwrap());
        queues.flush(&device).unwrap();
    }
}
