//! Ring of buffered frames
//!
//! Bounds the number of frames in flight: a slot is only handed out again
//! once the GPU has finished its previous occupant.

use super::error::TaskGraphResult;
use super::frame::{Frame, FrameTargets};
use super::queues::CommandQueues;
use crate::gpu::{GpuDevice, GpuResult, ResourceState, TextureDesc, TextureFormat};

/// Fixed ring of [`Frame`]s
pub struct FramePool<D: GpuDevice> {
    frames: Vec<Frame<D>>,
    current: usize,
    frames_begun: u64,
}

impl<D: GpuDevice> FramePool<D> {
    /// Create `count` frames with `width` x `height` targets
    pub fn new(device: &D, count: usize, width: u32, height: u32) -> GpuResult<Self> {
        let count = count.max(1);
        let frames = (0..count)
            .map(|slot| -> GpuResult<Frame<D>> {
                let targets = FrameTargets {
                    render_target: device.create_texture(&TextureDesc::render_target(
                        format!("Render Target {slot}"),
                        width,
                        height,
                        TextureFormat::Rgba8Unorm,
                    ))?,
                    depth: device.create_texture(&TextureDesc::depth(format!("Depth {slot}"), width, height))?,
                    swap_chain: device.create_texture(&TextureDesc {
                        initial_state: ResourceState::Present,
                        ..TextureDesc::render_target(format!("Swap Chain {slot}"), width, height, TextureFormat::Bgra8Unorm)
                    })?,
                };
                Ok(Frame::new(slot, targets))
            })
            .collect::<GpuResult<Vec<_>>>()?;

        log::info!("Created frame pool: {count} frames of {width}x{height}");
        Ok(Self { frames, current: 0, frames_begun: 0 })
    }

    /// Number of frames that may be in flight
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether the pool is empty (never true)
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames handed out so far
    pub fn frames_begun(&self) -> u64 {
        self.frames_begun
    }

    /// Slot of the most recently begun frame
    pub fn current_slot(&self) -> usize {
        self.current
    }

    /// Most recently begun frame
    pub fn current(&mut self) -> &mut Frame<D> {
        &mut self.frames[self.current]
    }

    /// Frame in a slot
    pub fn frame(&self, slot: usize) -> Option<&Frame<D>> {
        self.frames.get(slot)
    }

    /// Advance to the next slot, wait for its previous work and reset it
    pub fn begin_frame(&mut self, device: &D, queues: &CommandQueues) -> TaskGraphResult<&mut Frame<D>> {
        if self.frames_begun > 0 {
            self.current = (self.current + 1) % self.frames.len();
        }
        self.frames_begun += 1;

        let frame = &mut self.frames[self.current];
        frame.wait_cpu(device, queues)?;
        frame.reset_gpu()?;
        Ok(frame)
    }

    /// Wait for every frame's GPU work
    pub fn wait_idle(&mut self, device: &D, queues: &CommandQueues) -> TaskGraphResult<()> {
        for frame in &mut self.frames {
            frame.wait_cpu(device, queues)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::RecordingDevice;
    use crate::gpu::QueueType;
    use crate::render::frame::FrameState;

    #[test]
    fn test_slots_rotate_and_are_reset() {
        let device = RecordingDevice::new();
        let queues = CommandQueues::new(&device).unwrap();
        let mut pool = FramePool::new(&device, 2, 8, 8).unwrap();

        let slots: Vec<_> = (0..5)
            .map(|i| {
                let frame = pool.begin_frame(&device, &queues).unwrap();
                assert_eq!(frame.state(), FrameState::Idle);
                frame.create_task(&device, QueueType::Direct, None, format!("frame {i}")).unwrap();
                frame.submit(&device, &queues).unwrap();
                frame.slot()
            })
            .collect();

        assert_eq!(slots, [0, 1, 0, 1, 0]);
        assert_eq!(pool.frames_begun(), 5);
        pool.wait_idle(&device, &queues).unwrap();
        assert_eq!(pool.frame(1).unwrap().state(), FrameState::Complete);
    }

    #[test]
    fn test_swap_chain_starts_presentable() {
        let device = RecordingDevice::new();
        let mut pool = FramePool::new(&device, 1, 8, 8).unwrap();

        let targets = pool.current().targets();
        assert_eq!(device.texture_state(targets.swap_chain).unwrap(), ResourceState::Present);
        assert_eq!(device.texture_state(targets.depth).unwrap(), ResourceState::DepthWrite);
    }
}
