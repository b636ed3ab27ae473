//! Time management utilities

use std::time::{Duration, Instant};

/// Frame timer that reports frames per second over a rolling window
///
/// The renderer logs a frame-rate line every time the window elapses and
/// the pipeline statistics on a longer cadence.
pub struct FrameTimer {
    last_frame: Instant,
    delta_time: f32,
    window: Duration,
    window_elapsed: Duration,
    window_frames: u32,
    frame_count: u64,
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl FrameTimer {
    /// Create a new timer reporting over the given window
    pub fn new(window: Duration) -> Self {
        Self {
            last_frame: Instant::now(),
            delta_time: 0.0,
            window,
            window_elapsed: Duration::ZERO,
            window_frames: 0,
            frame_count: 0,
        }
    }

    /// Update the timer (should be called once per frame)
    ///
    /// Returns the average frame rate when the window has elapsed.
    pub fn tick(&mut self) -> Option<f32> {
        let now = Instant::now();
        self.tick_with(now.duration_since(self.last_frame));
        self.last_frame = now;
        self.take_window()
    }

    fn tick_with(&mut self, elapsed: Duration) {
        self.delta_time = elapsed.as_secs_f32();
        self.window_elapsed += elapsed;
        self.window_frames += 1;
        self.frame_count += 1;
    }

    fn take_window(&mut self) -> Option<f32> {
        if self.window_elapsed < self.window {
            return None;
        }
        let fps = self.window_frames as f32 / self.window_elapsed.as_secs_f32();
        self.window_elapsed = Duration::ZERO;
        self.window_frames = 0;
        Some(fps)
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}
