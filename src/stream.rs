//! Throttled live view for the monitor.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::store::{IncidentStore, LiveFrame};

const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Counts frames and reports a rate once per second.
#[derive(Debug, Clone)]
pub struct FpsMeter {
    window_start: Instant,
    frames: u32,
    fps: u32,
}

impl FpsMeter {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            fps: 0,
        }
    }

    /// Count one frame. Returns the new rate when a window closes.
    pub fn tick(&mut self, now: Instant) -> Option<u32> {
        self.frames += 1;
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < FPS_WINDOW {
            return None;
        }
        self.fps = (f64::from(self.frames) / elapsed.as_secs_f64()).round() as u32;
        self.frames = 0;
        self.window_start = now;
        Some(self.fps)
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}

/// Writes a low-quality JPEG of the current frame at most once per interval.
#[derive(Debug, Clone)]
pub struct LiveStreamPublisher {
    interval: Duration,
    quality: u8,
    last_sent: Option<Instant>,
}

impl LiveStreamPublisher {
    pub fn new(interval: Duration, quality: u8) -> Self {
        Self {
            interval,
            quality,
            last_sent: None,
        }
    }

    pub fn due(&self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    /// Encode and store the frame. The interval restarts even when the write
    /// fails so a broken store is not hammered.
    pub fn publish(
        &mut self,
        store: &mut dyn IncidentStore,
        frame: &Frame,
        fps: u32,
        now: Instant,
        now_ms: u64,
    ) -> Result<usize> {
        self.last_sent = Some(now);
        let jpeg = frame.encode_jpeg(self.quality)?;
        let size = jpeg.len();
        store.put_live_frame(&LiveFrame {
            jpeg,
            last_active_ms: now_ms,
            fps,
        })?;
        Ok(size)
    }
}
