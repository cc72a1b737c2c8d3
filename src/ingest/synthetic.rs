//! Synthetic scene for `stub://` URLs.
//!
//! The scene alternates a long dark phase with a short bright phase. With the
//! stub backend (score = mean intensity) the bright phase reads as a fall, so
//! the whole pipeline can run without a camera or a model.

use std::time::Instant;

use anyhow::Result;

use super::{FrameSource, SourceStats};
use crate::config::SourceSettings;
use crate::frame::{Frame, CHANNELS};

const QUIET_FRAMES: u64 = 45;
const FALL_FRAMES: u64 = 15;

enum Clock {
    /// Frame index follows wall time at the configured fps, like a live
    /// display: polling faster repeats frames, polling slower skips them.
    Wall { started: Instant, fps: u32 },
    /// Every poll advances one frame.
    PerCall { next: u64 },
}

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    warmup_frames: u64,
    clock: Clock,
    released: bool,
    stats: SourceStats,
}

impl SyntheticSource {
    pub fn new(settings: &SourceSettings) -> Self {
        let name = settings.url.trim().to_string();
        log::info!(
            "synthetic source {} ({}x{} @ {} fps)",
            name,
            settings.width,
            settings.height,
            settings.fps
        );
        Self {
            name: name.clone(),
            width: settings.width,
            height: settings.height,
            warmup_frames: u64::from(settings.warmup_frames),
            clock: Clock::Wall {
                started: Instant::now(),
                fps: settings.fps.max(1),
            },
            released: false,
            stats: SourceStats {
                name,
                ..SourceStats::default()
            },
        }
    }

    /// Source that yields a new frame on every poll with no warm-up.
    pub fn always_ready(width: u32, height: u32) -> Self {
        let name = "stub://test".to_string();
        Self {
            name: name.clone(),
            width,
            height,
            warmup_frames: 0,
            clock: Clock::PerCall { next: 0 },
            released: false,
            stats: SourceStats {
                name,
                ..SourceStats::default()
            },
        }
    }

    /// Frames before the first one is available.
    pub fn with_warmup(mut self, frames: u32) -> Self {
        self.warmup_frames = u64::from(frames);
        self
    }

    /// Whether scene frame `index` is in the bright phase.
    pub fn is_fall_phase(index: u64) -> bool {
        index % (QUIET_FRAMES + FALL_FRAMES) >= QUIET_FRAMES
    }

    /// Render scene frame `index`.
    pub fn render(&self, index: u64) -> Result<Frame> {
        let len = self.width as usize * self.height as usize * CHANNELS;
        let bright = Self::is_fall_phase(index);
        let pixels = (0..len)
            .map(|i| {
                let wobble = i as u64 + index;
                if bright {
                    200 + (wobble % 56) as u8
                } else {
                    (wobble % 32) as u8
                }
            })
            .collect();
        Frame::from_rgb(pixels, self.width, self.height)
    }

    fn next_index(&mut self) -> u64 {
        match &mut self.clock {
            Clock::Wall { started, fps } => {
                (started.elapsed().as_secs_f64() * f64::from(*fps)) as u64
            }
            Clock::PerCall { next } => {
                let index = *next;
                *next += 1;
                index
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        let index = self.next_index();
        if index < self.warmup_frames {
            self.stats.not_ready += 1;
            return Ok(None);
        }
        let frame = self.render(index - self.warmup_frames)?;
        self.stats.frames_captured += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if !self.released {
            log::info!("synthetic source {} released", self.name);
            self.released = true;
        }
    }

    fn is_healthy(&self) -> bool {
        !self.released
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(frame: &Frame) -> f64 {
        let sum: u64 = frame.rgb().iter().map(|&v| u64::from(v)).sum();
        sum as f64 / frame.rgb().len() as f64
    }

    #[test]
    fn warmup_frames_are_not_ready() -> Result<()> {
        let mut source = SyntheticSource::always_ready(4, 4).with_warmup(2);
        assert!(source.current_frame()?.is_none());
        assert!(source.current_frame()?.is_none());
        assert!(source.current_frame()?.is_some());
        assert_eq!(source.stats().not_ready, 2);
        assert_eq!(source.stats().frames_captured, 1);
        Ok(())
    }

    #[test]
    fn bright_phase_follows_quiet_phase() -> Result<()> {
        let source = SyntheticSource::always_ready(8, 8);
        assert!(mean(&source.render(0)?) < 32.0);
        assert!(!SyntheticSource::is_fall_phase(QUIET_FRAMES - 1));
        assert!(SyntheticSource::is_fall_phase(QUIET_FRAMES));
        assert!(mean(&source.render(QUIET_FRAMES)?) > 200.0);
        assert!(!SyntheticSource::is_fall_phase(QUIET_FRAMES + FALL_FRAMES));
        Ok(())
    }

    #[test]
    fn released_source_goes_dark() -> Result<()> {
        let mut source = SyntheticSource::always_ready(4, 4);
        source.release();
        assert!(source.current_frame()?.is_none());
        assert!(!source.is_healthy());
        Ok(())
    }
}
