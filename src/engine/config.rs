use std::time::Duration;

use super::smoother::{MissPolicy, RefirePolicy};
use super::EngineError;

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.65;
pub const DEFAULT_CONFIRM_FRAMES: u32 = 3;
pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(5);

/// Detection loop parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Square side the model expects.
    pub input_size: u32,
    /// Minimum target-class score for a candidate to qualify (inclusive).
    pub confidence_threshold: f32,
    /// Qualifying frames needed to confirm an event.
    pub confirm_frames: u32,
    pub miss_policy: MissPolicy,
    pub refire_policy: RefirePolicy,
    /// Optional cap on the smoothing counter.
    pub max_count: Option<u32>,
    /// Minimum time between dispatched inferences. Zero ticks as fast as the
    /// host loop calls in.
    pub sample_interval: Duration,
    /// Inference running longer than this is abandoned. `None` waits forever.
    pub inference_timeout: Option<Duration>,
    /// Class index scored by the selection step.
    pub target_class: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            confirm_frames: DEFAULT_CONFIRM_FRAMES,
            miss_policy: MissPolicy::Decay,
            refire_policy: RefirePolicy::Cooldown,
            max_count: None,
            sample_interval: Duration::ZERO,
            inference_timeout: Some(DEFAULT_INFERENCE_TIMEOUT),
            target_class: 0,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.input_size == 0 {
            return Err(EngineError::Config("input_size must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(EngineError::Config(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        if self.confirm_frames == 0 {
            return Err(EngineError::Config("confirm_frames must be >= 1".into()));
        }
        if let Some(max) = self.max_count {
            if max < self.confirm_frames {
                return Err(EngineError::Config(format!(
                    "max_count ({}) must be >= confirm_frames ({})",
                    max, self.confirm_frames
                )));
            }
        }
        if self.inference_timeout == Some(Duration::ZERO) {
            return Err(EngineError::Config(
                "inference_timeout must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}
