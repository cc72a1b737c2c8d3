//! Per-frame detection loop: frame → tensor → inference → selection →
//! temporal smoothing → event.

mod config;
mod detection;
mod sink;
mod smoother;
mod worker;

pub use config::{
    EngineConfig, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CONFIRM_FRAMES, DEFAULT_INFERENCE_TIMEOUT,
    DEFAULT_INPUT_SIZE,
};
pub use detection::{
    AbandonReason, Completion, DetectionEngine, EngineState, EngineStats, SkipReason,
    TickOutcome, TickReport,
};
pub use sink::{EventCounter, EventSink};
pub use smoother::{MissPolicy, RefirePolicy, SmoothStep, Smoother};

/// Errors the engine surfaces to its caller. Per-tick failures never appear
/// here; they are absorbed by the loop.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The model could not be loaded or warmed up. The engine stays idle.
    #[error("model failed to load: {0:#}")]
    ModelLoad(anyhow::Error),
    #[error("engine is {actual}, expected {expected}")]
    InvalidState {
        expected: EngineState,
        actual: EngineState,
    },
    #[error("invalid engine config: {0}")]
    Config(String),
    #[error("failed to start inference worker: {0}")]
    Worker(#[from] std::io::Error),
}
