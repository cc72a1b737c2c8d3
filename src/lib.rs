//! Fall detection loop and the camera/monitor application around it.
//!
//! # Architecture
//!
//! The core is the [`engine::DetectionEngine`]: on each tick it pulls a frame
//! from a [`ingest::FrameSource`], converts it to an [`InputTensor`], runs an
//! [`detect::InferenceBackend`] on a worker thread, picks the best
//! qualifying candidate, smooths the result over time and fires an
//! [`engine::EventSink`] once per confirmed episode.
//!
//! Everything downstream of the sink is application code:
//!
//! - `alert`: hold window and evidence records for accepted events
//! - `stream`: throttled live JPEG view and fps meter
//! - `store`: live frame, fall event and history persistence (SQLite)
//! - `monitor`: alarm edge detection, camera offline detection, history
//!
//! # Module Structure
//!
//! - `frame`: RGB snapshots (private pixels, zeroized on drop)
//! - `tensor`: channel-planar normalized model input
//! - `detect`: backends, output decoding and candidate selection
//! - `engine`: smoothing, state machine, single-flight worker
//! - `ingest`: frame sources (synthetic, local images)
//! - `config`: file + environment configuration

use anyhow::Result;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod alert;
pub mod config;
pub mod detect;
pub mod engine;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod store;
pub mod stream;
pub mod tensor;

pub use alert::{record_fall, AlertLatch};
pub use config::{BackendKind, FallGuardConfig, ModelSettings, SourceSettings};
pub use detect::{load_backend, Candidate, InferenceBackend, RawOutput, Selection};
pub use engine::{
    Completion, DetectionEngine, EngineConfig, EngineError, EngineState, EventCounter, EventSink,
    MissPolicy, RefirePolicy, SkipReason, TickOutcome, TickReport,
};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use monitor::{Alarm, LogAlarm, Monitor, MonitorChange};
pub use store::{
    FallEvent, HistoryItem, InMemoryIncidentStore, IncidentStore, LiveFrame, SqliteIncidentStore,
};
pub use stream::{FpsMeter, LiveStreamPublisher};
pub use tensor::InputTensor;

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> Result<u64> {
    let elapsed = SystemTime::now().duration_since(UNIX_EPOCH)?;
    Ok(u64::try_from(elapsed.as_millis())?)
}
