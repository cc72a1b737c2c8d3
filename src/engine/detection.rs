use std::fmt;
use std::time::{Duration, Instant};

use crate::detect::{Candidate, InferenceBackend, Selection};
use crate::frame::Frame;
use crate::ingest::{FrameSource, SourceStats};
use crate::tensor::InputTensor;

use super::config::EngineConfig;
use super::sink::EventSink;
use super::smoother::Smoother;
use super::worker::{InferenceWorker, JobResult, Received};
use super::EngineError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No model loaded.
    Idle,
    /// Model loaded, no frame source attached.
    Ready,
    Running,
    /// An event has fired and the counter has not yet returned to zero.
    EpisodeActive,
    /// Torn down. Late inference results are discarded.
    Stopped,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Ready => "ready",
            EngineState::Running => "running",
            EngineState::EpisodeActive => "episode-active",
            EngineState::Stopped => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, EngineState::Running | EngineState::EpisodeActive)
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotRunning,
    /// A previous inference is still outstanding.
    InFlight,
    /// Sample interval has not elapsed since the last dispatch.
    Cadence,
    /// The source had no frame ready.
    NoFrame,
    /// The frame could not be fitted or converted to a tensor.
    InvalidFrame,
    /// The inference worker has gone away.
    WorkerUnavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// A tensor was built and handed to the worker.
    Dispatched { tick: u64 },
    Skipped(SkipReason),
}

impl TickOutcome {
    pub fn dispatched(&self) -> bool {
        matches!(self, TickOutcome::Dispatched { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AbandonReason {
    Backend(String),
    Selection(String),
    TimedOut(Duration),
    WorkerLost,
}

impl fmt::Display for AbandonReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbandonReason::Backend(err) => write!(f, "backend error: {}", err),
            AbandonReason::Selection(err) => write!(f, "unusable output: {}", err),
            AbandonReason::TimedOut(limit) => write!(f, "no result within {:?}", limit),
            AbandonReason::WorkerLost => f.write_str("inference worker exited"),
        }
    }
}

/// Applied result of one successful tick.
#[derive(Clone, Debug, PartialEq)]
pub struct TickReport {
    pub tick: u64,
    /// Best qualifying candidate for this frame.
    pub best: Option<Candidate>,
    pub qualifying: usize,
    /// Smoothing counter after this frame.
    pub count: u32,
    /// The event sink was invoked for this frame.
    pub fired: bool,
    pub episode_ended: bool,
    pub state: EngineState,
    pub inference_time: Duration,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Completion {
    /// The result was applied to the smoothing state.
    Applied(TickReport),
    /// The tick failed. Smoothing state was not touched.
    Abandoned { tick: u64, reason: AbandonReason },
    /// A late result for an abandoned tick arrived and was dropped.
    Discarded { tick: u64 },
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub dispatched: u64,
    pub tensors_built: u64,
    pub applied: u64,
    pub skipped_busy: u64,
    pub skipped_no_frame: u64,
    pub invalid_frames: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub discarded: u64,
    pub events: u64,
    pub stall_warnings: u64,
}

/// An abandoned inference still holding the slot this many timeouts after
/// dispatch is reported as a stall, at most once per window.
const STALL_TIMEOUTS: u32 = 3;

#[derive(Debug)]
struct InFlight {
    tick: u64,
    started: Instant,
    abandoned: bool,
    stall_warned: Option<Instant>,
}

/// Drives the detect-and-decide loop for one frame source and one model.
///
/// The host calls [`process_tick`](Self::process_tick) on its own cadence and
/// [`poll`](Self::poll) (or [`wait_for_inference`](Self::wait_for_inference))
/// to apply finished inference. At most one inference is outstanding at a
/// time; a tick that arrives while one is pending is skipped, never queued.
/// A pending result that has not been polled still counts as in flight.
pub struct DetectionEngine {
    config: EngineConfig,
    state: EngineState,
    smoother: Smoother,
    sink: Box<dyn EventSink>,
    worker: Option<InferenceWorker>,
    backend_name: Option<&'static str>,
    source: Option<Box<dyn FrameSource>>,
    in_flight: Option<InFlight>,
    next_tick: u64,
    last_dispatch: Option<Instant>,
    last_report: Option<TickReport>,
    stats: EngineStats,
}

impl DetectionEngine {
    pub fn new<S>(config: EngineConfig, sink: S) -> Result<Self, EngineError>
    where
        S: EventSink + 'static,
    {
        config.validate()?;
        let smoother = Smoother::new(
            config.confirm_frames,
            config.max_count,
            config.miss_policy,
            config.refire_policy,
        );
        Ok(Self {
            config,
            state: EngineState::Idle,
            smoother,
            sink: Box::new(sink),
            worker: None,
            backend_name: None,
            source: None,
            in_flight: None,
            next_tick: 0,
            last_dispatch: None,
            last_report: None,
            stats: EngineStats::default(),
        })
    }

    /// Load and warm up the backend, then start the inference worker.
    ///
    /// Any failure is fatal: the engine stays `Idle` and the error is returned
    /// to the caller. There is no retry.
    pub fn load_model<F>(&mut self, load: F) -> Result<(), EngineError>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn InferenceBackend>>,
    {
        self.expect_state(EngineState::Idle)?;
        let mut backend = load().map_err(EngineError::ModelLoad)?;
        backend.warm_up().map_err(EngineError::ModelLoad)?;
        let name = backend.name();
        let worker = InferenceWorker::spawn(backend)?;
        self.worker = Some(worker);
        self.backend_name = Some(name);
        self.transition(EngineState::Ready);
        log::info!("model ready (backend {})", name);
        Ok(())
    }

    /// Attach the frame source and begin accepting ticks.
    pub fn start(&mut self, source: Box<dyn FrameSource>) -> Result<(), EngineError> {
        self.expect_state(EngineState::Ready)?;
        log::info!("detection loop started on source {}", source.name());
        self.source = Some(source);
        self.transition(EngineState::Running);
        Ok(())
    }

    /// Try to dispatch one inference for the current frame.
    pub fn process_tick(&mut self) -> TickOutcome {
        if !self.state.is_running() {
            return TickOutcome::Skipped(SkipReason::NotRunning);
        }
        if self.worker.is_none() {
            return TickOutcome::Skipped(SkipReason::WorkerUnavailable);
        }
        if self.in_flight.is_some() {
            self.stats.skipped_busy += 1;
            self.warn_if_stalled();
            return TickOutcome::Skipped(SkipReason::InFlight);
        }
        if let Some(last) = self.last_dispatch {
            if last.elapsed() < self.config.sample_interval {
                return TickOutcome::Skipped(SkipReason::Cadence);
            }
        }

        let Some(source) = self.source.as_mut() else {
            return TickOutcome::Skipped(SkipReason::NotRunning);
        };
        let frame = match source.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.stats.skipped_no_frame += 1;
                return TickOutcome::Skipped(SkipReason::NoFrame);
            }
            Err(err) => {
                log::debug!("source {} has no frame: {:#}", source.name(), err);
                self.stats.skipped_no_frame += 1;
                return TickOutcome::Skipped(SkipReason::NoFrame);
            }
        };

        let size = self.config.input_size;
        let tensor = match frame
            .fit_square(size)
            .and_then(|fitted| InputTensor::from_frame(&fitted))
        {
            Ok(tensor) => tensor,
            Err(err) => {
                log::warn!("dropping frame: {:#}", err);
                self.stats.invalid_frames += 1;
                return TickOutcome::Skipped(SkipReason::InvalidFrame);
            }
        };
        self.stats.tensors_built += 1;

        let tick = self.next_tick;
        self.next_tick += 1;
        let submitted = self
            .worker
            .as_ref()
            .map(|worker| worker.submit(tick, tensor))
            .unwrap_or(false);
        if !submitted {
            log::error!("inference worker is gone; detection halted");
            self.worker = None;
            return TickOutcome::Skipped(SkipReason::WorkerUnavailable);
        }

        let now = Instant::now();
        self.in_flight = Some(InFlight {
            tick,
            started: now,
            abandoned: false,
            stall_warned: None,
        });
        self.last_dispatch = Some(now);
        self.stats.dispatched += 1;
        TickOutcome::Dispatched { tick }
    }

    /// Apply a finished inference if one is waiting. Never blocks.
    pub fn poll(&mut self) -> Option<Completion> {
        if let Some(done) = self.check_timeout() {
            return Some(done);
        }
        let received = self.worker.as_ref()?.try_recv();
        self.handle(received)
    }

    /// Block up to `timeout` for the outstanding inference to finish.
    pub fn wait_for_inference(&mut self, timeout: Duration) -> Option<Completion> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(done) = self.check_timeout() {
                return Some(done);
            }
            let now = Instant::now();
            if self.in_flight.is_none() || now >= deadline {
                return self.poll();
            }
            let mut wait = deadline - now;
            if let Some(left) = self.time_until_timeout(now) {
                wait = wait.min(left);
            }
            let received = self.worker.as_ref()?.recv_timeout(wait);
            if let Some(done) = self.handle(received) {
                return Some(done);
            }
        }
    }

    /// Dispatch a tick and wait for its result.
    pub fn run_tick_blocking(&mut self, timeout: Duration) -> (TickOutcome, Option<Completion>) {
        let outcome = self.process_tick();
        let completion = if outcome.dispatched() {
            self.wait_for_inference(timeout)
        } else {
            None
        };
        (outcome, completion)
    }

    /// Tear down. No event fires after this returns; results still in the
    /// worker are never applied.
    pub fn stop(&mut self) {
        if self.state == EngineState::Stopped {
            return;
        }
        self.worker = None;
        if let Some(flight) = self.in_flight.take() {
            log::debug!("discarding in-flight tick {}", flight.tick);
            self.stats.discarded += 1;
        }
        if let Some(mut source) = self.source.take() {
            source.release();
        }
        self.transition(EngineState::Stopped);
        log::info!(
            "detection loop stopped (dispatched {}, events {})",
            self.stats.dispatched,
            self.stats.events
        );
    }

    /// Current source frame fitted to the model size, for evidence and live
    /// view. Does not touch the detection state.
    pub fn snapshot_frame(&mut self) -> Option<Frame> {
        if !self.state.is_running() {
            return None;
        }
        let size = self.config.input_size;
        let source = self.source.as_mut()?;
        match source.current_frame() {
            Ok(Some(frame)) => match frame.fit_square(size) {
                Ok(frame) => Some(frame),
                Err(err) => {
                    log::debug!("snapshot failed: {:#}", err);
                    None
                }
            },
            _ => None,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn counter(&self) -> u32 {
        self.smoother.count()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    pub fn backend_name(&self) -> Option<&'static str> {
        self.backend_name
    }

    pub fn source_healthy(&self) -> bool {
        self.source.as_ref().map(|s| s.is_healthy()).unwrap_or(false)
    }

    pub fn source_stats(&self) -> Option<SourceStats> {
        self.source.as_ref().map(|s| s.stats())
    }

    fn warn_if_stalled(&mut self) {
        let Some(limit) = self.config.inference_timeout else {
            return;
        };
        let Some(flight) = self.in_flight.as_mut() else {
            return;
        };
        let window = limit * STALL_TIMEOUTS;
        let stalled = flight.started.elapsed();
        if !flight.abandoned || stalled < window {
            return;
        }
        if flight.stall_warned.is_some_and(|at| at.elapsed() < window) {
            return;
        }
        flight.stall_warned = Some(Instant::now());
        self.stats.stall_warnings += 1;
        log::warn!(
            "inference for tick {} still outstanding after {:?}; detection is stalled until the backend returns",
            flight.tick,
            stalled
        );
    }

    fn handle(&mut self, received: Received) -> Option<Completion> {
        match received {
            Received::Result(result) => Some(self.complete(result)),
            Received::Empty => None,
            Received::Disconnected => self.worker_lost(),
        }
    }

    fn check_timeout(&mut self) -> Option<Completion> {
        let limit = self.config.inference_timeout?;
        let flight = self.in_flight.as_mut()?;
        if flight.abandoned || flight.started.elapsed() < limit {
            return None;
        }
        flight.abandoned = true;
        self.stats.timeouts += 1;
        log::warn!("inference for tick {} exceeded {:?}; abandoning", flight.tick, limit);
        Some(Completion::Abandoned {
            tick: flight.tick,
            reason: AbandonReason::TimedOut(limit),
        })
    }

    fn time_until_timeout(&self, now: Instant) -> Option<Duration> {
        let limit = self.config.inference_timeout?;
        let flight = self.in_flight.as_ref()?;
        if flight.abandoned {
            return None;
        }
        Some((flight.started + limit).saturating_duration_since(now))
    }

    fn worker_lost(&mut self) -> Option<Completion> {
        log::error!("inference worker exited; detection halted");
        self.worker = None;
        let flight = self.in_flight.take()?;
        self.stats.errors += 1;
        Some(Completion::Abandoned {
            tick: flight.tick,
            reason: AbandonReason::WorkerLost,
        })
    }

    fn complete(&mut self, result: JobResult) -> Completion {
        let flight = match self.in_flight.take() {
            Some(flight) if flight.tick == result.tick => flight,
            other => {
                self.in_flight = other;
                self.stats.discarded += 1;
                return Completion::Discarded { tick: result.tick };
            }
        };
        if flight.abandoned || !self.state.is_running() {
            log::debug!("discarding late result for tick {}", flight.tick);
            self.stats.discarded += 1;
            return Completion::Discarded { tick: flight.tick };
        }

        let output = match result.output {
            Ok(output) => output,
            Err(err) => {
                self.stats.errors += 1;
                log::warn!("inference failed on tick {}: {:#}", flight.tick, err);
                return Completion::Abandoned {
                    tick: flight.tick,
                    reason: AbandonReason::Backend(format!("{:#}", err)),
                };
            }
        };
        let selection = match output
            .select_best(self.config.target_class, self.config.confidence_threshold)
        {
            Ok(selection) => selection,
            Err(err) => {
                self.stats.errors += 1;
                log::warn!("unusable model output on tick {}: {:#}", flight.tick, err);
                return Completion::Abandoned {
                    tick: flight.tick,
                    reason: AbandonReason::Selection(format!("{:#}", err)),
                };
            }
        };
        drop(output);
        Completion::Applied(self.apply(flight.tick, selection, result.elapsed))
    }

    fn apply(&mut self, tick: u64, selection: Selection, elapsed: Duration) -> TickReport {
        let step = self.smoother.observe(selection.qualified());
        if step.fired {
            self.stats.events += 1;
            log::warn!(
                "detection confirmed on tick {} (count {}, confidence {:.2})",
                tick,
                step.count,
                selection.confidence().unwrap_or_default()
            );
            self.sink.fire();
        }
        if step.episode_ended {
            log::info!("episode ended on tick {}", tick);
        }
        let next = if step.episode_active {
            EngineState::EpisodeActive
        } else {
            EngineState::Running
        };
        self.transition(next);
        self.stats.applied += 1;

        let report = TickReport {
            tick,
            best: selection.best,
            qualifying: selection.qualifying,
            count: step.count,
            fired: step.fired,
            episode_ended: step.episode_ended,
            state: self.state,
            inference_time: elapsed,
        };
        self.last_report = Some(report.clone());
        report
    }

    fn expect_state(&self, expected: EngineState) -> Result<(), EngineError> {
        if self.state != expected {
            return Err(EngineError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            log::debug!("engine {} -> {}", self.state, next);
            self.state = next;
        }
    }
}

impl Drop for DetectionEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{OutputLayout, OutputShape, ScriptHandle, ScriptedBackend};
    use crate::engine::EventCounter;
    use crate::ingest::SyntheticSource;

    const WAIT: Duration = Duration::from_secs(5);

    fn small_config() -> EngineConfig {
        EngineConfig {
            input_size: 8,
            ..EngineConfig::default()
        }
    }

    fn running_engine() -> (DetectionEngine, ScriptHandle, EventCounter) {
        let events = EventCounter::new();
        let mut engine = DetectionEngine::new(small_config(), events.clone()).unwrap();
        let (backend, handle) =
            ScriptedBackend::new(OutputShape::new(64, 1, OutputLayout::AttributeMajor));
        engine.load_model(|| Ok(Box::new(backend))).unwrap();
        engine
            .start(Box::new(SyntheticSource::always_ready(16, 12)))
            .unwrap();
        (engine, handle, events)
    }

    #[test]
    fn starts_idle_and_walks_to_running() {
        let mut engine = DetectionEngine::new(small_config(), || {}).unwrap();
        assert_eq!(engine.state(), EngineState::Idle);
        assert_eq!(
            engine.process_tick(),
            TickOutcome::Skipped(SkipReason::NotRunning)
        );
        let err = engine
            .start(Box::new(SyntheticSource::always_ready(8, 8)))
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidState { .. }));

        let (backend, _handle) =
            ScriptedBackend::new(OutputShape::new(4, 1, OutputLayout::AttributeMajor));
        engine.load_model(|| Ok(Box::new(backend))).unwrap();
        assert_eq!(engine.state(), EngineState::Ready);
        assert_eq!(engine.backend_name(), Some("scripted"));
        engine
            .start(Box::new(SyntheticSource::always_ready(8, 8)))
            .unwrap();
        assert_eq!(engine.state(), EngineState::Running);
    }

    #[test]
    fn failed_load_keeps_engine_idle() {
        let mut engine = DetectionEngine::new(small_config(), || {}).unwrap();
        let err = engine
            .load_model(|| Err(anyhow::anyhow!("weights missing")))
            .unwrap_err();
        assert!(matches!(err, EngineError::ModelLoad(_)));
        assert!(err.to_string().contains("weights missing"));
        assert_eq!(engine.state(), EngineState::Idle);
    }

    #[test]
    fn fires_once_and_enters_episode() {
        let (mut engine, handle, events) = running_engine();
        handle.push_best([Some(0.9), Some(0.9), Some(0.9), Some(0.9)]);
        let mut fired = Vec::new();
        for _ in 0..4 {
            let (outcome, done) = engine.run_tick_blocking(WAIT);
            assert!(outcome.dispatched());
            match done {
                Some(Completion::Applied(report)) => fired.push(report.fired),
                other => panic!("unexpected completion {:?}", other),
            }
        }
        assert_eq!(fired, vec![false, false, true, false]);
        assert_eq!(events.total(), 1);
        assert_eq!(engine.state(), EngineState::EpisodeActive);
    }

    #[test]
    fn backend_error_leaves_counter_untouched() {
        let (mut engine, handle, _events) = running_engine();
        handle.push_best([Some(0.9)]);
        handle.push(crate::detect::ScriptStep::Fail("device lost".into()));
        engine.run_tick_blocking(WAIT);
        assert_eq!(engine.counter(), 1);
        let (_, done) = engine.run_tick_blocking(WAIT);
        assert!(matches!(
            done,
            Some(Completion::Abandoned {
                reason: AbandonReason::Backend(_),
                ..
            })
        ));
        assert_eq!(engine.counter(), 1);
        assert_eq!(engine.stats().errors, 1);
    }

    #[test]
    fn cadence_gates_dispatch() {
        let events = EventCounter::new();
        let config = EngineConfig {
            sample_interval: Duration::from_secs(3600),
            ..small_config()
        };
        let mut engine = DetectionEngine::new(config, events).unwrap();
        let (backend, _handle) =
            ScriptedBackend::new(OutputShape::new(4, 1, OutputLayout::AttributeMajor));
        engine.load_model(|| Ok(Box::new(backend))).unwrap();
        engine
            .start(Box::new(SyntheticSource::always_ready(8, 8)))
            .unwrap();
        let (first, _) = engine.run_tick_blocking(WAIT);
        assert!(first.dispatched());
        assert_eq!(
            engine.process_tick(),
            TickOutcome::Skipped(SkipReason::Cadence)
        );
    }

    #[test]
    fn timeout_abandons_then_discards_late_result() {
        let events = EventCounter::new();
        let config = EngineConfig {
            inference_timeout: Some(Duration::from_millis(20)),
            ..small_config()
        };
        let mut engine = DetectionEngine::new(config, events.clone()).unwrap();
        let (backend, handle) =
            ScriptedBackend::new(OutputShape::new(4, 1, OutputLayout::AttributeMajor));
        engine.load_model(|| Ok(Box::new(backend))).unwrap();
        engine
            .start(Box::new(SyntheticSource::always_ready(8, 8)))
            .unwrap();

        handle.hold();
        handle.push_best([Some(0.99)]);
        assert!(engine.process_tick().dispatched());
        assert!(handle.wait_until_parked(WAIT));
        let done = engine.wait_for_inference(WAIT);
        assert!(matches!(
            done,
            Some(Completion::Abandoned {
                reason: AbandonReason::TimedOut(_),
                ..
            })
        ));
        // still single-flight until the worker hands the result back
        assert_eq!(
            engine.process_tick(),
            TickOutcome::Skipped(SkipReason::InFlight)
        );
        handle.release();
        assert_eq!(
            engine.wait_for_inference(WAIT),
            Some(Completion::Discarded { tick: 0 })
        );
        assert_eq!(engine.counter(), 0);
        assert_eq!(events.total(), 0);
        assert!(engine.process_tick().dispatched());
    }

    #[test]
    fn hung_backend_is_reported_as_stalled_once_per_window() {
        let config = EngineConfig {
            inference_timeout: Some(Duration::from_millis(10)),
            ..small_config()
        };
        let mut engine = DetectionEngine::new(config, || {}).unwrap();
        let (backend, handle) =
            ScriptedBackend::new(OutputShape::new(4, 1, OutputLayout::AttributeMajor));
        engine.load_model(|| Ok(Box::new(backend))).unwrap();
        engine
            .start(Box::new(SyntheticSource::always_ready(8, 8)))
            .unwrap();

        handle.hold();
        handle.push_best([Some(0.5)]);
        assert!(engine.process_tick().dispatched());
        assert!(handle.wait_until_parked(WAIT));
        assert!(matches!(
            engine.wait_for_inference(WAIT),
            Some(Completion::Abandoned { .. })
        ));
        assert_eq!(engine.stats().stall_warnings, 0);

        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(
            engine.process_tick(),
            TickOutcome::Skipped(SkipReason::InFlight)
        );
        assert_eq!(engine.stats().stall_warnings, 1);
        engine.process_tick();
        assert_eq!(engine.stats().stall_warnings, 1);

        std::thread::sleep(Duration::from_millis(40));
        engine.process_tick();
        assert_eq!(engine.stats().stall_warnings, 2);

        handle.release();
        assert_eq!(
            engine.wait_for_inference(WAIT),
            Some(Completion::Discarded { tick: 0 })
        );
    }

    #[test]
    fn source_stats_follow_the_attached_source() {
        let (mut engine, handle, _events) = running_engine();
        assert_eq!(
            engine.source_stats().map(|s| s.name),
            Some("stub://test".to_string())
        );
        handle.push_best([None]);
        engine.run_tick_blocking(WAIT);
        let stats = engine.source_stats().unwrap();
        assert_eq!(stats.frames_captured, 1);
        assert_eq!(stats.not_ready, 0);
        engine.stop();
        assert!(engine.source_stats().is_none());
    }
}
