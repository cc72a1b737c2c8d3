use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use fall_guard::detect::{
    OutputLayout, OutputShape, ScriptHandle, ScriptStep, ScriptedBackend, StubBackend,
    DEFAULT_CANDIDATES,
};
use fall_guard::ingest::{SourceStats, SyntheticSource};
use fall_guard::{
    load_backend, BackendKind, Completion, DetectionEngine, EngineConfig, EngineError,
    EngineState, EventCounter, Frame, FrameSource, ModelSettings, SkipReason, TickOutcome,
    TickReport,
};

const WAIT: Duration = Duration::from_secs(5);

fn config(input_size: u32) -> EngineConfig {
    EngineConfig {
        input_size,
        ..EngineConfig::default()
    }
}

fn scripted_engine(cfg: EngineConfig) -> (DetectionEngine, ScriptHandle, EventCounter) {
    let events = EventCounter::new();
    let mut engine = DetectionEngine::new(cfg, events.clone()).expect("valid config");
    let (backend, handle) = ScriptedBackend::new(OutputShape::new(
        DEFAULT_CANDIDATES,
        1,
        OutputLayout::AttributeMajor,
    ));
    engine
        .load_model(|| Ok(Box::new(backend)))
        .expect("scripted backend loads");
    engine
        .start(Box::new(SyntheticSource::always_ready(20, 16)))
        .expect("engine starts");
    (engine, handle, events)
}

fn applied(engine: &mut DetectionEngine) -> TickReport {
    let (outcome, done) = engine.run_tick_blocking(WAIT);
    assert!(outcome.dispatched(), "tick skipped: {:?}", outcome);
    match done {
        Some(Completion::Applied(report)) => report,
        other => panic!("expected applied tick, got {:?}", other),
    }
}

/// Source that only ever shows black frames.
struct BlackSource {
    size: u32,
    stats: SourceStats,
}

impl FrameSource for BlackSource {
    fn name(&self) -> &str {
        "black"
    }

    fn current_frame(&mut self) -> Result<Option<Frame>> {
        self.stats.frames_captured += 1;
        Ok(Some(Frame::black(self.size, self.size)?))
    }

    fn stats(&self) -> SourceStats {
        self.stats.clone()
    }
}

#[test]
fn confidence_trajectory_fires_on_fifth_frame() {
    let (mut engine, handle, events) = scripted_engine(config(16));
    handle.push_best([Some(0.70), Some(0.80), None, Some(0.90), Some(0.95)]);

    let reports: Vec<TickReport> = (0..5).map(|_| applied(&mut engine)).collect();
    let counts: Vec<u32> = reports.iter().map(|r| r.count).collect();
    let fired: Vec<bool> = reports.iter().map(|r| r.fired).collect();

    assert_eq!(counts, vec![1, 2, 1, 2, 3]);
    assert_eq!(fired, vec![false, false, false, false, true]);
    assert_eq!(events.total(), 1);
    assert_eq!(engine.state(), EngineState::EpisodeActive);
    assert_eq!(reports[2].best, None);
    assert_eq!(reports[4].best.map(|c| c.confidence), Some(0.95));
}

#[test]
fn best_candidate_is_highest_score_then_lowest_index() {
    let (mut engine, handle, _events) = scripted_engine(config(16));
    handle.push(ScriptStep::Scores(vec![(120, 0.81), (8000, 0.93)]));
    handle.push(ScriptStep::Scores(vec![(6000, 0.88), (42, 0.88)]));
    handle.push(ScriptStep::Scores(vec![(3, 0.64), (4, 0.6499)]));

    let first = applied(&mut engine);
    assert_eq!(first.best.map(|c| c.index), Some(8000));
    assert_eq!(first.qualifying, 2);

    let second = applied(&mut engine);
    assert_eq!(second.best.map(|c| c.index), Some(42));

    let third = applied(&mut engine);
    assert_eq!(third.best, None);
    assert_eq!(third.qualifying, 0);
}

#[test]
fn tick_during_inference_is_skipped_without_side_effects() {
    let (mut engine, handle, events) = scripted_engine(config(16));
    handle.hold();
    handle.push_best([Some(0.9)]);

    assert!(engine.process_tick().dispatched());
    assert!(handle.wait_until_parked(WAIT));
    let built = engine.stats().tensors_built;

    for _ in 0..3 {
        assert_eq!(
            engine.process_tick(),
            TickOutcome::Skipped(SkipReason::InFlight)
        );
    }
    assert_eq!(engine.stats().tensors_built, built);
    assert_eq!(engine.stats().skipped_busy, 3);
    assert_eq!(engine.counter(), 0);
    assert!(engine.poll().is_none());

    handle.release();
    match engine.wait_for_inference(WAIT) {
        Some(Completion::Applied(report)) => assert_eq!(report.count, 1),
        other => panic!("expected applied tick, got {:?}", other),
    }
    assert_eq!(handle.calls(), 1);
    assert_eq!(events.total(), 0);
}

#[test]
fn results_after_stop_are_never_applied() {
    let cfg = EngineConfig {
        confirm_frames: 1,
        ..config(16)
    };
    let (mut engine, handle, events) = scripted_engine(cfg);
    handle.hold();
    handle.push_best([Some(0.99)]);

    assert!(engine.process_tick().dispatched());
    assert!(handle.wait_until_parked(WAIT));
    engine.stop();
    handle.release();

    std::thread::sleep(Duration::from_millis(50));
    assert!(engine.poll().is_none());
    assert!(engine.wait_for_inference(Duration::from_millis(50)).is_none());
    assert_eq!(engine.state(), EngineState::Stopped);
    assert_eq!(engine.counter(), 0);
    assert_eq!(events.total(), 0);
    assert_eq!(
        engine.process_tick(),
        TickOutcome::Skipped(SkipReason::NotRunning)
    );
}

#[test]
fn model_load_failure_is_fatal() {
    let events = EventCounter::new();
    let mut engine = DetectionEngine::new(config(640), events).expect("valid config");
    let settings = ModelSettings {
        path: PathBuf::from("/nonexistent/fall.onnx"),
        backend: BackendKind::Tract,
        ..ModelSettings::default()
    };

    let err = engine
        .load_model(|| load_backend(&settings, 640))
        .expect_err("missing model must fail");
    assert!(matches!(err, EngineError::ModelLoad(_)));
    assert_eq!(engine.state(), EngineState::Idle);

    let start = engine.start(Box::new(SyntheticSource::always_ready(8, 8)));
    assert!(matches!(
        start,
        Err(EngineError::InvalidState {
            expected: EngineState::Ready,
            actual: EngineState::Idle
        })
    ));
}

#[test]
fn warm_up_failure_is_fatal() {
    struct ColdBackend;

    impl fall_guard::InferenceBackend for ColdBackend {
        fn name(&self) -> &'static str {
            "cold"
        }

        fn run(&mut self, _input: &fall_guard::InputTensor) -> Result<fall_guard::RawOutput> {
            anyhow::bail!("never warmed")
        }

        fn warm_up(&mut self) -> Result<()> {
            anyhow::bail!("accelerator unavailable")
        }
    }

    let mut engine = DetectionEngine::new(config(16), || {}).expect("valid config");
    let err = engine
        .load_model(|| Ok(Box::new(ColdBackend)))
        .expect_err("warm-up failure must surface");
    assert!(err.to_string().contains("accelerator unavailable"));
    assert_eq!(engine.state(), EngineState::Idle);
}

#[test]
fn all_zero_frames_decay_without_firing() {
    let events = EventCounter::new();
    let mut engine = DetectionEngine::new(config(640), events.clone()).expect("valid config");
    engine
        .load_model(|| Ok(Box::new(StubBackend::new())))
        .expect("stub loads");
    engine
        .start(Box::new(BlackSource {
            size: 640,
            stats: SourceStats::default(),
        }))
        .expect("engine starts");

    for _ in 0..4 {
        let report = applied(&mut engine);
        assert_eq!(report.best, None);
        assert_eq!(report.count, 0);
        assert!(!report.fired);
    }
    assert_eq!(events.total(), 0);
    assert_eq!(engine.state(), EngineState::Running);
}

#[test]
fn source_warmup_skips_ticks_until_ready() {
    let (mut engine, _handle, _events) = {
        let events = EventCounter::new();
        let mut engine = DetectionEngine::new(config(16), events.clone()).expect("valid config");
        let (backend, handle) =
            ScriptedBackend::new(OutputShape::new(16, 1, OutputLayout::AttributeMajor));
        engine
            .load_model(|| Ok(Box::new(backend)))
            .expect("scripted backend loads");
        engine
            .start(Box::new(SyntheticSource::always_ready(16, 16).with_warmup(2)))
            .expect("engine starts");
        (engine, handle, events)
    };

    assert_eq!(
        engine.process_tick(),
        TickOutcome::Skipped(SkipReason::NoFrame)
    );
    assert_eq!(
        engine.process_tick(),
        TickOutcome::Skipped(SkipReason::NoFrame)
    );
    assert_eq!(engine.stats().tensors_built, 0);
    assert!(engine.process_tick().dispatched());
}

#[test]
fn synthetic_scene_with_stub_backend_detects_the_bright_phase() {
    let events = EventCounter::new();
    let mut engine = DetectionEngine::new(config(32), events.clone()).expect("valid config");
    engine
        .load_model(|| Ok(Box::new(StubBackend::new())))
        .expect("stub loads");
    engine
        .start(Box::new(SyntheticSource::always_ready(64, 48)))
        .expect("engine starts");

    let mut fired_on = Vec::new();
    for _ in 0..60 {
        let report = applied(&mut engine);
        if report.fired {
            fired_on.push(report.tick);
        }
    }
    // dark phase is 45 frames; the third bright frame confirms
    assert_eq!(fired_on, vec![47]);
    assert_eq!(events.total(), 1);
}
