//! fallguardd - camera-side fall detection daemon

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fall_guard::{
    load_backend, now_ms, open_source, record_fall, AlertLatch, BackendKind, Completion,
    DetectionEngine, EventCounter, FallGuardConfig, FpsMeter, IncidentStore, LiveStreamPublisher,
    SqliteIncidentStore,
};

#[path = "../ui.rs"]
mod ui;

const HOST_FRAME: Duration = Duration::from_millis(16);
const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML or JSON). Overrides FALLGUARD_CONFIG.
    #[arg(long, env = "FALLGUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Frame source: stub://<name> or a local image file/directory.
    #[arg(long)]
    source: Option<String>,
    /// ONNX model path. Selects the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,
    /// Stop after this many host loop iterations.
    #[arg(long)]
    ticks: Option<u64>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let mut cfg = FallGuardConfig::load_from(args.config.as_deref())?;
    if let Some(source) = args.source {
        cfg.source.url = source;
    }
    if let Some(model) = args.model {
        cfg.model.path = model;
        cfg.model.backend = BackendKind::Tract;
    }

    let mut store = {
        let stage = ui.stage("Open incident store");
        let store = SqliteIncidentStore::open(&cfg.db_path)?;
        stage.done();
        store
    };

    let events = EventCounter::new();
    let mut engine = DetectionEngine::new(cfg.detector.clone(), events.clone())?;
    {
        let stage = ui.stage("Load model");
        let input_size = cfg.detector.input_size;
        engine.load_model(|| load_backend(&cfg.model, input_size))?;
        stage.done();
    }
    {
        let stage = ui.stage("Start camera");
        engine.start(open_source(&cfg.source)?)?;
        stage.done();
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!(
        "fallguardd running (source {}, threshold {:.2}, confirm {} frames, db {})",
        cfg.source.url,
        cfg.detector.confidence_threshold,
        cfg.detector.confirm_frames,
        cfg.db_path.display()
    );

    let mut latch = AlertLatch::new(cfg.alert.hold);
    let mut publisher = LiveStreamPublisher::new(cfg.stream.interval, cfg.stream.jpeg_quality);
    let mut fps = FpsMeter::new(Instant::now());
    let mut last_health = Instant::now();
    let mut iterations: u64 = 0;

    while running.load(Ordering::SeqCst) {
        if let Some(done) = engine.poll() {
            match done {
                Completion::Applied(report) => {
                    fps.tick(Instant::now());
                    log::debug!(
                        "tick {}: best {:?} count {} ({})",
                        report.tick,
                        report.best.map(|c| c.confidence),
                        report.count,
                        report.state
                    );
                }
                Completion::Abandoned { tick, reason } => {
                    log::warn!("tick {} abandoned: {}", tick, reason);
                }
                Completion::Discarded { .. } => {}
            }
        }

        engine.process_tick();

        let now = Instant::now();
        if events.take() > 0 {
            if latch.try_raise(now) {
                let evidence = engine.snapshot_frame();
                match record_fall(
                    &mut store,
                    evidence.as_ref(),
                    cfg.alert.evidence_quality,
                    now_ms()?,
                ) {
                    Ok(item) => log::warn!("fall recorded ({})", item.id),
                    Err(err) => log::error!("failed to record fall: {:#}", err),
                }
            } else {
                log::info!("fall confirmed while alert is held; ignored");
            }
        }

        if publisher.due(now) {
            if let Some(frame) = engine.snapshot_frame() {
                if let Err(err) =
                    publisher.publish(&mut store, &frame, fps.fps(), now, now_ms()?)
                {
                    log::error!("live stream upload failed: {:#}", err);
                }
            }
        }

        if now.duration_since(last_health) >= HEALTH_INTERVAL {
            last_health = now;
            log_health(&engine, &store, fps.fps());
        }

        iterations += 1;
        if args.ticks.is_some_and(|limit| iterations >= limit) {
            log::info!("tick limit reached");
            break;
        }
        std::thread::sleep(HOST_FRAME);
    }

    engine.stop();
    log::info!("fallguardd stopped");
    Ok(())
}

fn log_health(engine: &DetectionEngine, store: &dyn IncidentStore, fps: u32) {
    let stats = engine.stats();
    let detected = store
        .fall_event()
        .ok()
        .flatten()
        .map(|event| event.detected)
        .unwrap_or(false);
    let source = engine.source_stats().unwrap_or_default();
    log::info!(
        "health: state={} fps={} counter={} dispatched={} busy={} errors={} timeouts={} stalls={} events={} source={} captured={} not_ready={} source_ok={} incident_open={}",
        engine.state(),
        fps,
        engine.counter(),
        stats.dispatched,
        stats.skipped_busy,
        stats.errors,
        stats.timeouts,
        stats.stall_warnings,
        stats.events,
        source.name,
        source.frames_captured,
        source.not_ready,
        engine.source_healthy(),
        detected
    );
}
