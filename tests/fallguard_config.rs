use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use fall_guard::detect::OutputLayout;
use fall_guard::{BackendKind, FallGuardConfig, MissPolicy, RefirePolicy};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FALLGUARD_CONFIG",
        "FALLGUARD_DB_PATH",
        "FALLGUARD_SOURCE_URL",
        "FALLGUARD_MODEL_PATH",
        "FALLGUARD_BACKEND",
        "FALLGUARD_THRESHOLD",
        "FALLGUARD_CONFIRM_FRAMES",
        "FALLGUARD_MISS_POLICY",
    ] {
        std::env::remove_var(key);
    }
}

fn temp_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_toml_config_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".toml",
        r#"
        db_path = "/var/lib/fallguard/incidents.db"

        [detector]
        input_size = 320
        confidence_threshold = 0.55
        confirm_frames = 4
        miss_policy = "reset"
        refire_policy = "reset_on_fire"
        max_count = 8
        sample_interval_ms = 100
        inference_timeout_ms = 2500
        num_classes = 2
        target_class = 1
        layout = "candidate_major"

        [source]
        url = "stub://bedroom"
        width = 1280
        height = 720
        fps = 30

        [stream]
        interval_ms = 2000
        jpeg_quality = 20

        [alert]
        hold_ms = 10000

        [monitor]
        history_limit = 5
        "#,
    );

    std::env::set_var("FALLGUARD_CONFIG", file.path());
    std::env::set_var("FALLGUARD_THRESHOLD", "0.7");
    std::env::set_var("FALLGUARD_SOURCE_URL", "stub://hallway");

    let cfg = FallGuardConfig::load().expect("load config");

    assert_eq!(cfg.db_path, PathBuf::from("/var/lib/fallguard/incidents.db"));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.confidence_threshold, 0.7);
    assert_eq!(cfg.detector.confirm_frames, 4);
    assert_eq!(cfg.detector.miss_policy, MissPolicy::Reset);
    assert_eq!(cfg.detector.refire_policy, RefirePolicy::ResetOnFire);
    assert_eq!(cfg.detector.max_count, Some(8));
    assert_eq!(cfg.detector.sample_interval, Duration::from_millis(100));
    assert_eq!(
        cfg.detector.inference_timeout,
        Some(Duration::from_millis(2500))
    );
    assert_eq!(cfg.detector.target_class, 1);
    assert_eq!(cfg.model.num_classes, 2);
    assert_eq!(cfg.model.layout, OutputLayout::CandidateMajor);
    assert_eq!(cfg.model.backend, BackendKind::Stub);
    assert_eq!(cfg.source.url, "stub://hallway");
    assert_eq!((cfg.source.width, cfg.source.height), (1280, 720));
    assert_eq!(cfg.source.fps, 30);
    assert_eq!(cfg.stream.interval, Duration::from_secs(2));
    assert_eq!(cfg.stream.jpeg_quality, 20);
    assert_eq!(cfg.alert.hold, Duration::from_secs(10));
    assert_eq!(cfg.alert.evidence_quality, 50);
    assert_eq!(cfg.monitor.history_limit, 5);
    assert_eq!(cfg.monitor.offline_after, Duration::from_secs(8));

    clear_env();
}

#[test]
fn loads_json_config_with_model_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".json",
        r#"{
            "model": { "path": "/opt/models/fall.onnx" },
            "detector": { "confirm_frames": 5 }
        }"#,
    );
    std::env::set_var("FALLGUARD_MISS_POLICY", "decay");

    let cfg = FallGuardConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.model.backend, BackendKind::Tract);
    assert_eq!(cfg.model.path, PathBuf::from("/opt/models/fall.onnx"));
    assert_eq!(cfg.detector.confirm_frames, 5);
    assert_eq!(cfg.detector.miss_policy, MissPolicy::Decay);
    assert_eq!(cfg.detector.confidence_threshold, 0.65);

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FALLGUARD_THRESHOLD", "1.2");
    assert!(FallGuardConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLGUARD_CONFIRM_FRAMES", "three");
    assert!(FallGuardConfig::load().is_err());
    clear_env();

    std::env::set_var("FALLGUARD_MISS_POLICY", "sometimes");
    assert!(FallGuardConfig::load().is_err());
    clear_env();

    let file = temp_config(".toml", "[stream]\njpeg_quality = 0\n");
    assert!(FallGuardConfig::load_from(Some(file.path())).is_err());

    let file = temp_config(".toml", "[detector]\nconfirm_frames = 4\nmax_count = 2\n");
    assert!(FallGuardConfig::load_from(Some(file.path())).is_err());

    let file = temp_config(".json", "{ not json");
    assert!(FallGuardConfig::load_from(Some(file.path())).is_err());

    clear_env();
}

#[test]
fn defaults_without_any_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = FallGuardConfig::load().expect("defaults load");
    assert_eq!(cfg.detector.input_size, 640);
    assert_eq!(cfg.detector.confirm_frames, 3);
    assert_eq!(cfg.source.url, "stub://camera");
    assert_eq!(cfg.model.backend, BackendKind::Stub);
    assert_eq!(cfg.stream.interval, Duration::from_secs(1));
    assert_eq!(cfg.monitor.offline_check, Duration::from_secs(3));
}
