use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::{OutputLayout, DEFAULT_CANDIDATES};
use crate::engine::{
    EngineConfig, MissPolicy, RefirePolicy, DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_CONFIRM_FRAMES,
    DEFAULT_INFERENCE_TIMEOUT, DEFAULT_INPUT_SIZE,
};

const DEFAULT_DB_PATH: &str = "fallguard.db";
const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SOURCE_FPS: u32 = 15;
const DEFAULT_MODEL_PATH: &str = "models/fall.onnx";
const DEFAULT_NUM_CLASSES: usize = 1;
const DEFAULT_STREAM_INTERVAL_MS: u64 = 1000;
const DEFAULT_STREAM_QUALITY: u8 = 10;
const DEFAULT_ALERT_HOLD_MS: u64 = 5000;
const DEFAULT_EVIDENCE_QUALITY: u8 = 50;
const DEFAULT_MONITOR_POLL_MS: u64 = 500;
const DEFAULT_OFFLINE_AFTER_MS: u64 = 8000;
const DEFAULT_OFFLINE_CHECK_MS: u64 = 3000;
const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Deserialize, Default)]
struct FallGuardConfigFile {
    db_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
    source: Option<SourceConfigFile>,
    model: Option<ModelConfigFile>,
    stream: Option<StreamConfigFile>,
    alert: Option<AlertConfigFile>,
    monitor: Option<MonitorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    confirm_frames: Option<u32>,
    miss_policy: Option<MissPolicy>,
    refire_policy: Option<RefirePolicy>,
    max_count: Option<u32>,
    sample_interval_ms: Option<u64>,
    /// 0 disables the timeout.
    inference_timeout_ms: Option<u64>,
    target_class: Option<usize>,
    num_classes: Option<usize>,
    candidates: Option<usize>,
    layout: Option<OutputLayout>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    warmup_frames: Option<u32>,
    loop_playback: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    path: Option<PathBuf>,
    backend: Option<BackendKind>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    interval_ms: Option<u64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    hold_ms: Option<u64>,
    evidence_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    poll_ms: Option<u64>,
    offline_after_ms: Option<u64>,
    offline_check_ms: Option<u64>,
    history_limit: Option<usize>,
}

/// Inference backend selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// ONNX model through tract (feature `backend-tract`).
    Tract,
    /// Scores mean frame intensity. No model file.
    Stub,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim() {
            "tract" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!("unknown backend '{}'; expected tract or stub", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FallGuardConfig {
    pub db_path: PathBuf,
    pub detector: EngineConfig,
    pub source: SourceSettings,
    pub model: ModelSettings,
    pub stream: StreamSettings,
    pub alert: AlertSettings,
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceSettings {
    /// `stub://<name>` or a local image file/directory.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Frames reported as not ready after start.
    pub warmup_frames: u32,
    /// Image directories restart from the first image when exhausted.
    pub loop_playback: bool,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_SOURCE_URL.to_string(),
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
            fps: DEFAULT_SOURCE_FPS,
            warmup_frames: 0,
            loop_playback: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub path: PathBuf,
    pub backend: BackendKind,
    pub num_classes: usize,
    pub candidates: usize,
    pub layout: OutputLayout,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_MODEL_PATH),
            backend: BackendKind::Stub,
            num_classes: DEFAULT_NUM_CLASSES,
            candidates: DEFAULT_CANDIDATES,
            layout: OutputLayout::AttributeMajor,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub interval: Duration,
    pub jpeg_quality: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlertSettings {
    pub hold: Duration,
    pub evidence_quality: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSettings {
    pub poll: Duration,
    pub offline_after: Duration,
    pub offline_check: Duration,
    pub history_limit: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_STREAM_INTERVAL_MS),
            jpeg_quality: DEFAULT_STREAM_QUALITY,
        }
    }
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            hold: Duration::from_millis(DEFAULT_ALERT_HOLD_MS),
            evidence_quality: DEFAULT_EVIDENCE_QUALITY,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll: Duration::from_millis(DEFAULT_MONITOR_POLL_MS),
            offline_after: Duration::from_millis(DEFAULT_OFFLINE_AFTER_MS),
            offline_check: Duration::from_millis(DEFAULT_OFFLINE_CHECK_MS),
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl FallGuardConfig {
    /// Load from `FALLGUARD_CONFIG` (if set), then apply env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FALLGUARD_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Load from an explicit file (or defaults), then apply env overrides.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: FallGuardConfigFile) -> Self {
        let db_path = file
            .db_path
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let det = file.detector.unwrap_or_default();
        let inference_timeout = match det.inference_timeout_ms {
            Some(0) => None,
            Some(ms) => Some(Duration::from_millis(ms)),
            None => Some(DEFAULT_INFERENCE_TIMEOUT),
        };
        let detector = EngineConfig {
            input_size: det.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence_threshold: det
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            confirm_frames: det.confirm_frames.unwrap_or(DEFAULT_CONFIRM_FRAMES),
            miss_policy: det.miss_policy.unwrap_or_default(),
            refire_policy: det.refire_policy.unwrap_or_default(),
            max_count: det.max_count,
            sample_interval: Duration::from_millis(det.sample_interval_ms.unwrap_or(0)),
            inference_timeout,
            target_class: det.target_class.unwrap_or(0),
        };

        let source_file = file.source.unwrap_or_default();
        let source_default = SourceSettings::default();
        let source = SourceSettings {
            url: source_file.url.unwrap_or(source_default.url),
            width: source_file.width.unwrap_or(source_default.width),
            height: source_file.height.unwrap_or(source_default.height),
            fps: source_file.fps.unwrap_or(source_default.fps),
            warmup_frames: source_file
                .warmup_frames
                .unwrap_or(source_default.warmup_frames),
            loop_playback: source_file
                .loop_playback
                .unwrap_or(source_default.loop_playback),
        };

        let model_file = file.model.unwrap_or_default();
        // a model path without an explicit backend means "run that model"
        let backend = model_file.backend.unwrap_or(if model_file.path.is_some() {
            BackendKind::Tract
        } else {
            BackendKind::Stub
        });
        let model = ModelSettings {
            path: model_file
                .path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            backend,
            num_classes: det.num_classes.unwrap_or(DEFAULT_NUM_CLASSES),
            candidates: det.candidates.unwrap_or(DEFAULT_CANDIDATES),
            layout: det.layout.unwrap_or_default(),
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            interval: Duration::from_millis(
                stream_file.interval_ms.unwrap_or(DEFAULT_STREAM_INTERVAL_MS),
            ),
            jpeg_quality: stream_file.jpeg_quality.unwrap_or(DEFAULT_STREAM_QUALITY),
        };

        let alert_file = file.alert.unwrap_or_default();
        let alert = AlertSettings {
            hold: Duration::from_millis(alert_file.hold_ms.unwrap_or(DEFAULT_ALERT_HOLD_MS)),
            evidence_quality: alert_file
                .evidence_quality
                .unwrap_or(DEFAULT_EVIDENCE_QUALITY),
        };

        let monitor_file = file.monitor.unwrap_or_default();
        let monitor = MonitorSettings {
            poll: Duration::from_millis(monitor_file.poll_ms.unwrap_or(DEFAULT_MONITOR_POLL_MS)),
            offline_after: Duration::from_millis(
                monitor_file
                    .offline_after_ms
                    .unwrap_or(DEFAULT_OFFLINE_AFTER_MS),
            ),
            offline_check: Duration::from_millis(
                monitor_file
                    .offline_check_ms
                    .unwrap_or(DEFAULT_OFFLINE_CHECK_MS),
            ),
            history_limit: monitor_file.history_limit.unwrap_or(DEFAULT_HISTORY_LIMIT),
        };

        Self {
            db_path,
            detector,
            source,
            model,
            stream,
            alert,
            monitor,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = env_value("FALLGUARD_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(url) = env_value("FALLGUARD_SOURCE_URL") {
            self.source.url = url;
        }
        if let Some(path) = env_value("FALLGUARD_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
            self.model.backend = BackendKind::Tract;
        }
        if let Some(backend) = env_value("FALLGUARD_BACKEND") {
            self.model.backend = backend
                .parse()
                .map_err(|e| anyhow!("FALLGUARD_BACKEND: {}", e))?;
        }
        if let Some(threshold) = env_value("FALLGUARD_THRESHOLD") {
            self.detector.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("FALLGUARD_THRESHOLD must be a number between 0 and 1"))?;
        }
        if let Some(frames) = env_value("FALLGUARD_CONFIRM_FRAMES") {
            self.detector.confirm_frames = frames
                .parse()
                .map_err(|_| anyhow!("FALLGUARD_CONFIRM_FRAMES must be a positive integer"))?;
        }
        if let Some(policy) = env_value("FALLGUARD_MISS_POLICY") {
            self.detector.miss_policy = policy
                .parse()
                .map_err(|e| anyhow!("FALLGUARD_MISS_POLICY: {}", e))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.detector.validate()?;
        if self.model.num_classes == 0 {
            return Err(anyhow!("detector.num_classes must be >= 1"));
        }
        if self.model.candidates == 0 {
            return Err(anyhow!("detector.candidates must be >= 1"));
        }
        if self.detector.target_class >= self.model.num_classes {
            return Err(anyhow!(
                "detector.target_class {} out of range for {} classes",
                self.detector.target_class,
                self.model.num_classes
            ));
        }
        if self.source.url.trim().is_empty() {
            return Err(anyhow!("source.url must not be empty"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source dimensions must be greater than zero"));
        }
        if self.source.fps == 0 {
            return Err(anyhow!("source.fps must be greater than zero"));
        }
        validate_quality("stream.jpeg_quality", self.stream.jpeg_quality)?;
        validate_quality("alert.evidence_quality", self.alert.evidence_quality)?;
        if self.monitor.history_limit == 0 {
            return Err(anyhow!("monitor.history_limit must be >= 1"));
        }
        if self.monitor.offline_after.is_zero() || self.monitor.offline_check.is_zero() {
            return Err(anyhow!("monitor offline windows must be greater than zero"));
        }
        Ok(())
    }
}

fn validate_quality(name: &str, quality: u8) -> Result<()> {
    if !(1..=100).contains(&quality) {
        return Err(anyhow!("{} must be within 1..=100, got {}", name, quality));
    }
    Ok(())
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<FallGuardConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = FallGuardConfig::from_file(FallGuardConfigFile::default());
        assert_eq!(cfg.detector, EngineConfig::default());
        assert_eq!(cfg.model.backend, BackendKind::Stub);
        assert_eq!(cfg.stream.jpeg_quality, 10);
        assert_eq!(cfg.alert.hold, Duration::from_millis(5000));
        assert_eq!(cfg.monitor.history_limit, 20);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn model_path_implies_tract_backend() {
        let file = FallGuardConfigFile {
            model: Some(ModelConfigFile {
                path: Some(PathBuf::from("/opt/models/fall.onnx")),
                backend: None,
            }),
            ..FallGuardConfigFile::default()
        };
        assert_eq!(
            FallGuardConfig::from_file(file).model.backend,
            BackendKind::Tract
        );
    }

    #[test]
    fn zero_timeout_disables_it() {
        let file = FallGuardConfigFile {
            detector: Some(DetectorConfigFile {
                inference_timeout_ms: Some(0),
                ..DetectorConfigFile::default()
            }),
            ..FallGuardConfigFile::default()
        };
        assert_eq!(FallGuardConfig::from_file(file).detector.inference_timeout, None);
    }

    #[test]
    fn target_class_must_exist() {
        let mut cfg = FallGuardConfig::from_file(FallGuardConfigFile::default());
        cfg.detector.target_class = 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn quality_bounds() {
        assert!(validate_quality("q", 0).is_err());
        assert!(validate_quality("q", 101).is_err());
        assert!(validate_quality("q", 1).is_ok());
    }
}
