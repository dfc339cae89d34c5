use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::ExecutionDevice;

const DEFAULT_MODEL_IDENTIFIER: &str = "yolov8n.onnx";
const DEFAULT_MODEL_INPUT_SIZE: u32 = 640;
const DEFAULT_CAMERA_INDEX: u32 = 1;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
const DEFAULT_TARGET_LABEL: &str = "person";
const DEFAULT_COOLDOWN_SECS: f64 = 30.0;
const DEFAULT_SOUND_PATH: &str = "alert_sound.wav";
const DEFAULT_PLAYER: &str = "aplay";
const DEFAULT_PLAYER_ARGS: &[&str] = &["-q"];
const DEFAULT_RECONNECT_BACKOFF_SECS: u64 = 5;
const DEFAULT_WINDOW_TITLE: &str = "Live Human Detection";
const DEFAULT_SNAPSHOT_PATH: &str = "sentry_latest.jpg";

#[derive(Debug, Deserialize, Default)]
struct SentryConfigFile {
    model: Option<ModelConfigFile>,
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    alert: Option<AlertConfigFile>,
    reconnect: Option<ReconnectConfigFile>,
    display: Option<DisplayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    identifier: Option<String>,
    backend: Option<BackendKind>,
    labels_path: Option<PathBuf>,
    device: Option<ExecutionDevice>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    target_label: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct AlertConfigFile {
    cooldown_secs: Option<f64>,
    sound_path: Option<PathBuf>,
    player: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ReconnectConfigFile {
    backoff_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DisplayConfigFile {
    mode: Option<DisplayMode>,
    window_title: Option<String>,
    snapshot_path: Option<PathBuf>,
}

/// Which detector implementation to load.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ONNX model executed with tract (feature `backend-tract`).
    #[default]
    Tract,
    /// Bright-blob detector paired with `stub://` cameras.
    Stub,
}

impl std::str::FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tract" => Ok(Self::Tract),
            "stub" => Ok(Self::Stub),
            other => Err(anyhow!("unknown detector backend '{}'", other)),
        }
    }
}

/// Where annotated frames go.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// On-screen window with a `q` quit key (feature `display-opencv`).
    #[default]
    Window,
    /// Latest annotated frame written to a JPEG file.
    Snapshot,
    /// No output; stop with Ctrl-C.
    Headless,
}

impl std::str::FromStr for DisplayMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "snapshot" => Ok(Self::Snapshot),
            "headless" => Ok(Self::Headless),
            other => Err(anyhow!("unknown display mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentryConfig {
    pub model: ModelSettings,
    pub camera: CameraSettings,
    pub detection: DetectionSettings,
    pub alert: AlertSettings,
    pub reconnect: ReconnectSettings,
    pub display: DisplaySettings,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// Model file path or identifier.
    pub identifier: String,
    pub backend: BackendKind,
    /// Newline-separated class names; COCO is used when absent.
    pub labels_path: Option<PathBuf>,
    pub device: ExecutionDevice,
    /// Square model input edge in pixels.
    pub input_size: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    /// Explicit device (`/dev/video2`, `stub://porch`). Overrides `index`.
    pub device: Option<String>,
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

impl CameraSettings {
    /// Device string the source backends resolve against.
    pub fn device_path(&self) -> String {
        match &self.device {
            Some(device) => device.clone(),
            None => format!("/dev/video{}", self.index),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectionSettings {
    pub confidence_threshold: f32,
    pub target_label: String,
}

#[derive(Debug, Clone)]
pub struct AlertSettings {
    pub cooldown_secs: f64,
    /// Alert clip. `None` selects the terminal bell.
    pub sound_path: Option<PathBuf>,
    /// Player program followed by its arguments; the clip path is appended.
    pub player: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReconnectSettings {
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct DisplaySettings {
    pub mode: DisplayMode,
    pub window_title: String,
    pub snapshot_path: PathBuf,
}

impl Default for SentryConfig {
    fn default() -> Self {
        // The empty file cannot fail to resolve.
        Self::resolve(SentryConfigFile::default())
    }
}

impl SentryConfig {
    /// Defaults, then the file named by `SENTRY_CONFIG`, then `SENTRY_*`
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SENTRY_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::resolve(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit file path (used by `--config`), then apply env.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::resolve(read_config_file(path)?);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn resolve(file: SentryConfigFile) -> Self {
        let model = file.model.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        let alert = file.alert.unwrap_or_default();
        let reconnect = file.reconnect.unwrap_or_default();
        let display = file.display.unwrap_or_default();

        Self {
            model: ModelSettings {
                identifier: model
                    .identifier
                    .unwrap_or_else(|| DEFAULT_MODEL_IDENTIFIER.to_string()),
                backend: model.backend.unwrap_or_default(),
                labels_path: model.labels_path,
                device: model.device.unwrap_or_default(),
                input_size: model.input_size.unwrap_or(DEFAULT_MODEL_INPUT_SIZE),
            },
            camera: CameraSettings {
                index: camera.index.unwrap_or(DEFAULT_CAMERA_INDEX),
                device: camera.device,
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            },
            detection: DetectionSettings {
                confidence_threshold: detection
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
                target_label: detection
                    .target_label
                    .unwrap_or_else(|| DEFAULT_TARGET_LABEL.to_string()),
            },
            alert: AlertSettings {
                cooldown_secs: alert.cooldown_secs.unwrap_or(DEFAULT_COOLDOWN_SECS),
                // An empty path in the file opts into the terminal bell.
                sound_path: match alert.sound_path {
                    Some(path) if path.as_os_str().is_empty() => None,
                    Some(path) => Some(path),
                    None => Some(PathBuf::from(DEFAULT_SOUND_PATH)),
                },
                player: alert.player.unwrap_or_else(default_player),
            },
            reconnect: ReconnectSettings {
                backoff: Duration::from_secs(
                    reconnect
                        .backoff_secs
                        .unwrap_or(DEFAULT_RECONNECT_BACKOFF_SECS),
                ),
            },
            display: DisplaySettings {
                mode: display.mode.unwrap_or_default(),
                window_title: display
                    .window_title
                    .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
                snapshot_path: display
                    .snapshot_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_SNAPSHOT_PATH)),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(index) = std::env::var("SENTRY_CAMERA_INDEX") {
            self.camera.index = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTRY_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Ok(device) = std::env::var("SENTRY_CAMERA_DEVICE") {
            if !device.trim().is_empty() {
                self.camera.device = Some(device);
            }
        }
        if let Ok(model) = std::env::var("SENTRY_MODEL") {
            if !model.trim().is_empty() {
                self.model.identifier = model;
            }
        }
        if let Ok(threshold) = std::env::var("SENTRY_CONFIDENCE_THRESHOLD") {
            self.detection.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTRY_CONFIDENCE_THRESHOLD must be a number"))?;
        }
        if let Ok(cooldown) = std::env::var("SENTRY_COOLDOWN_SECS") {
            self.alert.cooldown_secs = cooldown
                .trim()
                .parse()
                .map_err(|_| anyhow!("SENTRY_COOLDOWN_SECS must be a number of seconds"))?;
        }
        if let Ok(mode) = std::env::var("SENTRY_DISPLAY") {
            if !mode.trim().is_empty() {
                self.display.mode = mode.parse()?;
            }
        }
        Ok(())
    }

    /// Reject settings the loop cannot honour. Public so CLI overrides can
    /// be re-checked after they are applied.
    pub fn validate(&mut self) -> Result<()> {
        let threshold = self.detection.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if !self.alert.cooldown_secs.is_finite() || self.alert.cooldown_secs < 0.0 {
            return Err(anyhow!("alert cooldown must be a non-negative number of seconds"));
        }
        self.detection.target_label = self.detection.target_label.trim().to_string();
        if self.detection.target_label.is_empty() {
            return Err(anyhow!("target label must not be empty"));
        }
        if self.model.identifier.trim().is_empty() {
            return Err(anyhow!("model identifier must not be empty"));
        }
        if self.model.input_size == 0 {
            return Err(anyhow!("model input size must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera resolution must be non-zero"));
        }
        if self.alert.player.is_empty() {
            return Err(anyhow!("alert player command must not be empty"));
        }
        Ok(())
    }
}

fn default_player() -> Vec<String> {
    std::iter::once(DEFAULT_PLAYER)
        .chain(DEFAULT_PLAYER_ARGS.iter().copied())
        .map(str::to_string)
        .collect()
}

fn read_config_file(path: &Path) -> Result<SentryConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let cfg = if is_json {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        toml::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_fixed_constants() {
        let cfg = SentryConfig::default();
        assert_eq!(cfg.model.identifier, "yolov8n.onnx");
        assert_eq!(cfg.camera.index, 1);
        assert_eq!(cfg.camera.device_path(), "/dev/video1");
        assert_eq!(cfg.detection.confidence_threshold, 0.5);
        assert_eq!(cfg.detection.target_label, "person");
        assert_eq!(cfg.alert.cooldown_secs, 30.0);
        assert_eq!(cfg.reconnect.backoff, Duration::from_secs(5));
        assert_eq!(cfg.alert.player, vec!["aplay", "-q"]);
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut cfg = SentryConfig::default();
        cfg.detection.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());
        cfg.detection.confidence_threshold = 0.0;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_negative_cooldown() {
        let mut cfg = SentryConfig::default();
        cfg.alert.cooldown_secs = -1.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn explicit_device_overrides_index() {
        let mut cfg = SentryConfig::default();
        cfg.camera.device = Some("stub://porch".to_string());
        assert_eq!(cfg.camera.device_path(), "stub://porch");
    }

    #[test]
    fn parses_mode_and_backend_names() {
        assert_eq!("Snapshot".parse::<DisplayMode>().unwrap(), DisplayMode::Snapshot);
        assert_eq!("stub".parse::<BackendKind>().unwrap(), BackendKind::Stub);
        assert!("gpu".parse::<BackendKind>().is_err());
    }
}
