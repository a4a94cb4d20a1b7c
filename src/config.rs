use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::capture::VideoTrackConstraints;

const DEFAULT_CAMERA_WIDTH: u32 = 1280;
const DEFAULT_CAMERA_HEIGHT: u32 = 720;
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_SCREEN_WIDTH: u32 = 1280;
const DEFAULT_SCREEN_HEIGHT: u32 = 720;
const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    camera: Option<CameraConfigFile>,
    screen: Option<ScreenConfigFile>,
    raw_file: Option<RawFileConfigFile>,
    latch: Option<LatchConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    front_facing: Option<bool>,
    capture_to_texture: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct ScreenConfigFile {
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct RawFileConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct LatchConfigFile {
    timeout_ms: Option<u64>,
}

/// Capture settings resolved from the config file and environment.
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub camera: VideoTrackConstraints,
    pub screen: ScreenSettings,
    pub raw_file: Option<PathBuf>,
    /// Default wait for asynchronous callbacks.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenSettings {
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self::from_file(CaptureConfigFile::default())
    }
}

impl CaptureConfig {
    /// Load from `RTC_CAPTURE_CONFIG` (JSON, or TOML for `.toml` files), then
    /// apply `RTC_CAPTURE_*` overrides.
    pub fn load() -> Result<Self> {
        let file_cfg = match std::env::var("RTC_CAPTURE_CONFIG").ok().as_deref() {
            Some(path) if !path.trim().is_empty() => read_config_file(Path::new(path))?,
            _ => CaptureConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CaptureConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let screen = file.screen.unwrap_or_default();
        Self {
            camera: VideoTrackConstraints {
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
                fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
                front_facing: camera.front_facing.unwrap_or(true),
                capture_to_texture: camera.capture_to_texture.unwrap_or(true),
            },
            screen: ScreenSettings {
                width: screen.width.unwrap_or(DEFAULT_SCREEN_WIDTH),
                height: screen.height.unwrap_or(DEFAULT_SCREEN_HEIGHT),
            },
            raw_file: file.raw_file.and_then(|raw| raw.path),
            timeout: Duration::from_millis(
                file.latch
                    .and_then(|latch| latch.timeout_ms)
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(width) = env_parse::<u32>("RTC_CAPTURE_CAMERA_WIDTH")? {
            self.camera.width = width;
        }
        if let Some(height) = env_parse::<u32>("RTC_CAPTURE_CAMERA_HEIGHT")? {
            self.camera.height = height;
        }
        if let Some(fps) = env_parse::<u32>("RTC_CAPTURE_CAMERA_FPS")? {
            self.camera.fps = fps;
        }
        if let Ok(path) = std::env::var("RTC_CAPTURE_RAW_FILE") {
            if !path.trim().is_empty() {
                self.raw_file = Some(PathBuf::from(path));
            }
        }
        if let Some(millis) = env_parse::<u64>("RTC_CAPTURE_TIMEOUT_MS")? {
            self.timeout = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(anyhow!(
                "camera width, height and fps must be greater than zero"
            ));
        }
        if self.screen.width == 0 || self.screen.height == 0 {
            return Err(anyhow!("screen width and height must be greater than zero"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("latch timeout must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<CaptureConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

/// Parse `key` as a non-negative integer. Unset or blank values are skipped.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("{} must be a non-negative integer", key)),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_capture_settings() {
        let cfg = CaptureConfig::default();
        assert_eq!((cfg.camera.width, cfg.camera.height, cfg.camera.fps), (1280, 720, 30));
        assert!(cfg.camera.front_facing);
        assert_eq!(cfg.timeout, Duration::from_secs(5));
        assert!(cfg.raw_file.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_camera_fps_is_invalid() {
        let mut cfg = CaptureConfig::default();
        cfg.camera.fps = 0;
        assert!(cfg.validate().is_err());
    }
}
