use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::counter::{CurlThresholds, DEFAULT_DOWN_ABOVE_DEG, DEFAULT_UP_BELOW_DEG};
use crate::pose::Arm;
use crate::session::SessionConfig;

const DEFAULT_SOURCE_URL: &str = "stub://camera";
const DEFAULT_TARGET_FPS: u32 = 15;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8790";
const DEFAULT_BACKEND: &str = "scripted";
const DEFAULT_SCORE_THRESHOLD: f32 = 0.3;
const DEFAULT_MODEL_SIZE: u32 = 192;
const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CounterConfigFile {
    source: Option<SourceConfigFile>,
    api: Option<ApiConfigFile>,
    counter: Option<CounterSectionFile>,
    backend: Option<BackendConfigFile>,
    stream: Option<StreamConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    addr: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CounterSectionFile {
    arm: Option<String>,
    down_above: Option<f64>,
    up_below: Option<f64>,
    min_visibility: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct BackendConfigFile {
    name: Option<String>,
    model_path: Option<PathBuf>,
    model_width: Option<u32>,
    model_height: Option<u32>,
    score_threshold: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    enabled: Option<bool>,
    jpeg_quality: Option<u8>,
}

/// Resolved `curld` configuration.
#[derive(Debug, Clone)]
pub struct CounterConfig {
    pub source: SourceSettings,
    pub api_addr: String,
    pub counter: CounterSettings,
    pub backend: BackendSettings,
    pub stream: StreamSettings,
}

#[derive(Debug, Clone)]
pub struct SourceSettings {
    pub url: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct CounterSettings {
    pub arm: Arm,
    pub down_above: f64,
    pub up_below: f64,
    pub min_visibility: f32,
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub name: String,
    pub model_path: Option<PathBuf>,
    pub model_width: u32,
    pub model_height: u32,
    pub score_threshold: f32,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub enabled: bool,
    pub jpeg_quality: u8,
}

impl CounterConfig {
    /// Defaults, then the file named by `CURL_CONFIG`, then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CURL_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from an explicit path, still applying env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: CounterConfigFile) -> Result<Self> {
        let source_file = file.source.unwrap_or_default();
        let source = SourceSettings {
            url: source_file
                .url
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            target_fps: source_file.target_fps.unwrap_or(DEFAULT_TARGET_FPS),
            width: source_file.width.unwrap_or(DEFAULT_WIDTH),
            height: source_file.height.unwrap_or(DEFAULT_HEIGHT),
        };
        let api_addr = file
            .api
            .and_then(|api| api.addr)
            .unwrap_or_else(|| DEFAULT_API_ADDR.to_string());

        let counter_file = file.counter.unwrap_or_default();
        let arm = match counter_file.arm.as_deref() {
            Some(arm) => arm.parse()?,
            None => Arm::default(),
        };
        let counter = CounterSettings {
            arm,
            down_above: counter_file.down_above.unwrap_or(DEFAULT_DOWN_ABOVE_DEG),
            up_below: counter_file.up_below.unwrap_or(DEFAULT_UP_BELOW_DEG),
            min_visibility: counter_file.min_visibility.unwrap_or(0.0),
        };

        let backend_file = file.backend.unwrap_or_default();
        let backend = BackendSettings {
            name: backend_file
                .name
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: backend_file.model_path,
            model_width: backend_file.model_width.unwrap_or(DEFAULT_MODEL_SIZE),
            model_height: backend_file.model_height.unwrap_or(DEFAULT_MODEL_SIZE),
            score_threshold: backend_file
                .score_threshold
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            enabled: stream_file.enabled.unwrap_or(true),
            jpeg_quality: stream_file.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
        };

        Ok(Self {
            source,
            api_addr,
            counter,
            backend,
            stream,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CURL_SOURCE") {
            if !url.trim().is_empty() {
                self.source.url = url;
            }
        }
        if let Ok(addr) = std::env::var("CURL_API_ADDR") {
            if !addr.trim().is_empty() {
                self.api_addr = addr;
            }
        }
        if let Ok(name) = std::env::var("CURL_BACKEND") {
            if !name.trim().is_empty() {
                self.backend.name = name.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("CURL_MODEL_PATH") {
            if !path.trim().is_empty() {
                self.backend.model_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(arm) = std::env::var("CURL_ARM") {
            if !arm.trim().is_empty() {
                self.counter.arm = arm.parse()?;
            }
        }
        if let Ok(fps) = std::env::var("CURL_TARGET_FPS") {
            self.source.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("CURL_TARGET_FPS must be a positive integer"))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.target_fps == 0 {
            return Err(anyhow!("source.target_fps must be greater than zero"));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be non-zero"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!(
                "stream.jpeg_quality must be within 1..=100 (got {})",
                self.stream.jpeg_quality
            ));
        }
        if !(0.0..=1.0).contains(&self.backend.score_threshold) {
            return Err(anyhow!("backend.score_threshold must be within [0, 1]"));
        }
        self.session_config().validate()?;
        Ok(())
    }

    pub fn thresholds(&self) -> CurlThresholds {
        CurlThresholds {
            down_above: self.counter.down_above,
            up_below: self.counter.up_below,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            arm: self.counter.arm,
            thresholds: self.thresholds(),
            min_visibility: self.counter.min_visibility,
        }
    }
}

fn read_config_file(path: &Path) -> Result<CounterConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
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
    fn defaults_are_valid() {
        let cfg = CounterConfig::from_file(CounterConfigFile::default()).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.source.url, DEFAULT_SOURCE_URL);
        assert_eq!(cfg.counter.arm, Arm::Left);
        assert_eq!(cfg.thresholds(), CurlThresholds::default());
        assert_eq!(cfg.backend.name, "scripted");
        assert!(cfg.stream.enabled);
    }

    #[test]
    fn inverted_thresholds_fail_validation() {
        let file = CounterConfigFile {
            counter: Some(CounterSectionFile {
                down_above: Some(40.0),
                up_below: Some(50.0),
                ..CounterSectionFile::default()
            }),
            ..CounterConfigFile::default()
        };
        let cfg = CounterConfig::from_file(file).unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_arm_is_rejected() {
        let file = CounterConfigFile {
            counter: Some(CounterSectionFile {
                arm: Some("tail".to_string()),
                ..CounterSectionFile::default()
            }),
            ..CounterConfigFile::default()
        };
        assert!(CounterConfig::from_file(file).is_err());
    }

    #[test]
    fn zero_quality_fails_validation() {
        let file = CounterConfigFile {
            stream: Some(StreamConfigFile {
                enabled: Some(true),
                jpeg_quality: Some(0),
            }),
            ..CounterConfigFile::default()
        };
        let cfg = CounterConfig::from_file(file).unwrap();
        assert!(cfg.validate().is_err());
    }
}
