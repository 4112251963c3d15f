use std::path::Path;
use serde::{Deserialize, Serialize};

use crate::{
    composition::OverlapPolicy,
    error::{ConfigError, Result},
    video::{VideoParams, DEFAULT_INSERT_DURATION},
};

/// Main configuration for the insert compositor
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// How insert requests are interpreted
    #[serde(default)]
    pub insert: InsertConfig,

    /// How the result is encoded
    #[serde(default)]
    pub encoding: EncodingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.insert.validate()?;
        self.encoding.validate()?;
        Ok(())
    }
}

fn invalid<K: Into<String>, V: ToString>(key: K, value: V) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.to_string(),
    }
}

/// Insert request configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InsertConfig {
    /// Seconds an insert is shown when the caller gives no duration
    pub default_duration: f64,

    /// What happens when an insert starts before the previous one ended
    pub overlap: OverlapPolicy,
}

impl Default for InsertConfig {
    fn default() -> Self {
        Self {
            default_duration: DEFAULT_INSERT_DURATION,
            overlap: OverlapPolicy::default(),
        }
    }
}

impl InsertConfig {
    fn validate(&self) -> Result<()> {
        if !self.default_duration.is_finite() || self.default_duration <= 0.0 {
            return Err(invalid("insert.default_duration", self.default_duration).into());
        }
        Ok(())
    }
}

/// Encoder configuration for the ffmpeg backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// ffmpeg executable
    pub ffmpeg: String,

    /// ffprobe executable
    pub ffprobe: String,

    /// Encoder threads
    pub threads: usize,

    /// Codec and geometry settings
    pub params: VideoParams,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            threads: num_cpus::get(),
            params: VideoParams::default(),
        }
    }
}

impl EncodingConfig {
    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("encoding.ffmpeg", &self.ffmpeg),
            ("encoding.ffprobe", &self.ffprobe),
            ("encoding.params.codec", &self.params.codec),
            ("encoding.params.audio_codec", &self.params.audio_codec),
            ("encoding.params.preset", &self.params.preset),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(key, "<empty>").into());
            }
        }

        if self.threads == 0 {
            return Err(invalid("encoding.threads", self.threads).into());
        }

        if self.params.quality > 100 {
            return Err(invalid("encoding.params.quality", self.params.quality).into());
        }

        if let Some(fps) = self.params.fps {
            if !fps.is_finite() || fps <= 0.0 {
                return Err(invalid("encoding.params.fps", fps).into());
            }
        }

        if let Some((width, height)) = self.params.resolution {
            if width == 0 || height == 0 {
                return Err(invalid("encoding.params.resolution", format!("{}x{}", width, height)).into());
            }
        }

        Ok(())
    }
}
