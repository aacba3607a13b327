//! Configuration for the camera console.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spcam_core::{ControllerConfig, SerialTransport};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CtlConfig {
    pub serial: SerialConfig,
    pub storage: StorageConfig,
    pub encoder: EncoderConfig,
    pub preview: PreviewConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device node, e.g. `/dev/ttyUSB0`.
    pub port: String,
    /// Line speed. The line is always 8N1 without flow control.
    pub baud_rate: u32,
}

/// Output directories, created on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub video_dir: PathBuf,
    pub photo_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Video fourcc: "mp4v", "avc1" or "mjpg".
    pub fourcc: String,
    pub ffmpeg_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Frames buffered for the preview consumer.
    pub capacity: usize,
    /// File kept updated with the newest live frame. Empty disables it.
    pub file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            photo_dir: PathBuf::from("photos"),
        }
    }
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            fourcc: "mp4v".into(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            capacity: spcam_core::DEFAULT_PREVIEW_CAPACITY,
            file: String::new(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Where a loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// No file at the path; defaults are in use.
    Missing,
    /// The file did not parse; defaults are in use.
    Invalid(String),
}

impl CtlConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    /// The caller logs the returned [`ConfigSource`].
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    pub fn to_controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            video_dir: self.storage.video_dir.clone(),
            photo_dir: self.storage.photo_dir.clone(),
            preview_capacity: self.preview.capacity.max(1),
            fourcc: self.encoder.fourcc.clone(),
            ffmpeg_path: self.encoder.ffmpeg_path.clone(),
            ..ControllerConfig::default()
        }
    }

    pub fn transport(&self) -> SerialTransport {
        SerialTransport::new(self.serial.port.as_str(), self.serial.baud_rate)
    }

    /// Preview file, if one is configured.
    pub fn preview_file(&self) -> Option<PathBuf> {
        let file = self.preview.file.trim();
        (!file.is_empty()).then(|| PathBuf::from(file))
    }
}

// ── Tests ────────────────────────────────────────────────────────
