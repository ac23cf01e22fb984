// Configuration management for camcord

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::formats::FormatPolicy;

/// Recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecorderConfig {
    /// Directory for in-flight container files. A recording writes here and
    /// the file is deleted only after the asset store confirms ingestion.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Destination directory used by the bundled library store
    #[serde(default = "default_library_dir")]
    pub library_dir: PathBuf,

    /// Audio sample rate for the output track
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,

    /// Audio channel count for the output track
    #[serde(default = "default_audio_channels")]
    pub audio_channels: u16,

    /// Runtime extension budget in seconds when the host process is about to
    /// be suspended. A save that exceeds this is abandoned at whatever point
    /// it reached.
    #[serde(default = "default_extension_budget_secs")]
    pub extension_budget_secs: u64,

    /// Format selection thresholds (tiers, frame-rate floor/ceiling, HDR)
    #[serde(default)]
    pub format_policy: FormatPolicy,
}

fn default_staging_dir() -> PathBuf {
    std::env::temp_dir().join("camcord")
}

fn default_library_dir() -> PathBuf {
    dirs::video_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("camcord")
}

fn default_audio_sample_rate() -> u32 {
    48_000
}

fn default_audio_channels() -> u16 {
    2
}

fn default_extension_budget_secs() -> u64 {
    25
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            staging_dir: default_staging_dir(),
            library_dir: default_library_dir(),
            audio_sample_rate: default_audio_sample_rate(),
            audio_channels: default_audio_channels(),
            extension_budget_secs: default_extension_budget_secs(),
            format_policy: FormatPolicy::default(),
        }
    }
}

impl RecorderConfig {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("camcord")
            .join("config.json")
    }

    /// Load config from the given path, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(path: &std::path::Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => config,
                Err(e) => {
                    log::warn!("Failed to parse config at {:?}: {}, using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Persist config as pretty-printed JSON, creating parent directories.
    pub fn save(&self, path: &std::path::Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }
}
