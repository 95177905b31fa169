//! TOML configuration file loading
//!
//! Supports `~/.config/ivr-tutor/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Call-flow limits and timings
    #[serde(default)]
    pub telephony: TelephonyFileConfig,

    #[serde(default)]
    pub pipeline: PipelineFileConfig,

    /// Published audio store
    #[serde(default)]
    pub audio: AudioFileConfig,

    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech recognition and synthesis back end
    #[serde(default)]
    pub speech: SpeechFileConfig,

    #[serde(default)]
    pub answer: AnswerFileConfig,

    /// Provider recording downloads
    #[serde(default)]
    pub recording: RecordingFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Base URL the telephony provider uses to reach this server
    pub public_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TelephonyFileConfig {
    pub min_recording_secs: Option<f64>,
    pub max_recording_secs: Option<f64>,
    pub record_max_length_secs: Option<u32>,
    pub poll_ceiling_secs: Option<u64>,
    pub poll_pause_secs: Option<u32>,
    pub gather_timeout_secs: Option<u32>,
    pub menu_timeout_secs: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PipelineFileConfig {
    /// Minimum transcription confidence (0.0 to 1.0)
    pub confidence_threshold: Option<f32>,
    /// Substrings marking demo recording references
    pub placeholder_markers: Option<Vec<String>>,
    pub max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    pub ttl_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub sample_rate: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub idle_expiry_secs: Option<u64>,
    pub cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,
    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,
    pub voice: Option<String>,
    pub speed: Option<f32>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnswerFileConfig {
    pub url: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecordingFileConfig {
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_config_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_config_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ivr-tutor/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ivr-tutor").join("config.toml"))
}
