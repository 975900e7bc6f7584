//! TOML configuration file loading
//!
//! Supports `~/.config/inocencio/config.toml` as a persistent config source.
//! Every field is optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct InocencioConfigFile {
    /// Remote voice API
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Wake-word detection
    #[serde(default)]
    pub wake: WakeFileConfig,

    /// Question capture
    #[serde(default)]
    pub capture: CaptureFileConfig,

    /// Transcription backend for the built-in wake-word engine
    #[serde(default)]
    pub stt: SttFileConfig,

    /// Session timing and presentation
    #[serde(default)]
    pub session: SessionFileConfig,
}

/// Voice API configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL (e.g. "http://127.0.0.1:8000")
    pub base_url: Option<String>,

    /// Request timeout for `POST /voice`
    pub request_timeout_ms: Option<u64>,

    /// Timeout for the startup liveness probe
    pub probe_timeout_ms: Option<u64>,

    /// Probe mode: "check" or "tts"
    pub probe: Option<String>,
}

/// Wake-word configuration
#[derive(Debug, Default, Deserialize)]
pub struct WakeFileConfig {
    /// Wake phrases (matched with prefix/suffix wildcards)
    pub phrases: Option<Vec<String>>,

    /// Exact command phrases that also wake the assistant
    pub command_phrases: Option<Vec<String>>,

    /// Recognition language (e.g. "pt-BR")
    pub language: Option<String>,

    /// Restart a silent recognizer session after this long
    pub fallback_restart_ms: Option<u64>,

    /// Delay before restarting after a session ends
    pub restart_delay_ms: Option<u64>,

    /// Delay before restarting after a recognizer error
    pub error_restart_delay_ms: Option<u64>,

    /// "ignore" or "hint"
    pub retrigger: Option<String>,
}

/// Question capture configuration
#[derive(Debug, Default, Deserialize)]
pub struct CaptureFileConfig {
    pub min_duration_ms: Option<u64>,
    pub max_duration_ms: Option<u64>,
    pub silence_window_ms: Option<u64>,
    pub silence_threshold: Option<f32>,
    pub level_window: Option<usize>,
    pub frame_interval_ms: Option<u64>,
    pub start_delay_ms: Option<u64>,
}

/// Transcription backend configuration
#[derive(Debug, Default, Deserialize)]
pub struct SttFileConfig {
    /// OpenAI-compatible base URL
    pub base_url: Option<String>,

    /// API key (prefer `OPENAI_API_KEY`)
    pub api_key: Option<String>,

    /// Model identifier (e.g. "whisper-1")
    pub model: Option<String>,
}

/// Session timing and presentation configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub resume_delay_ms: Option<u64>,
    pub error_recovery_ms: Option<u64>,
    pub phrase_rotation_ms: Option<u64>,

    /// "friendly" or "technical"
    pub messages: Option<String>,

    /// Log a session snapshot on every transition
    pub debug: Option<bool>,
}

/// Load the TOML config file
///
/// Uses `path` when given, otherwise the standard location. Returns
/// `InocencioConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file(path: Option<&Path>) -> InocencioConfigFile {
    let Some(path) = path.map(Path::to_path_buf).or_else(config_file_path) else {
        return InocencioConfigFile::default();
    };

    if !path.exists() {
        return InocencioConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
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
                InocencioConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            InocencioConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/inocencio/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("inocencio").join("config.toml"))
}
