//! Configuration management for the receptionist

pub mod file;

use std::path::Path;
use std::time::Duration;

use crate::{Error, Result};

use file::InocencioConfigFile;

/// Default voice API base URL
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";

/// Default OpenAI-compatible transcription base URL
pub const DEFAULT_STT_URL: &str = "https://api.openai.com/v1";

/// Default wake phrases
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["inocêncio", "inocencio", "hey inocêncio", "oi inocêncio"];

/// Phrases that wake the assistant when spoken on their own
pub const DEFAULT_COMMAND_PHRASES: &[&str] = &["ativar sistema", "acordar", "começar"];

/// Receptionist configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Voice API configuration
    pub api: ApiConfig,

    /// Wake-word configuration
    pub wake: WakeConfig,

    /// Question capture configuration
    pub capture: CaptureConfig,

    /// Transcription backend for the built-in wake-word engine
    pub stt: SttConfig,

    /// Session timing and presentation
    pub session: SessionConfig,
}

/// Voice API configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL, without trailing slash
    pub base_url: String,

    /// Timeout for `POST /voice`
    pub request_timeout: Duration,

    /// Timeout for the liveness probe
    pub probe_timeout: Duration,

    /// Which endpoint the liveness probe hits
    pub probe: ProbeMode,
}

/// Liveness probe endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeMode {
    /// `GET /check`
    #[default]
    Check,
    /// `GET /tts?text=...`
    Tts,
}

impl ProbeMode {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "check" => Some(Self::Check),
            "tts" => Some(Self::Tts),
            _ => None,
        }
    }
}

/// Wake-word configuration
#[derive(Debug, Clone)]
pub struct WakeConfig {
    /// Wake phrases, matched anywhere in a transcript
    pub phrases: Vec<String>,

    /// Command phrases, matched as whole transcripts
    pub command_phrases: Vec<String>,

    /// Recognition language (BCP-47, e.g. "pt-BR")
    pub language: String,

    /// Force a restart when a session produced nothing for this long
    pub fallback_restart: Duration,

    /// Delay before restarting after a session ends or is aborted
    pub restart_delay: Duration,

    /// Delay before restarting after a recoverable recognizer error
    pub error_restart_delay: Duration,

    /// What to do with wake words heard while busy
    pub retrigger: RetriggerPolicy,
}

/// Handling of wake words that arrive while the assistant is busy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetriggerPolicy {
    /// Drop silently
    Ignore,
    /// Drop, but show a short hint
    #[default]
    Hint,
}

impl RetriggerPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ignore" => Some(Self::Ignore),
            "hint" => Some(Self::Hint),
            _ => None,
        }
    }
}

/// Question capture configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Never stop before this much audio is captured
    pub min_duration: Duration,

    /// Always stop once this much audio is captured
    pub max_duration: Duration,

    /// Continuous sub-threshold signal needed to end a question
    pub silence_window: Duration,

    /// RMS level below which a frame counts as silence
    pub silence_threshold: f32,

    /// Frames averaged into the rolling level
    pub level_window: usize,

    /// Amplitude polling interval
    pub frame_interval: Duration,

    /// Delay between wake word and capture start
    pub start_delay: Duration,
}

/// Transcription backend configuration
#[derive(Debug, Clone)]
pub struct SttConfig {
    /// OpenAI-compatible base URL
    pub base_url: String,

    /// Bearer token
    pub api_key: Option<String>,

    /// Model identifier
    pub model: String,
}

/// User-facing message style
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageStyle {
    /// Category-based messages, no technical detail
    #[default]
    Friendly,
    /// Include the underlying error text
    Technical,
}

impl MessageStyle {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "friendly" => Some(Self::Friendly),
            "technical" => Some(Self::Technical),
            _ => None,
        }
    }
}

/// Session timing and presentation
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pause after speaking before listening for the wake word again
    pub resume_delay: Duration,

    /// Time spent in the error phase before recovering
    pub error_recovery: Duration,

    /// Idle phrase rotation interval
    pub phrase_rotation: Duration,

    /// User-facing message style
    pub messages: MessageStyle,

    /// Emit a session snapshot on every transition
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_API_URL.to_string(),
                request_timeout: Duration::from_secs(30),
                probe_timeout: Duration::from_secs(5),
                probe: ProbeMode::Check,
            },
            wake: WakeConfig {
                phrases: DEFAULT_WAKE_PHRASES.iter().map(ToString::to_string).collect(),
                command_phrases: DEFAULT_COMMAND_PHRASES
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
                language: "pt-BR".to_string(),
                fallback_restart: Duration::from_secs(30),
                restart_delay: Duration::from_secs(1),
                error_restart_delay: Duration::from_secs(2),
                retrigger: RetriggerPolicy::Hint,
            },
            capture: CaptureConfig {
                min_duration: Duration::from_millis(1000),
                max_duration: Duration::from_millis(10_000),
                silence_window: Duration::from_millis(2000),
                silence_threshold: 0.01,
                level_window: 8,
                frame_interval: Duration::from_millis(50),
                start_delay: Duration::from_millis(800),
            },
            stt: SttConfig {
                base_url: DEFAULT_STT_URL.to_string(),
                api_key: None,
                model: "whisper-1".to_string(),
            },
            session: SessionConfig {
                resume_delay: Duration::from_secs(2),
                error_recovery: Duration::from_secs(5),
                phrase_rotation: Duration::from_secs(6),
                messages: MessageStyle::Friendly,
                debug: false,
            },
        }
    }
}

impl Config {
    /// Load configuration from the process environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if the merged configuration is invalid
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc = file::load_config_file(path);
        let config = Self::from_sources(fc, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge a parsed config file and an environment lookup (env > toml > default)
    #[must_use]
    pub fn from_sources(fc: InocencioConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        let env_list = |key: &str| {
            env(key).map(|s| {
                s.split(',')
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect::<Vec<_>>()
            })
        };
        let millis = |ms: Option<u64>, fallback: Duration| ms.map_or(fallback, Duration::from_millis);

        let api = ApiConfig {
            base_url: env("INOCENCIO_API_URL")
                .or(fc.api.base_url)
                .map_or(default.api.base_url, |u| u.trim_end_matches('/').to_string()),
            request_timeout: millis(fc.api.request_timeout_ms, default.api.request_timeout),
            probe_timeout: millis(fc.api.probe_timeout_ms, default.api.probe_timeout),
            probe: choice("api.probe", fc.api.probe.as_deref(), ProbeMode::parse)
                .unwrap_or(default.api.probe),
        };

        let wake = WakeConfig {
            phrases: env_list("INOCENCIO_WAKE_WORDS")
                .or(fc.wake.phrases)
                .unwrap_or(default.wake.phrases),
            command_phrases: fc
                .wake
                .command_phrases
                .unwrap_or(default.wake.command_phrases),
            language: env("INOCENCIO_LANGUAGE")
                .or(fc.wake.language)
                .unwrap_or(default.wake.language),
            fallback_restart: millis(fc.wake.fallback_restart_ms, default.wake.fallback_restart),
            restart_delay: millis(fc.wake.restart_delay_ms, default.wake.restart_delay),
            error_restart_delay: millis(
                fc.wake.error_restart_delay_ms,
                default.wake.error_restart_delay,
            ),
            retrigger: choice(
                "wake.retrigger",
                fc.wake.retrigger.as_deref(),
                RetriggerPolicy::parse,
            )
            .unwrap_or(default.wake.retrigger),
        };

        let capture = CaptureConfig {
            min_duration: millis(fc.capture.min_duration_ms, default.capture.min_duration),
            max_duration: millis(fc.capture.max_duration_ms, default.capture.max_duration),
            silence_window: millis(fc.capture.silence_window_ms, default.capture.silence_window),
            silence_threshold: fc
                .capture
                .silence_threshold
                .unwrap_or(default.capture.silence_threshold),
            level_window: fc.capture.level_window.unwrap_or(default.capture.level_window),
            frame_interval: millis(fc.capture.frame_interval_ms, default.capture.frame_interval),
            start_delay: millis(fc.capture.start_delay_ms, default.capture.start_delay),
        };

        let stt = SttConfig {
            base_url: env("INOCENCIO_STT_URL")
                .or(fc.stt.base_url)
                .map_or(default.stt.base_url, |u| u.trim_end_matches('/').to_string()),
            api_key: env("OPENAI_API_KEY").or(fc.stt.api_key),
            model: fc.stt.model.unwrap_or(default.stt.model),
        };

        let session = SessionConfig {
            resume_delay: millis(fc.session.resume_delay_ms, default.session.resume_delay),
            error_recovery: millis(fc.session.error_recovery_ms, default.session.error_recovery),
            phrase_rotation: millis(fc.session.phrase_rotation_ms, default.session.phrase_rotation),
            messages: choice(
                "session.messages",
                fc.session.messages.as_deref(),
                MessageStyle::parse,
            )
            .unwrap_or(default.session.messages),
            debug: env("INOCENCIO_DEBUG")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .or(fc.session.debug)
                .unwrap_or(default.session.debug),
        };

        Self {
            api,
            wake,
            capture,
            stt,
            session,
        }
    }

    /// Check tunables for consistency
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "api.base_url must be an http(s) URL, got {}",
                self.api.base_url
            )));
        }

        if self.wake.phrases.iter().all(|p| p.trim().is_empty()) {
            return Err(Error::Config("at least one wake phrase is required".to_string()));
        }

        let capture = &self.capture;
        if capture.min_duration >= capture.max_duration {
            return Err(Error::Config(format!(
                "capture.min_duration ({}ms) must be below capture.max_duration ({}ms)",
                capture.min_duration.as_millis(),
                capture.max_duration.as_millis()
            )));
        }

        let intervals = [
            ("api.request_timeout", self.api.request_timeout),
            ("api.probe_timeout", self.api.probe_timeout),
            ("wake.fallback_restart", self.wake.fallback_restart),
            ("wake.restart_delay", self.wake.restart_delay),
            ("wake.error_restart_delay", self.wake.error_restart_delay),
            ("capture.silence_window", capture.silence_window),
            ("capture.frame_interval", capture.frame_interval),
            ("session.phrase_rotation", self.session.phrase_rotation),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, d)| d.is_zero()) {
            return Err(Error::Config(format!("{name} must be non-zero")));
        }

        if capture.level_window == 0 {
            return Err(Error::Config("capture.level_window must be at least 1".to_string()));
        }

        if !(0.0..1.0).contains(&capture.silence_threshold) {
            return Err(Error::Config(
                "capture.silence_threshold must be within [0, 1)".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse an enumerated setting, warning about values nobody recognizes
fn choice<T>(field: &str, value: Option<&str>, parse: fn(&str) -> Option<T>) -> Option<T> {
    let value = value?;
    let parsed = parse(value);
    if parsed.is_none() {
        tracing::warn!(field, value, "unknown value, using default");
    }
    parsed
}
