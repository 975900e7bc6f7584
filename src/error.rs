//! Error types for the receptionist

use std::fmt;

use thiserror::Error;

/// Result type alias for receptionist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the receptionist
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone or recognition permission denied
    #[error("permission denied: {0}")]
    Permission(String),

    /// A required capability is missing (no recognizer, no audio device)
    #[error("initialization error: {0}")]
    Initialization(String),

    /// Wake-word recognizer failure
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Network failure or request timeout talking to the voice API
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Voice API answered with a non-success status
    #[error("API error {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body text
        body: String,
    },

    /// Response audio could not be decoded or played
    #[error("playback error: {0}")]
    Playback(String),

    /// Capture ended before the minimum duration
    #[error("recording too short: {millis}ms")]
    RecordingTooShort {
        /// Captured duration in milliseconds
        millis: u64,
    },

    /// Capture ended without any audio
    #[error("no audio captured")]
    NoAudio,

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Coarse error category used for recovery decisions and user-facing text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    Initialization,
    Recognition,
    Network,
    Api,
    Playback,
    TooShort,
    NoAudio,
    Audio,
    Config,
}

impl ErrorKind {
    /// Fatal errors need user action; everything else recovers on its own
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::Permission | Self::Initialization | Self::Config)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Permission => "permission",
            Self::Initialization => "initialization",
            Self::Recognition => "recognition",
            Self::Network => "network",
            Self::Api => "api",
            Self::Playback => "playback",
            Self::TooShort => "too_short",
            Self::NoAudio => "no_audio",
            Self::Audio => "audio",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

impl Error {
    /// Categorize this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Toml(_) => ErrorKind::Config,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Initialization(_) => ErrorKind::Initialization,
            Self::Recognition(_) => ErrorKind::Recognition,
            Self::Connectivity(_) => ErrorKind::Network,
            Self::Http(e) if e.is_status() => ErrorKind::Api,
            Self::Http(_) => ErrorKind::Network,
            Self::Api { .. } | Self::Serialization(_) => ErrorKind::Api,
            Self::Playback(_) => ErrorKind::Playback,
            Self::RecordingTooShort { .. } => ErrorKind::TooShort,
            Self::NoAudio => ErrorKind::NoAudio,
            Self::Audio(_) | Self::Io(_) => ErrorKind::Audio,
        }
    }

    /// Whether the session can recover from this error without user action
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !self.kind().is_fatal()
    }
}
