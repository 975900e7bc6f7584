//! Interaction phases and debug snapshots

use std::fmt;

use chrono::{DateTime, Utc};

use crate::assistant::timers::TimerName;
use crate::error::ErrorKind;

/// The assistant's interaction phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Waiting for the wake word
    #[default]
    Hibernating,
    /// Capturing the question
    Listening,
    /// Waiting on the voice API
    Processing,
    /// Playing the reply
    Speaking,
    /// Something failed; recovers after a delay unless fatal
    Error,
}

impl Phase {
    /// Whether a new interaction may begin
    #[must_use]
    pub const fn is_idle(self) -> bool {
        matches!(self, Self::Hibernating)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hibernating => "HIBERNATING",
            Self::Listening => "LISTENING",
            Self::Processing => "PROCESSING",
            Self::Speaking => "SPEAKING",
            Self::Error => "ERROR",
        })
    }
}

/// Last failure, as shown in snapshots
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Point-in-time view of the controller, for debugging
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SessionSnapshot {
    pub phase: Phase,
    /// Startup completed
    pub initialized: bool,
    /// Recognizer session live
    pub listening: bool,
    /// Question capture running
    pub capture_active: bool,
    pub pending_timers: Vec<TimerName>,
    pub last_error: Option<LastError>,
    /// In a fatal error that needs the `recover` command
    pub fatal: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: Phase::default(),
            initialized: false,
            listening: false,
            capture_active: false,
            pending_timers: Vec::new(),
            last_error: None,
            fatal: false,
            updated_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_display_and_serde_agree() {
        for phase in [
            Phase::Hibernating,
            Phase::Listening,
            Phase::Processing,
            Phase::Speaking,
            Phase::Error,
        ] {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }

    #[test]
    fn test_snapshot_serializes() {
        let snapshot = SessionSnapshot {
            pending_timers: vec![TimerName::FallbackRestart],
            last_error: Some(LastError {
                kind: ErrorKind::Network,
                message: "connectivity error: timed out".into(),
            }),
            ..SessionSnapshot::default()
        };
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["phase"], "HIBERNATING");
        assert_eq!(json["pending_timers"][0], "fallback_restart");
        assert_eq!(json["last_error"]["kind"], "network");
    }
}
