//! Signal level tracking and end-of-question detection

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use crate::config::CaptureConfig;

/// Why a capture stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Sustained silence after the minimum duration
    Silence,
    /// Hit the maximum duration
    MaxDuration,
    /// Stopped from outside (console, controller)
    Manual,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Silence => "silence",
            Self::MaxDuration => "max_duration",
            Self::Manual => "manual",
        })
    }
}

/// Rolling average of per-frame RMS levels
#[derive(Debug)]
pub struct LevelMeter {
    window: usize,
    levels: VecDeque<f32>,
}

impl LevelMeter {
    /// Average over the last `window` frames
    #[must_use]
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            levels: VecDeque::with_capacity(window),
        }
    }

    /// Feed one frame of samples and return the rolling level
    pub fn push(&mut self, samples: &[f32]) -> f32 {
        if self.levels.len() == self.window {
            self.levels.pop_front();
        }
        self.levels.push_back(rms(samples));
        self.level()
    }

    /// Current rolling level
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn level(&self) -> f32 {
        if self.levels.is_empty() {
            return 0.0;
        }
        self.levels.iter().sum::<f32>() / self.levels.len() as f32
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.levels.clear();
    }
}

/// Decides when a question has ended
///
/// Stop conditions, first one wins:
/// - before `min_duration`, never
/// - at `max_duration`, always
/// - after `silence_window` of continuous sub-threshold level, counted from
///   the first silent frame at or after `min_duration`
#[derive(Debug)]
pub struct SilenceMonitor {
    min_duration: Duration,
    max_duration: Duration,
    silence_window: Duration,
    threshold: f32,
    silent_since: Option<Duration>,
}

impl SilenceMonitor {
    /// Build from capture settings
    #[must_use]
    pub const fn new(config: &CaptureConfig) -> Self {
        Self {
            min_duration: config.min_duration,
            max_duration: config.max_duration,
            silence_window: config.silence_window,
            threshold: config.silence_threshold,
            silent_since: None,
        }
    }

    /// Observe the rolling level at `elapsed` since capture start
    pub fn observe(&mut self, elapsed: Duration, level: f32) -> Option<StopReason> {
        if elapsed >= self.max_duration {
            return Some(StopReason::MaxDuration);
        }

        if level >= self.threshold {
            if self.silent_since.take().is_some() {
                tracing::trace!(level, "sound detected, silence countdown cancelled");
            }
            return None;
        }

        if elapsed < self.min_duration {
            return None;
        }

        let since = *self.silent_since.get_or_insert(elapsed);
        if elapsed.saturating_sub(since) >= self.silence_window {
            tracing::debug!(
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "silence window elapsed"
            );
            return Some(StopReason::Silence);
        }

        None
    }

    #[cfg(test)]
    const fn is_counting_silence(&self) -> bool {
        self.silent_since.is_some()
    }
}

/// Calculate RMS energy of audio samples
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
