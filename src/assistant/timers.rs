//! Named, cancellable timers
//!
//! Each name has at most one live instance. Arming a name cancels the previous
//! instance, and every firing carries a generation so a firing that raced a
//! cancellation can be recognized and dropped.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::assistant::events::{Event, EventSender};

/// Timers the controller can arm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerName {
    /// Restart a recognizer session that has gone quiet
    FallbackRestart,
    /// Start the recognizer again after a delay
    RecognizerRestart,
    /// Begin question capture after the wake word
    CaptureStart,
    /// Force the question capture to end
    QuestionMaxDuration,
    /// Leave the error phase
    ErrorRecovery,
    /// Show the next idle phrase
    PhraseRotation,
}

impl fmt::Display for TimerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FallbackRestart => "fallback_restart",
            Self::RecognizerRestart => "recognizer_restart",
            Self::CaptureStart => "capture_start",
            Self::QuestionMaxDuration => "question_max_duration",
            Self::ErrorRecovery => "error_recovery",
            Self::PhraseRotation => "phrase_rotation",
        })
    }
}

struct ArmedTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of named timers
pub struct Timers {
    events: EventSender,
    active: HashMap<TimerName, ArmedTimer>,
    next_generation: u64,
}

impl Timers {
    /// Create an empty registry posting to `events`
    #[must_use]
    pub fn new(events: EventSender) -> Self {
        Self {
            events,
            active: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Arm `name` to fire after `delay`, replacing any pending instance
    pub fn arm(&mut self, name: TimerName, delay: Duration) {
        self.cancel(name);

        self.next_generation += 1;
        let generation = self.next_generation;
        let events = self.events.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(Event::TimerFired { name, generation });
        });

        tracing::trace!(%name, generation, delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), "timer armed");
        self.active.insert(name, ArmedTimer { generation, handle });
    }

    /// Cancel `name`; returns whether it was pending
    pub fn cancel(&mut self, name: TimerName) -> bool {
        self.active.remove(&name).is_some_and(|timer| {
            timer.handle.abort();
            tracing::trace!(%name, "timer cancelled");
            true
        })
    }

    /// Cancel every pending timer
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.handle.abort();
        }
    }

    /// Claim a firing
    ///
    /// Returns true only for the live instance of `name`, which is then
    /// considered spent.
    pub fn accept(&mut self, name: TimerName, generation: u64) -> bool {
        match self.active.get(&name) {
            Some(timer) if timer.generation == generation => {
                self.active.remove(&name);
                true
            }
            _ => {
                tracing::trace!(%name, generation, "stale timer firing dropped");
                false
            }
        }
    }

    #[cfg(test)]
    fn is_armed(&self, name: TimerName) -> bool {
        self.active.contains_key(&name)
    }

    /// Pending timer names, sorted
    #[must_use]
    pub fn pending(&self) -> Vec<TimerName> {
        let mut names: Vec<TimerName> = self.active.keys().copied().collect();
        names.sort();
        names
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
