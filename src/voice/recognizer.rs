//! Wake-word recognizer adapter
//!
//! Wraps a continuous recognition engine. The adapter owns session bookkeeping
//! (re-entrancy guard, idempotent abort, stale-event filtering) and turns raw
//! engine callbacks into [`RecognizerSignal`]s for the controller.

use std::fmt;

use crate::Result;
use crate::assistant::events::{Event, EventSender};
use crate::voice::wake_word::{WakeMatch, WakePhraseSet};

/// Raw callback from a recognition engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Engine began listening
    Started,
    /// Finalized transcript alternatives, best first
    Result(Vec<String>),
    /// Engine reported an error
    Error(RecognitionErrorKind),
    /// Engine stopped on its own
    End,
}

/// Recognition error codes, named after the Web Speech API codes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorKind {
    NoSpeech,
    Aborted,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    AudioCapture,
    LanguageNotSupported,
    Other(String),
}

/// How the controller should treat a recognition error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Swallow; the session restarts by itself
    Ignorable,
    /// Permission problem, ends the session
    Fatal,
    /// Restart detection after a delay
    Retry,
}

impl RecognitionErrorKind {
    /// Parse an engine error code (`"no-speech"`, `"not-allowed"`, ...)
    #[must_use]
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "aborted" => Self::Aborted,
            "network" => Self::Network,
            "not-allowed" => Self::NotAllowed,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "audio-capture" => Self::AudioCapture,
            "language-not-supported" => Self::LanguageNotSupported,
            other => Self::Other(other.to_string()),
        }
    }

    /// Classify for recovery
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::NoSpeech | Self::Aborted | Self::Network => ErrorClass::Ignorable,
            Self::NotAllowed | Self::ServiceNotAllowed => ErrorClass::Fatal,
            Self::AudioCapture | Self::LanguageNotSupported | Self::Other(_) => ErrorClass::Retry,
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSpeech => f.write_str("no-speech"),
            Self::Aborted => f.write_str("aborted"),
            Self::Network => f.write_str("network"),
            Self::NotAllowed => f.write_str("not-allowed"),
            Self::ServiceNotAllowed => f.write_str("service-not-allowed"),
            Self::AudioCapture => f.write_str("audio-capture"),
            Self::LanguageNotSupported => f.write_str("language-not-supported"),
            Self::Other(code) => f.write_str(code),
        }
    }
}

/// Handed to an engine on start; posts its callbacks to the controller
#[derive(Debug, Clone)]
pub struct RecognizerHandle {
    session: u64,
    events: EventSender,
}

impl RecognizerHandle {
    /// Post an engine callback; returns false once the controller is gone
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        self.events.send(Event::Recognizer {
            session: self.session,
            event,
        })
    }

    /// Session this handle belongs to
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }
}

/// A continuous speech recognition engine
pub trait RecognitionEngine: Send {
    /// Begin a listening session, reporting through `handle`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot start
    fn start(&mut self, handle: RecognizerHandle) -> Result<()>;

    /// Halt immediately, discarding pending audio
    fn abort(&mut self);

    /// Halt after finishing pending work
    fn stop(&mut self) {
        self.abort();
    }
}

/// What the controller hears from the recognizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerSignal {
    Started,
    /// A wake phrase was recognized
    Matched(WakeMatch),
    /// Speech was recognized but held no wake phrase
    Heard(Vec<String>),
    Error(RecognitionErrorKind),
    /// The engine ended its session by itself
    Ended,
}

/// Session bookkeeping around a [`RecognitionEngine`]
pub struct RecognizerAdapter {
    engine: Box<dyn RecognitionEngine>,
    phrases: WakePhraseSet,
    events: EventSender,
    session: u64,
    listening: bool,
}

impl RecognizerAdapter {
    /// Wrap `engine`, matching against `phrases`
    #[must_use]
    pub fn new(engine: Box<dyn RecognitionEngine>, phrases: WakePhraseSet, events: EventSender) -> Self {
        Self {
            engine,
            phrases,
            events,
            session: 0,
            listening: false,
        }
    }

    /// Start listening
    ///
    /// Returns `Ok(false)` without touching the engine if already listening.
    ///
    /// # Errors
    ///
    /// Returns error if the engine fails to start
    pub fn start(&mut self) -> Result<bool> {
        if self.listening {
            tracing::debug!(session = self.session, "recognizer already listening, start ignored");
            return Ok(false);
        }

        self.session += 1;
        let handle = RecognizerHandle {
            session: self.session,
            events: self.events.clone(),
        };
        self.engine.start(handle)?;
        self.listening = true;

        tracing::debug!(session = self.session, "recognizer started");
        Ok(true)
    }

    /// Halt immediately; no-op if not listening
    pub fn abort(&mut self) {
        if self.halt() {
            self.engine.abort();
        }
    }

    /// Halt gracefully; no-op if not listening
    pub fn stop(&mut self) {
        if self.halt() {
            self.engine.stop();
        }
    }

    fn halt(&mut self) -> bool {
        if !self.listening {
            return false;
        }
        // Later callbacks from this session are stale
        self.session += 1;
        self.listening = false;
        tracing::debug!("recognizer halted");
        true
    }

    /// Filter and interpret an engine callback
    ///
    /// Returns `None` for callbacks from sessions that were already halted.
    pub fn accept(&mut self, session: u64, event: RecognizerEvent) -> Option<RecognizerSignal> {
        if session != self.session {
            tracing::trace!(session, current = self.session, ?event, "stale recognizer event");
            return None;
        }

        let signal = match event {
            RecognizerEvent::Started => RecognizerSignal::Started,
            RecognizerEvent::Result(alternatives) => {
                tracing::debug!(?alternatives, "recognized");
                self.phrases
                    .find_any(&alternatives)
                    .map_or(RecognizerSignal::Heard(alternatives), RecognizerSignal::Matched)
            }
            RecognizerEvent::Error(kind) => RecognizerSignal::Error(kind),
            RecognizerEvent::End => {
                self.listening = false;
                RecognizerSignal::Ended
            }
        };

        Some(signal)
    }

    /// Whether a session is live
    #[must_use]
    pub const fn is_listening(&self) -> bool {
        self.listening
    }

    /// Current session number
    #[must_use]
    pub const fn session(&self) -> u64 {
        self.session
    }

    /// Configured phrases
    #[must_use]
    pub const fn phrases(&self) -> &WakePhraseSet {
        &self.phrases
    }
}
