//! The receptionist state machine
//!
//! One [`Controller`] owns the session: the phase, the timers, and every
//! subsystem (recognizer, recorder, voice API, player). All callbacks arrive
//! as [`Event`]s on a single queue and are applied one at a time, so the phase
//! has exactly one writer.
//!
//! ```text
//!  HIBERNATING ──wake──▶ LISTENING ──audio──▶ PROCESSING ──reply──▶ SPEAKING
//!       ▲                   │ empty / too short      │ error            │
//!       │◀──────────────────┘                        ▼                  │
//!       │◀───────── recovery delay ─────────────── ERROR ◀── error ─────┤
//!       │◀──────────────────────── resume delay ───────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::VoiceBackend;
use crate::assistant::events::{CaptureId, Command, Event, EventSender, RequestId, event_channel};
use crate::assistant::messages::{IDLE_PHRASES, Messages};
use crate::assistant::presenter::Presenter;
use crate::assistant::state::{LastError, Phase, SessionSnapshot};
use crate::assistant::timers::{TimerName, Timers};
use crate::config::{Config, RetriggerPolicy};
use crate::voice::{
    AudioPayload, CaptureOutcome, ErrorClass, RecognitionEngine, RecognizerAdapter,
    RecognizerSignal, Recorder, ResponsePlayer, StopReason, WakePhraseSet,
};
use crate::{Error, Result};

/// Subsystems the controller drives
pub struct Components {
    pub engine: Box<dyn RecognitionEngine>,
    pub recorder: Box<dyn Recorder>,
    pub backend: Arc<dyn VoiceBackend>,
    pub player: Arc<dyn ResponsePlayer>,
    pub presenter: Box<dyn Presenter>,
}

/// Talks to a running controller from outside its loop
#[derive(Clone)]
pub struct ControllerHandle {
    events: EventSender,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl ControllerHandle {
    /// Send an operator command; returns false once the controller has stopped
    pub fn command(&self, command: Command) -> bool {
        self.events.send(Event::Command(command))
    }

    /// Latest session snapshot
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch snapshots as they change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }
}

/// The session state machine
pub struct Controller {
    config: Config,
    phase: Phase,
    initialized: bool,
    fatal: bool,
    last_error: Option<LastError>,

    recognizer: RecognizerAdapter,
    recorder: Box<dyn Recorder>,
    backend: Arc<dyn VoiceBackend>,
    player: Arc<dyn ResponsePlayer>,
    presenter: Box<dyn Presenter>,
    messages: Messages,

    timers: Timers,
    events: EventSender,
    inbox: mpsc::UnboundedReceiver<Event>,
    snapshot_tx: watch::Sender<SessionSnapshot>,

    capture: Option<CaptureId>,
    next_capture: CaptureId,
    request: Option<RequestId>,
    next_request: RequestId,
    task: Option<JoinHandle<()>>,
    phrase_index: usize,
}

impl Controller {
    /// Build a controller
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the configuration is invalid or has no usable wake phrase
    pub fn new(config: Config, components: Components) -> Result<Self> {
        config.validate()?;
        let phrases = WakePhraseSet::new(&config.wake.phrases, &config.wake.command_phrases)?;
        let (events, inbox) = event_channel();
        let recognizer = RecognizerAdapter::new(components.engine, phrases, events.clone());
        let messages = Messages::new(config.session.messages, wake_display(&config.wake.phrases));
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::default());

        Ok(Self {
            phase: Phase::Hibernating,
            initialized: false,
            fatal: false,
            last_error: None,
            recognizer,
            recorder: components.recorder,
            backend: components.backend,
            player: components.player,
            presenter: components.presenter,
            messages,
            timers: Timers::new(events.clone()),
            events,
            inbox,
            snapshot_tx,
            capture: None,
            next_capture: 0,
            request: None,
            next_request: 0,
            task: None,
            phrase_index: 0,
            config,
        })
    }

    /// Handle for commands and snapshots
    #[must_use]
    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            events: self.events.clone(),
            snapshot: self.snapshot_tx.subscribe(),
        }
    }

    /// Run until a `Shutdown` command arrives
    pub async fn run(mut self) {
        self.initialize();
        self.publish(true);

        while let Some(event) = self.inbox.recv().await {
            if matches!(event, Event::Command(Command::Shutdown)) {
                break;
            }

            let before = self.phase;
            self.handle_event(event);
            self.publish(before != self.phase);
        }

        self.shutdown();
        self.publish(false);
    }

    fn initialize(&mut self) {
        tracing::info!(
            phrases = ?self.recognizer.phrases().phrases(),
            commands = ?self.recognizer.phrases().commands(),
            language = %self.config.wake.language,
            "receptionist starting"
        );
        self.initialized = true;
        self.presenter.status(&self.messages.system_ready());
        self.timers
            .arm(TimerName::PhraseRotation, self.config.session.phrase_rotation);
        self.start_wake_word_detection();
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Recognizer { session, event } => {
                if let Some(signal) = self.recognizer.accept(session, event) {
                    self.on_recognizer(signal);
                }
            }
            Event::CaptureFinished { capture, outcome } => self.on_capture_finished(capture, outcome),
            Event::InferenceFinished { request, result } => self.on_inference(request, result),
            Event::PlaybackFinished { request, result } => self.on_playback(request, result),
            Event::TimerFired { name, generation } => {
                if self.timers.accept(name, generation) {
                    self.on_timer(name);
                }
            }
            Event::Command(command) => self.on_command(command),
        }
    }

    // Recognizer

    fn start_wake_word_detection(&mut self) {
        if self.phase != Phase::Hibernating {
            tracing::debug!(phase = %self.phase, "not hibernating, wake-word detection not started");
            return;
        }

        match self.recognizer.start() {
            Ok(true) => {
                self.presenter.status(&self.messages.listening_for_wake());
                self.timers
                    .arm(TimerName::FallbackRestart, self.config.wake.fallback_restart);
            }
            Ok(false) => {}
            Err(e) if !e.is_recoverable() => self.fail(e),
            Err(e) => {
                tracing::warn!(error = %e, "recognizer failed to start, retrying");
                self.timers
                    .arm(TimerName::RecognizerRestart, self.config.wake.error_restart_delay);
            }
        }
    }

    fn on_recognizer(&mut self, signal: RecognizerSignal) {
        match signal {
            RecognizerSignal::Started => tracing::debug!("recognizer session live"),
            RecognizerSignal::Matched(found) => {
                tracing::info!(phrase = %found.phrase, transcript = %found.transcript, "wake word detected");
                self.activate(false);
            }
            RecognizerSignal::Heard(alternatives) => {
                tracing::debug!(?alternatives, "no wake phrase in transcript");
                if self.phase == Phase::Hibernating {
                    self.timers
                        .arm(TimerName::FallbackRestart, self.config.wake.fallback_restart);
                }
            }
            RecognizerSignal::Error(kind) => match kind.class() {
                ErrorClass::Ignorable => tracing::debug!(%kind, "recognizer error ignored"),
                ErrorClass::Fatal => {
                    tracing::warn!(%kind, "recognizer permission denied");
                    self.fail(Error::Permission(format!("speech recognition not allowed ({kind})")));
                }
                ErrorClass::Retry => {
                    tracing::warn!(%kind, "recognizer error, restarting");
                    self.recognizer.abort();
                    self.timers.cancel(TimerName::FallbackRestart);
                    if self.phase == Phase::Hibernating {
                        self.timers
                            .arm(TimerName::RecognizerRestart, self.config.wake.error_restart_delay);
                    }
                }
            },
            RecognizerSignal::Ended => {
                tracing::debug!("recognizer session ended");
                self.timers.cancel(TimerName::FallbackRestart);
                if self.phase == Phase::Hibernating {
                    self.timers
                        .arm(TimerName::RecognizerRestart, self.config.wake.restart_delay);
                }
            }
        }
    }

    // Capture

    /// Leave hibernation and start capturing a question
    fn activate(&mut self, forced: bool) {
        let allowed = self.phase == Phase::Hibernating || (forced && self.phase == Phase::Error);
        if !allowed {
            tracing::debug!(phase = %self.phase, "wake word while busy, ignored");
            if self.config.wake.retrigger == RetriggerPolicy::Hint {
                self.presenter.hint(&self.messages.busy_hint());
            }
            return;
        }

        self.recognizer.abort();
        self.timers.cancel(TimerName::FallbackRestart);
        self.timers.cancel(TimerName::RecognizerRestart);
        self.timers.cancel(TimerName::ErrorRecovery);
        self.fatal = false;

        self.transition(Phase::Listening);
        self.presenter.status(&self.messages.hearing_question());
        self.timers
            .arm(TimerName::CaptureStart, self.config.capture.start_delay);
    }

    fn begin_capture(&mut self) {
        if self.phase != Phase::Listening {
            return;
        }

        self.next_capture += 1;
        let capture = self.next_capture;
        match self.recorder.start_capture(capture, self.events.clone()) {
            Ok(()) => {
                tracing::info!(capture, "capturing question");
                self.capture = Some(capture);
                self.timers
                    .arm(TimerName::QuestionMaxDuration, self.config.capture.max_duration);
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_capture_finished(&mut self, capture: CaptureId, outcome: CaptureOutcome) {
        if self.capture != Some(capture) || self.phase != Phase::Listening {
            tracing::debug!(capture, phase = %self.phase, "stale capture result dropped");
            return;
        }
        self.capture = None;
        self.timers.cancel(TimerName::QuestionMaxDuration);

        match outcome {
            CaptureOutcome::Empty => {
                let error = Error::NoAudio;
                tracing::info!(%error, "question discarded");
                self.presenter.status(&self.messages.retry(&error));
                self.return_to_hibernation();
            }
            CaptureOutcome::TooShort { duration } => self.too_short(duration),
            CaptureOutcome::Failed(e) => self.fail(e),
            CaptureOutcome::Audio(audio) => {
                tracing::info!(
                    duration_ms = u64::try_from(audio.duration.as_millis()).unwrap_or(u64::MAX),
                    reason = %audio.reason,
                    chunks = audio.chunks,
                    "question captured"
                );
                self.transition(Phase::Processing);
                self.presenter.status(&self.messages.processing());
                self.submit(audio.payload);
            }
        }
    }

    fn too_short(&mut self, duration: Duration) {
        let error = Error::RecordingTooShort {
            millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        };
        tracing::info!(%error, "question discarded");
        self.presenter.hint(&self.messages.retry(&error));
        self.return_to_hibernation();
    }

    fn return_to_hibernation(&mut self) {
        self.transition(Phase::Hibernating);
        self.start_wake_word_detection();
    }

    // Inference and playback

    fn submit(&mut self, question: AudioPayload) {
        self.next_request += 1;
        let request = self.next_request;
        self.request = Some(request);

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        self.task = Some(tokio::spawn(async move {
            let result = backend.submit(question).await;
            events.send(Event::InferenceFinished { request, result });
        }));
    }

    fn on_inference(&mut self, request: RequestId, result: Result<AudioPayload>) {
        if self.request != Some(request) || self.phase != Phase::Processing {
            tracing::debug!(request, phase = %self.phase, "stale inference result dropped");
            return;
        }

        match result {
            Ok(reply) => {
                self.transition(Phase::Speaking);
                self.presenter.status(&self.messages.speaking());

                let player = Arc::clone(&self.player);
                let events = self.events.clone();
                self.task = Some(tokio::spawn(async move {
                    let result = player.play(reply).await;
                    events.send(Event::PlaybackFinished { request, result });
                }));
            }
            Err(e) => self.fail(e),
        }
    }

    fn on_playback(&mut self, request: RequestId, result: Result<()>) {
        if self.request != Some(request) || self.phase != Phase::Speaking {
            tracing::debug!(request, phase = %self.phase, "stale playback result dropped");
            return;
        }
        self.request = None;
        self.task = None;

        match result {
            Ok(()) => {
                tracing::info!("reply finished, back to hibernation");
                self.transition(Phase::Hibernating);
                self.presenter.status(&self.messages.ready_again());
                self.timers
                    .arm(TimerName::RecognizerRestart, self.config.session.resume_delay);
            }
            Err(e) => self.fail(e),
        }
    }

    // Errors

    fn fail(&mut self, error: Error) {
        tracing::error!(error = %error, phase = %self.phase, "session error");

        self.halt_subsystems();
        for name in [
            TimerName::FallbackRestart,
            TimerName::RecognizerRestart,
            TimerName::CaptureStart,
            TimerName::QuestionMaxDuration,
            TimerName::ErrorRecovery,
        ] {
            self.timers.cancel(name);
        }

        self.last_error = Some(LastError {
            kind: error.kind(),
            message: error.to_string(),
        });
        self.transition(Phase::Error);
        self.presenter.status(&self.messages.error(&error));

        if error.is_recoverable() {
            self.timers
                .arm(TimerName::ErrorRecovery, self.config.session.error_recovery);
        } else {
            self.fatal = true;
            self.presenter.hint(&self.messages.needs_attention());
        }
    }

    fn recover(&mut self) {
        tracing::info!(fatal = self.fatal, "recovering");
        self.fatal = false;
        self.timers.cancel(TimerName::ErrorRecovery);
        self.transition(Phase::Hibernating);
        self.presenter.status(&self.messages.recovering());
        self.start_wake_word_detection();
    }

    fn halt_subsystems(&mut self) {
        self.recorder.abort();
        self.capture = None;
        self.recognizer.abort();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.request = None;
    }

    // Timers and commands

    fn on_timer(&mut self, name: TimerName) {
        tracing::debug!(%name, phase = %self.phase, "timer fired");
        match name {
            TimerName::CaptureStart => self.begin_capture(),
            TimerName::QuestionMaxDuration => {
                if self.phase == Phase::Listening {
                    self.recorder.stop_capture(StopReason::MaxDuration);
                }
            }
            TimerName::FallbackRestart => {
                if self.phase == Phase::Hibernating {
                    tracing::info!("recognizer quiet for too long, forcing restart");
                    self.recognizer.abort();
                    self.timers
                        .arm(TimerName::RecognizerRestart, self.config.wake.restart_delay);
                }
            }
            TimerName::RecognizerRestart => self.start_wake_word_detection(),
            TimerName::ErrorRecovery => {
                if self.phase == Phase::Error {
                    self.recover();
                }
            }
            TimerName::PhraseRotation => {
                if self.phase == Phase::Hibernating && !self.recognizer.is_listening() {
                    self.phrase_index = (self.phrase_index + 1) % IDLE_PHRASES.len();
                    self.presenter.idle_phrase(IDLE_PHRASES[self.phrase_index]);
                }
                self.timers
                    .arm(TimerName::PhraseRotation, self.config.session.phrase_rotation);
            }
        }
    }

    fn on_command(&mut self, command: Command) {
        tracing::debug!(?command, phase = %self.phase, "command");
        match command {
            Command::Activate { forced } => self.activate(forced),
            Command::StopCapture => {
                if self.phase != Phase::Listening {
                    tracing::debug!("no capture to stop");
                } else if self.capture.is_some() {
                    self.recorder.stop_capture(StopReason::Manual);
                } else if self.timers.cancel(TimerName::CaptureStart) {
                    // Stopped before capture began
                    self.too_short(Duration::ZERO);
                }
            }
            Command::Recover => {
                if self.phase == Phase::Error {
                    self.recover();
                } else {
                    tracing::debug!(phase = %self.phase, "nothing to recover from");
                }
            }
            Command::Shutdown => {}
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("receptionist shutting down");
        self.halt_subsystems();
        self.timers.cancel_all();
    }

    // Snapshots

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            initialized: self.initialized,
            listening: self.recognizer.is_listening(),
            capture_active: self.capture.is_some(),
            pending_timers: self.timers.pending(),
            last_error: self.last_error.clone(),
            fatal: self.fatal,
            updated_at: chrono::Utc::now(),
        }
    }

    fn publish(&mut self, transitioned: bool) {
        let snapshot = self.snapshot();
        if transitioned && self.config.session.debug {
            self.presenter.snapshot(&snapshot);
        }
        self.snapshot_tx.send_replace(snapshot);
    }

    fn transition(&mut self, to: Phase) {
        let from = self.phase;
        if from == to {
            return;
        }
        tracing::info!(%from, %to, "phase transition");
        self.phase = to;
        self.presenter.phase_changed(from, to);
    }
}

/// Capitalized first wake phrase, as shown in prompts
fn wake_display(phrases: &[String]) -> String {
    let first = phrases
        .iter()
        .map(|p| p.trim())
        .find(|p| !p.is_empty())
        .unwrap_or("Inocêncio");
    let mut chars = first.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().chain(chars).collect()
    })
}
