//! Controller scenario tests
//!
//! Drives the state machine with fake subsystems on a paused clock, so every
//! timer (capture delay, silence window, recovery) runs deterministically.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use inocencio::assistant::{Phase, Presenter, SessionSnapshot, TimerName};
use inocencio::voice::{
    AudioPayload, RecognitionEngine, RecognitionErrorKind, RecognizerEvent, RecognizerHandle,
    ResponsePlayer, SAMPLE_RATE, SampleSource, SilenceAwareRecorder,
};
use inocencio::config::RetriggerPolicy;
use inocencio::{
    Command, Components, Config, Controller, ControllerHandle, Error, ErrorKind, Result,
    VoiceBackend,
};

/// Samples handed out per `take()`, one 50ms frame at 16kHz
const FRAME: usize = 800;

// Fakes

#[derive(Default)]
struct EngineLog {
    starts: usize,
    aborts: usize,
    handles: Vec<RecognizerHandle>,
}

#[derive(Clone, Default)]
struct FakeEngine(Arc<Mutex<EngineLog>>);

impl FakeEngine {
    fn starts(&self) -> usize {
        self.0.lock().unwrap().starts
    }

    fn aborts(&self) -> usize {
        self.0.lock().unwrap().aborts
    }

    fn emit(&self, event: RecognizerEvent) -> bool {
        let handle = self.0.lock().unwrap().handles.last().cloned();
        handle.expect("engine never started").emit(event)
    }

    fn say(&self, text: &str) -> bool {
        self.emit(RecognizerEvent::Result(vec![text.to_string()]))
    }
}

impl RecognitionEngine for FakeEngine {
    fn start(&mut self, handle: RecognizerHandle) -> Result<()> {
        let mut log = self.0.lock().unwrap();
        log.starts += 1;
        log.handles.push(handle);
        Ok(())
    }

    fn abort(&mut self) {
        self.0.lock().unwrap().aborts += 1;
    }
}

/// What the fake microphone hears after a capture attaches
#[derive(Clone, Copy)]
enum Script {
    /// The stream delivers nothing at all
    Nothing,
    /// Loud speech for the given time, silence afterwards
    SpeechFor(Duration),
}

struct ScriptedSource {
    script: Script,
    attached_at: Mutex<Option<Instant>>,
    attaches: AtomicUsize,
    detaches: AtomicUsize,
}

impl ScriptedSource {
    fn new(script: Script) -> Self {
        Self {
            script,
            attached_at: Mutex::new(None),
            attaches: AtomicUsize::new(0),
            detaches: AtomicUsize::new(0),
        }
    }
}

impl SampleSource for ScriptedSource {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn attach(&self) {
        *self.attached_at.lock().unwrap() = Some(Instant::now());
        self.attaches.fetch_add(1, Ordering::SeqCst);
    }

    fn take(&self) -> Vec<f32> {
        match self.script {
            Script::Nothing => Vec::new(),
            Script::SpeechFor(speech) => {
                let since = self.attached_at.lock().unwrap().map(|t| t.elapsed());
                let loud = since.is_some_and(|elapsed| elapsed < speech);
                vec![if loud { 0.3 } else { 0.0 }; FRAME]
            }
        }
    }

    fn detach(&self) {
        self.detaches.fetch_add(1, Ordering::SeqCst);
    }
}

struct FakeBackend {
    status: Option<u16>,
    delay: Duration,
    questions: Mutex<Vec<AudioPayload>>,
}

impl FakeBackend {
    fn answering() -> Self {
        Self {
            status: None,
            delay: Duration::from_millis(300),
            questions: Mutex::new(Vec::new()),
        }
    }

    fn failing(status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::answering()
        }
    }

    fn calls(&self) -> usize {
        self.questions.lock().unwrap().len()
    }
}

#[async_trait]
impl VoiceBackend for FakeBackend {
    async fn submit(&self, question: AudioPayload) -> Result<AudioPayload> {
        self.questions.lock().unwrap().push(question);
        tokio::time::sleep(self.delay).await;
        match self.status {
            None => Ok(AudioPayload::new(b"ID3 fake reply".to_vec(), "audio/mpeg")),
            Some(status) => Err(Error::Api {
                status,
                body: "internal error".to_string(),
            }),
        }
    }
}

struct FakePlayer {
    fail: bool,
    plays: AtomicUsize,
}

impl FakePlayer {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            plays: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ResponsePlayer for FakePlayer {
    async fn play(&self, _audio: AudioPayload) -> Result<()> {
        self.plays.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        if self.fail {
            Err(Error::Playback("decoder exploded".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct Screen {
    transitions: Vec<(Phase, Phase)>,
    statuses: Vec<String>,
    hints: Vec<String>,
    idle_phrases: Vec<(Instant, String)>,
    snapshots: usize,
}

#[derive(Clone, Default)]
struct RecordingPresenter(Arc<Mutex<Screen>>);

impl Presenter for RecordingPresenter {
    fn phase_changed(&mut self, from: Phase, to: Phase) {
        self.0.lock().unwrap().transitions.push((from, to));
    }

    fn status(&mut self, message: &str) {
        self.0.lock().unwrap().statuses.push(message.to_string());
    }

    fn hint(&mut self, message: &str) {
        self.0.lock().unwrap().hints.push(message.to_string());
    }

    fn idle_phrase(&mut self, phrase: &str) {
        self.0
            .lock()
            .unwrap()
            .idle_phrases
            .push((Instant::now(), phrase.to_string()));
    }

    fn snapshot(&mut self, _snapshot: &SessionSnapshot) {
        self.0.lock().unwrap().snapshots += 1;
    }
}

// Harness

struct Harness {
    handle: ControllerHandle,
    snapshots: watch::Receiver<SessionSnapshot>,
    engine: FakeEngine,
    source: Arc<ScriptedSource>,
    backend: Arc<FakeBackend>,
    player: Arc<FakePlayer>,
    screen: RecordingPresenter,
    task: JoinHandle<()>,
}

impl Harness {
    async fn start(script: Script, backend: FakeBackend, player: FakePlayer) -> Self {
        Self::start_with(Config::default(), script, backend, player).await
    }

    async fn start_with(
        config: Config,
        script: Script,
        backend: FakeBackend,
        player: FakePlayer,
    ) -> Self {
        let engine = FakeEngine::default();
        let source = Arc::new(ScriptedSource::new(script));
        let backend = Arc::new(backend);
        let player = Arc::new(player);
        let screen = RecordingPresenter::default();

        let components = Components {
            engine: Box::new(engine.clone()),
            recorder: Box::new(SilenceAwareRecorder::new(
                Arc::clone(&source),
                config.capture.clone(),
            )),
            backend: Arc::clone(&backend) as Arc<dyn VoiceBackend>,
            player: Arc::clone(&player) as Arc<dyn ResponsePlayer>,
            presenter: Box::new(screen.clone()),
        };

        let controller = Controller::new(config, components).unwrap();
        let handle = controller.handle();
        let snapshots = handle.subscribe();
        let task = tokio::spawn(controller.run());

        let mut harness = Self {
            handle,
            snapshots,
            engine,
            source,
            backend,
            player,
            screen,
            task,
        };
        harness.wait_until(|s| s.initialized && s.listening).await;
        harness
    }

    async fn wait_until(&mut self, predicate: impl FnMut(&SessionSnapshot) -> bool) -> SessionSnapshot {
        tokio::time::timeout(Duration::from_secs(120), self.snapshots.wait_for(predicate))
            .await
            .expect("condition never reached")
            .expect("controller stopped")
            .clone()
    }

    async fn wait_for_phase(&mut self, phase: Phase) -> SessionSnapshot {
        self.wait_until(|s| s.phase == phase).await
    }

    fn transitions(&self) -> Vec<(Phase, Phase)> {
        self.screen.0.lock().unwrap().transitions.clone()
    }

    fn statuses(&self) -> Vec<String> {
        self.screen.0.lock().unwrap().statuses.clone()
    }

    fn hints(&self) -> Vec<String> {
        self.screen.0.lock().unwrap().hints.clone()
    }

    fn idle_phrases(&self) -> Vec<(Instant, String)> {
        self.screen.0.lock().unwrap().idle_phrases.clone()
    }

    fn attaches(&self) -> usize {
        self.source.attaches.load(Ordering::SeqCst)
    }

    async fn shutdown(self) {
        assert!(self.handle.command(Command::Shutdown));
        self.task.await.unwrap();
    }
}

// Scenarios

#[tokio::test(start_paused = true)]
async fn test_wake_word_starts_listening_and_aborts_recognizer() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    assert!(h.engine.say("Olá, Inocêncio!"));
    let snapshot = h.wait_for_phase(Phase::Listening).await;

    assert_eq!(h.engine.aborts(), 1);
    assert!(!snapshot.listening);
    assert!(snapshot.pending_timers.contains(&TimerName::CaptureStart));
    assert!(!snapshot.pending_timers.contains(&TimerName::FallbackRestart));
    assert!(h.statuses().contains(&"OUVINDO SUA PERGUNTA...".to_string()));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_transcript_without_wake_word_is_ignored() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("qual o horário de visita");
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(h.handle.snapshot().phase, Phase::Hibernating);
    assert_eq!(h.engine.aborts(), 0);
    assert!(h.transitions().is_empty());

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wake_word_while_busy_is_suppressed() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend {
            delay: Duration::from_secs(3),
            ..FakeBackend::answering()
        },
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Processing).await;

    // Late result from the aborted session is dropped
    h.engine.say("inocêncio");
    // Simulated wake word goes through the busy guard
    assert!(h.handle.command(Command::Activate { forced: false }));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.handle.snapshot().phase, Phase::Processing);
    assert_eq!(h.source.attaches.load(Ordering::SeqCst), 1);
    assert_eq!(h.hints(), vec!["Um momento, ainda estou atendendo...".to_string()]);

    h.wait_for_phase(Phase::Hibernating).await;
    assert_eq!(h.backend.calls(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_no_audio_returns_to_hibernation_without_upload() {
    let mut h = Harness::start(
        Script::Nothing,
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Listening).await;
    let snapshot = h.wait_until(|s| s.phase == Phase::Hibernating && s.listening).await;

    assert_eq!(h.backend.calls(), 0);
    assert!(snapshot.last_error.is_none());
    assert!(h.statuses().contains(&"Não consegui ouvir. Pode repetir?".to_string()));
    assert_eq!(
        h.transitions(),
        vec![
            (Phase::Hibernating, Phase::Listening),
            (Phase::Listening, Phase::Hibernating),
        ]
    );
    assert_eq!(h.engine.starts(), 2);
    assert_eq!(
        h.source.attaches.load(Ordering::SeqCst),
        h.source.detaches.load(Ordering::SeqCst)
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silence_ends_question_and_completes_round_trip() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    let woke = Instant::now();
    h.engine.say("oi inocencio");
    h.wait_for_phase(Phase::Processing).await;

    // 800ms start delay, then 1s minimum plus 2s of silence
    assert_eq!(woke.elapsed(), Duration::from_millis(3800));

    h.wait_for_phase(Phase::Speaking).await;
    h.wait_for_phase(Phase::Hibernating).await;

    assert_eq!(
        h.transitions(),
        vec![
            (Phase::Hibernating, Phase::Listening),
            (Phase::Listening, Phase::Processing),
            (Phase::Processing, Phase::Speaking),
            (Phase::Speaking, Phase::Hibernating),
        ]
    );
    assert_eq!(h.player.plays.load(Ordering::SeqCst), 1);

    let question = h.backend.questions.lock().unwrap()[0].clone();
    assert!(question.is_wav());
    assert_eq!(question.content_type, "audio/wav");

    let reader = hound::WavReader::new(Cursor::new(question.bytes)).unwrap();
    assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
    assert!(reader.duration() >= SAMPLE_RATE * 3);

    // Wake-word detection resumes after the resume delay
    assert_eq!(h.engine.starts(), 1);
    h.wait_until(|s| s.listening).await;
    assert_eq!(h.engine.starts(), 2);
    assert!(h.statuses().contains(&"PRONTO - Diga 'Inocêncio'".to_string()));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_api_error_recovers_after_delay() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::failing(500),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    let snapshot = h.wait_for_phase(Phase::Error).await;
    let failed_at = Instant::now();

    let last_error = snapshot.last_error.expect("error recorded");
    assert_eq!(last_error.kind, ErrorKind::Api);
    assert!(last_error.message.contains("500"));
    assert!(!snapshot.fatal);
    assert_eq!(snapshot.pending_timers, vec![TimerName::ErrorRecovery, TimerName::PhraseRotation]);
    assert!(!snapshot.listening);

    let snapshot = h.wait_for_phase(Phase::Hibernating).await;
    assert_eq!(failed_at.elapsed(), Duration::from_secs(5));
    assert!(snapshot.listening);
    assert_eq!(h.engine.starts(), 2);
    assert_eq!(h.player.plays.load(Ordering::SeqCst), 0);

    let statuses = h.statuses();
    assert!(statuses.contains(&"ERRO - O servidor não conseguiu responder".to_string()));
    assert!(statuses.contains(&"RECUPERANDO...".to_string()));

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_playback_error_goes_through_error_phase() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(true),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Speaking).await;
    let snapshot = h.wait_for_phase(Phase::Error).await;
    assert_eq!(snapshot.last_error.map(|e| e.kind), Some(ErrorKind::Playback));

    h.wait_for_phase(Phase::Hibernating).await;
    assert_eq!(
        h.transitions().last(),
        Some(&(Phase::Error, Phase::Hibernating))
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_permission_denial_needs_manual_recovery() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.emit(RecognizerEvent::Error(RecognitionErrorKind::NotAllowed));
    let snapshot = h.wait_for_phase(Phase::Error).await;
    assert!(snapshot.fatal);
    assert!(!snapshot.pending_timers.contains(&TimerName::ErrorRecovery));
    assert_eq!(snapshot.last_error.map(|e| e.kind), Some(ErrorKind::Permission));

    // No automatic recovery
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.handle.snapshot().phase, Phase::Error);
    assert_eq!(h.engine.starts(), 1);

    assert!(h.handle.command(Command::Recover));
    let snapshot = h.wait_until(|s| s.phase == Phase::Hibernating && s.listening).await;
    assert!(!snapshot.fatal);
    assert_eq!(h.engine.starts(), 2);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ignorable_recognizer_errors_are_swallowed() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.emit(RecognizerEvent::Error(RecognitionErrorKind::NoSpeech));
    h.engine.emit(RecognizerEvent::Error(RecognitionErrorKind::Aborted));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Hibernating);
    assert!(snapshot.listening);
    assert_eq!(h.engine.starts(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_other_recognizer_errors_restart_after_delay() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine
        .emit(RecognizerEvent::Error(RecognitionErrorKind::AudioCapture));
    tokio::time::sleep(Duration::from_millis(1900)).await;
    assert_eq!(h.engine.starts(), 1);
    assert_eq!(h.engine.aborts(), 1);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.engine.starts(), 2);
    assert_eq!(h.handle.snapshot().phase, Phase::Hibernating);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_max_duration_forces_stop() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_secs(60)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    let woke = Instant::now();
    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Processing).await;
    assert_eq!(woke.elapsed(), Duration::from_millis(10_800));

    let question = h.backend.questions.lock().unwrap()[0].clone();
    let reader = hound::WavReader::new(Cursor::new(question.bytes)).unwrap();
    assert_eq!(reader.duration(), SAMPLE_RATE * 10);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_manual_stop_before_minimum_is_too_short() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_secs(60)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_until(|s| s.capture_active).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert!(h.handle.command(Command::StopCapture));
    h.wait_until(|s| s.phase == Phase::Hibernating && s.listening).await;

    assert_eq!(h.backend.calls(), 0);
    assert_eq!(h.hints(), vec!["Pergunta muito curta. Tente de novo!".to_string()]);
    assert_eq!(
        h.source.attaches.load(Ordering::SeqCst),
        h.source.detaches.load(Ordering::SeqCst)
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_forced_activation_leaves_fatal_error() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine
        .emit(RecognizerEvent::Error(RecognitionErrorKind::ServiceNotAllowed));
    h.wait_for_phase(Phase::Error).await;

    // A plain wake is not enough to leave the error phase
    h.handle.command(Command::Activate { forced: false });
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.handle.snapshot().phase, Phase::Error);

    h.handle.command(Command::Activate { forced: true });
    let snapshot = h.wait_for_phase(Phase::Listening).await;
    assert!(!snapshot.fatal);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_natural_end_restarts_recognizer() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.emit(RecognizerEvent::End);
    h.wait_until(|s| !s.listening).await;
    assert_eq!(h.engine.starts(), 1);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(h.engine.starts(), 2);
    assert!(h.handle.snapshot().listening);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_silent_session_is_restarted_by_fallback() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    tokio::time::sleep(Duration::from_millis(29_900)).await;
    assert_eq!(h.engine.aborts(), 0);

    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(h.engine.aborts(), 1);
    assert_eq!(h.engine.starts(), 2);
    assert!(h.handle.snapshot().listening);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_ignore_policy_drops_busy_wake_silently() {
    let mut config = Config::default();
    config.wake.retrigger = RetriggerPolicy::Ignore;
    let mut h = Harness::start_with(
        config,
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend {
            delay: Duration::from_secs(3),
            ..FakeBackend::answering()
        },
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Processing).await;

    assert!(h.handle.command(Command::Activate { forced: false }));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.handle.snapshot().phase, Phase::Processing);
    assert!(h.hints().is_empty());
    assert_eq!(h.attaches(), 1);

    h.wait_for_phase(Phase::Hibernating).await;
    assert!(h.hints().is_empty());
    assert_eq!(h.backend.calls(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wake_word_while_listening_keeps_the_capture() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    let woke = Instant::now();
    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Listening).await;

    // Inside the capture start delay
    assert!(h.handle.command(Command::Activate { forced: false }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let snapshot = h.handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Listening);
    assert!(snapshot.pending_timers.contains(&TimerName::CaptureStart));
    assert_eq!(h.attaches(), 0);

    // Mid-capture
    h.wait_until(|s| s.capture_active).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.handle.command(Command::Activate { forced: false }));

    h.wait_for_phase(Phase::Processing).await;
    // Neither wake restarted the delay or the capture
    assert_eq!(woke.elapsed(), Duration::from_millis(3800));
    assert_eq!(h.attaches(), 1);
    assert!(h.backend.calls() <= 1);
    assert_eq!(h.hints().len(), 2);

    h.wait_for_phase(Phase::Hibernating).await;
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.engine.aborts(), 1);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wake_word_while_speaking_is_suppressed() {
    let mut h = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Speaking).await;

    assert!(h.handle.command(Command::Activate { forced: false }));
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.handle.snapshot().phase, Phase::Speaking);
    assert_eq!(h.hints(), vec!["Um momento, ainda estou atendendo...".to_string()]);

    h.wait_for_phase(Phase::Hibernating).await;
    assert_eq!(h.attaches(), 1);
    assert_eq!(h.backend.calls(), 1);
    assert_eq!(h.player.plays.load(Ordering::SeqCst), 1);
    assert_eq!(
        h.transitions().last(),
        Some(&(Phase::Speaking, Phase::Hibernating))
    );

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_phrases_rotate_only_while_recognizer_is_stopped() {
    let mut config = Config::default();
    config.wake.restart_delay = Duration::from_secs(60);
    let mut h = Harness::start_with(
        config,
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;
    let started = Instant::now();

    // Rotations at 6s and 12s find the recognizer listening
    tokio::time::sleep(Duration::from_secs(13)).await;
    assert!(h.idle_phrases().is_empty());

    h.engine.emit(RecognizerEvent::End);
    h.wait_until(|s| !s.listening).await;

    tokio::time::sleep(Duration::from_secs(24)).await;
    let shown = h.idle_phrases();
    let offsets: Vec<Duration> = shown.iter().map(|(at, _)| *at - started).collect();
    assert_eq!(
        offsets,
        vec![
            Duration::from_secs(18),
            Duration::from_secs(24),
            Duration::from_secs(30),
            Duration::from_secs(36),
        ]
    );
    assert!(shown.windows(2).all(|pair| pair[0].1 != pair[1].1));
    assert_eq!(h.handle.snapshot().phase, Phase::Hibernating);

    h.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_debug_snapshots_follow_session_setting() {
    let mut config = Config::default();
    config.session.debug = true;
    let mut h = Harness::start_with(
        config,
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;

    h.engine.say("inocêncio");
    h.wait_for_phase(Phase::Listening).await;
    // Startup plus the transition to LISTENING
    assert_eq!(h.screen.0.lock().unwrap().snapshots, 2);
    h.shutdown().await;

    let mut quiet = Harness::start(
        Script::SpeechFor(Duration::from_millis(500)),
        FakeBackend::answering(),
        FakePlayer::new(false),
    )
    .await;
    quiet.engine.say("inocêncio");
    quiet.wait_for_phase(Phase::Listening).await;
    assert_eq!(quiet.screen.0.lock().unwrap().snapshots, 0);
    quiet.shutdown().await;
}

#[tokio::test]
async fn test_zero_phrase_rotation_is_rejected() {
    let mut config = Config::default();
    config.session.phrase_rotation = Duration::ZERO;

    let components = Components {
        engine: Box::new(FakeEngine::default()),
        recorder: Box::new(SilenceAwareRecorder::new(
            Arc::new(ScriptedSource::new(Script::Nothing)),
            config.capture.clone(),
        )),
        backend: Arc::new(FakeBackend::answering()),
        player: Arc::new(FakePlayer::new(false)),
        presenter: Box::new(RecordingPresenter::default()),
    };

    let err = Controller::new(config, components).err().expect("config rejected");
    assert_eq!(err.kind(), ErrorKind::Config);
    assert!(err.to_string().contains("session.phrase_rotation"));
}
