//! Built-in continuous recognition engine
//!
//! Segments the shared microphone into utterances and transcribes each one.
//! Sessions last a bounded time and then report `End`, so the controller's
//! restart logic runs exactly as it would for any other engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::voice::capture::{AttachedSource, SampleSource, samples_to_wav};
use crate::voice::recognizer::{
    RecognitionEngine, RecognitionErrorKind, RecognizerEvent, RecognizerHandle,
};
use crate::voice::segmenter::SpeechSegmenter;
use crate::voice::stt::SpeechToText;
use crate::{Error, Result};

/// Polling interval for the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Segments shorter than this are not worth a transcription round trip
const MIN_TRANSCRIBE_SAMPLES: usize = 8000; // 0.5 seconds

/// Default session length before the engine reports `End`
pub const DEFAULT_SESSION_LENGTH: Duration = Duration::from_secs(60);

/// Recognition engine that transcribes energy-segmented utterances
pub struct TranscribingEngine<S: SampleSource> {
    source: Arc<S>,
    stt: Arc<SpeechToText>,
    session_length: Duration,
    task: Option<JoinHandle<()>>,
}

impl<S: SampleSource> TranscribingEngine<S> {
    /// Create an engine reading from `source`
    #[must_use]
    pub const fn new(source: Arc<S>, stt: Arc<SpeechToText>) -> Self {
        Self {
            source,
            stt,
            session_length: DEFAULT_SESSION_LENGTH,
            task: None,
        }
    }
}

impl<S: SampleSource> RecognitionEngine for TranscribingEngine<S> {
    fn start(&mut self, handle: RecognizerHandle) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        self.task = Some(tokio::spawn(run_session(
            Arc::clone(&self.source),
            Arc::clone(&self.stt),
            self.session_length,
            handle,
        )));
        Ok(())
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!("transcribing engine aborted");
        }
    }
}

impl<S: SampleSource> Drop for TranscribingEngine<S> {
    fn drop(&mut self) {
        self.abort();
    }
}

async fn run_session<S: SampleSource>(
    source: Arc<S>,
    stt: Arc<SpeechToText>,
    session_length: Duration,
    handle: RecognizerHandle,
) {
    let attached = AttachedSource::new(source);
    let mut segmenter = SpeechSegmenter::new();
    let started = Instant::now();

    let mut ticks = tokio::time::interval(POLL_INTERVAL);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);

    if !handle.emit(RecognizerEvent::Started) {
        return;
    }
    tracing::debug!(session = handle.session(), "recognition session started");

    while started.elapsed() < session_length {
        ticks.tick().await;

        let samples = attached.take();
        let Some(segment) = segmenter.process(&samples) else {
            continue;
        };

        if segment.len() < MIN_TRANSCRIBE_SAMPLES {
            tracing::trace!(samples = segment.len(), "segment too short to transcribe");
            continue;
        }

        let event = match transcribe_segment(&stt, &segment, attached.sample_rate()).await {
            Ok(text) if text.is_empty() => RecognizerEvent::Error(RecognitionErrorKind::NoSpeech),
            Ok(text) => RecognizerEvent::Result(vec![text]),
            Err(e) => {
                tracing::warn!(error = %e, "segment transcription failed");
                RecognizerEvent::Error(error_kind(&e))
            }
        };

        let fatal = matches!(
            &event,
            RecognizerEvent::Error(
                RecognitionErrorKind::NotAllowed | RecognitionErrorKind::ServiceNotAllowed
            )
        );
        if !handle.emit(event) || fatal {
            return;
        }
    }

    tracing::debug!(session = handle.session(), "recognition session ended");
    handle.emit(RecognizerEvent::End);
}

async fn transcribe_segment(stt: &SpeechToText, segment: &[f32], sample_rate: u32) -> Result<String> {
    let wav = samples_to_wav(segment, sample_rate)?;
    stt.transcribe(&wav).await
}

/// Map a transcription failure to a recognizer error code
fn error_kind(error: &Error) -> RecognitionErrorKind {
    match error {
        Error::Api {
            status: 401 | 403, ..
        } => RecognitionErrorKind::ServiceNotAllowed,
        Error::Api { status, .. } => RecognitionErrorKind::Other(format!("http-{status}")),
        Error::Connectivity(_) | Error::Http(_) => RecognitionErrorKind::Network,
        Error::Audio(_) => RecognitionErrorKind::AudioCapture,
        other => RecognitionErrorKind::Other(other.kind().to_string()),
    }
}
