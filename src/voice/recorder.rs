//! Silence-aware question recorder
//!
//! A capture attaches to the shared microphone, buffers one chunk per polling
//! frame and watches the rolling signal level. It ends on sustained silence,
//! at the maximum duration, or when told to stop, then reports a single
//! [`CaptureOutcome`] to the controller.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::{Instant, MissedTickBehavior};

use crate::assistant::events::{CaptureId, Event, EventSender};
use crate::config::CaptureConfig;
use crate::voice::capture::{AttachedSource, SampleSource, samples_to_wav};
use crate::voice::level::{LevelMeter, SilenceMonitor, StopReason};
use crate::voice::payload::AudioPayload;
use crate::{Error, Result};

/// A finished question recording
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    /// WAV-encoded question
    pub payload: AudioPayload,
    /// Captured duration, clamped to the maximum
    pub duration: Duration,
    /// What ended the capture
    pub reason: StopReason,
    /// Number of non-empty chunks buffered
    pub chunks: usize,
}

/// Result of one capture
#[derive(Debug)]
pub enum CaptureOutcome {
    /// Usable audio
    Audio(CapturedAudio),
    /// Nothing was captured at all
    Empty,
    /// Stopped before the minimum duration
    TooShort { duration: Duration },
    /// Capture could not be finalized
    Failed(Error),
}

/// Records questions on request of the controller
pub trait Recorder: Send {
    /// Begin a capture; the outcome arrives as `Event::CaptureFinished`
    ///
    /// # Errors
    ///
    /// Returns error if the capture cannot start
    fn start_capture(&mut self, capture: CaptureId, events: EventSender) -> Result<()>;

    /// Finish the running capture now (no-op if none)
    fn stop_capture(&mut self, reason: StopReason);

    /// Drop the running capture without reporting (no-op if none)
    fn abort(&mut self);

    /// Whether a capture is running
    fn is_capturing(&self) -> bool;
}

enum Control {
    Stop(StopReason),
    Abort,
}

/// Recorder backed by a [`SampleSource`] with silence detection
pub struct SilenceAwareRecorder<S: SampleSource> {
    source: Arc<S>,
    config: CaptureConfig,
    control: Option<oneshot::Sender<Control>>,
}

impl<S: SampleSource> SilenceAwareRecorder<S> {
    /// Create a recorder reading from `source`
    #[must_use]
    pub const fn new(source: Arc<S>, config: CaptureConfig) -> Self {
        Self {
            source,
            config,
            control: None,
        }
    }

    fn signal(&mut self, control: Control) {
        if let Some(tx) = self.control.take() {
            // Receiver is gone when the capture already finished on its own
            let _ = tx.send(control);
        }
    }
}

impl<S: SampleSource> Recorder for SilenceAwareRecorder<S> {
    fn start_capture(&mut self, capture: CaptureId, events: EventSender) -> Result<()> {
        if self.is_capturing() {
            return Err(Error::Audio("a capture is already running".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        self.control = Some(tx);

        tracing::debug!(capture, "capture started");
        tokio::spawn(run_capture(
            Arc::clone(&self.source),
            self.config.clone(),
            capture,
            rx,
            events,
        ));
        Ok(())
    }

    fn stop_capture(&mut self, reason: StopReason) {
        if self.is_capturing() {
            tracing::debug!(%reason, "stopping capture");
        }
        self.signal(Control::Stop(reason));
    }

    fn abort(&mut self) {
        self.signal(Control::Abort);
    }

    fn is_capturing(&self) -> bool {
        self.control.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

impl<S: SampleSource> Drop for SilenceAwareRecorder<S> {
    fn drop(&mut self) {
        self.signal(Control::Abort);
    }
}

async fn run_capture<S: SampleSource>(
    source: Arc<S>,
    config: CaptureConfig,
    capture: CaptureId,
    mut control: oneshot::Receiver<Control>,
    events: EventSender,
) {
    // Detaches on every exit path, including abort and task cancellation
    let attached = AttachedSource::new(source);
    let mut meter = LevelMeter::new(config.level_window);
    let mut monitor = SilenceMonitor::new(&config);
    let mut chunks: Vec<Vec<f32>> = Vec::new();

    let started = Instant::now();
    let mut frames = tokio::time::interval(config.frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    frames.tick().await;

    let reason = loop {
        tokio::select! {
            msg = &mut control => match msg {
                Ok(Control::Stop(reason)) => break reason,
                Ok(Control::Abort) | Err(_) => {
                    tracing::debug!(capture, "capture aborted");
                    return;
                }
            },
            _ = frames.tick() => {
                let frame = attached.take();
                let level = meter.push(&frame);
                if !frame.is_empty() {
                    chunks.push(frame);
                }
                if let Some(reason) = monitor.observe(started.elapsed(), level) {
                    break reason;
                }
            }
        }
    };

    let tail = attached.take();
    if !tail.is_empty() {
        chunks.push(tail);
    }
    let sample_rate = attached.sample_rate();
    drop(attached);

    let outcome = finalize(chunks, sample_rate, started.elapsed(), reason, &config);
    tracing::debug!(capture, %reason, "capture finished");
    events.send(Event::CaptureFinished { capture, outcome });
}

/// Turn buffered chunks into a capture outcome
fn finalize(
    chunks: Vec<Vec<f32>>,
    sample_rate: u32,
    elapsed: Duration,
    reason: StopReason,
    config: &CaptureConfig,
) -> CaptureOutcome {
    if chunks.is_empty() {
        return CaptureOutcome::Empty;
    }

    let duration = elapsed.min(config.max_duration);
    if duration < config.min_duration {
        return CaptureOutcome::TooShort { duration };
    }

    let chunk_count = chunks.len();
    let mut samples = chunks.concat();
    samples.truncate(max_samples(config.max_duration, sample_rate));

    match samples_to_wav(&samples, sample_rate) {
        Ok(bytes) => CaptureOutcome::Audio(CapturedAudio {
            payload: AudioPayload::wav(bytes),
            duration,
            reason,
            chunks: chunk_count,
        }),
        Err(e) => CaptureOutcome::Failed(e),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn max_samples(max_duration: Duration, sample_rate: u32) -> usize {
    (max_duration.as_millis() * u128::from(sample_rate) / 1000) as usize
}
