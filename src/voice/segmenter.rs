//! Energy-based speech segmentation
//!
//! Splits a continuous audio stream into utterances: speech starts when a
//! chunk's energy crosses a threshold and ends after enough trailing silence.
//! Finished segments are handed off for transcription.

use crate::voice::level::rms;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to keep a segment (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Silence duration to consider end of utterance (in samples)
const SILENCE_SAMPLES: usize = 8000; // 0.5 seconds

/// Segments longer than this are flushed without waiting for silence
const MAX_SEGMENT_SAMPLES: usize = 80_000; // 5 seconds

/// State of the segmenter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmenterState {
    /// Waiting for speech
    Idle,
    /// Accumulating an utterance
    Speaking,
}

/// Splits audio into speech segments
#[derive(Debug)]
pub struct SpeechSegmenter {
    state: SegmenterState,
    buffer: Vec<f32>,
    silence_counter: usize,
}

impl Default for SpeechSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechSegmenter {
    /// Create an idle segmenter
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: SegmenterState::Idle,
            buffer: Vec::new(),
            silence_counter: 0,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns a finished segment once speech is followed by enough silence,
    /// or when the segment grows past the maximum length.
    pub fn process(&mut self, samples: &[f32]) -> Option<Vec<f32>> {
        if samples.is_empty() {
            return None;
        }

        let energy = rms(samples);
        let is_speech = energy > ENERGY_THRESHOLD;

        match self.state {
            SegmenterState::Idle => {
                if is_speech {
                    self.state = SegmenterState::Speaking;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech detected");
                }
                None
            }
            SegmenterState::Speaking => {
                self.buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.buffer.len() >= MAX_SEGMENT_SAMPLES {
                    tracing::debug!(samples = self.buffer.len(), "segment hit maximum length");
                    return Some(self.finish());
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    let voiced = self.buffer.len().saturating_sub(self.silence_counter);
                    if voiced > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.buffer.len(), "speech segment complete");
                        return Some(self.finish());
                    }
                    tracing::trace!(voiced, "segment too short, discarded");
                    self.reset();
                }

                None
            }
        }
    }

    fn finish(&mut self) -> Vec<f32> {
        let segment = std::mem::take(&mut self.buffer);
        self.reset();
        segment
    }

    /// Drop any partial segment
    pub fn reset(&mut self) {
        self.state = SegmenterState::Idle;
        self.buffer.clear();
        self.silence_counter = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> SegmenterState {
        self.state
    }

    /// Samples buffered for the current segment
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
