//! Voice processing module
//!
//! Handles microphone capture, wake-word recognition, question recording,
//! and reply playback.

mod capture;
mod level;
mod listener;
mod payload;
mod playback;
mod recognizer;
mod recorder;
mod segmenter;
mod stt;
mod wake_word;

pub use capture::{AttachedSource, AudioCapture, MicrophoneTap, SAMPLE_RATE, SampleSource, samples_to_wav};
pub use level::{LevelMeter, SilenceMonitor, StopReason, rms};
pub use listener::{DEFAULT_SESSION_LENGTH, TranscribingEngine};
pub use payload::{AudioPayload, WAV_CONTENT_TYPE};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, ResponsePlayer, decode_audio, resample};
pub use recognizer::{
    ErrorClass, RecognitionEngine, RecognitionErrorKind, RecognizerAdapter, RecognizerEvent,
    RecognizerHandle, RecognizerSignal,
};
pub use recorder::{CaptureOutcome, CapturedAudio, Recorder, SilenceAwareRecorder};
pub use segmenter::{SegmenterState, SpeechSegmenter};
pub use stt::SpeechToText;
pub use wake_word::{WakeMatch, WakePhraseSet, normalize_transcript};
