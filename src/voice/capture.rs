//! Microphone input
//!
//! The input stream is opened once per session and shared. Consumers read it
//! through [`MicrophoneTap`]s, and the callback only buffers while at least
//! one tap is attached, so an idle receptionist never accumulates audio.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BuildStreamError, Device, SampleFormat, SampleRate, Stream, StreamConfig};

use crate::{Error, Result};

/// Rate every consumer sees (16kHz, speech)
pub const SAMPLE_RATE: u32 = 16000;

/// A source of mono f32 samples that consumers attach to and drain
pub trait SampleSource: Send + Sync + 'static {
    /// Sample rate of the drained samples
    fn sample_rate(&self) -> u32;

    /// Start buffering from a clean slate
    fn attach(&self);

    /// Take everything buffered since the last call
    fn take(&self) -> Vec<f32>;

    /// Stop buffering and drop anything pending
    fn detach(&self);
}

#[derive(Default)]
struct Shared {
    buffer: Mutex<Vec<f32>>,
    listeners: AtomicUsize,
}

impl Shared {
    /// Called from the audio thread with interleaved frames
    fn push_interleaved(&self, data: &[f32], channels: usize) {
        if self.listeners.load(Ordering::Acquire) == 0 {
            return;
        }
        let Ok(mut buffer) = self.buffer.lock() else {
            return;
        };
        if channels <= 1 {
            buffer.extend_from_slice(data);
        } else {
            #[allow(clippy::cast_precision_loss)]
            let scale = 1.0 / channels as f32;
            buffer.extend(data.chunks(channels).map(|frame| frame.iter().sum::<f32>() * scale));
        }
    }

    fn clear(&self) {
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.clear();
        }
    }
}

/// The session's microphone
pub struct AudioCapture {
    device: Device,
    config: StreamConfig,
    shared: Arc<Shared>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Pick the default input device and a 16kHz configuration
    ///
    /// Mono is preferred; multi-channel devices are downmixed.
    ///
    /// # Errors
    ///
    /// Returns `Error::Permission` if there is no usable microphone and
    /// `Error::Initialization` if it cannot record at [`SAMPLE_RATE`]
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Permission("no microphone available".to_string()))?;
        let config = negotiate(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "microphone selected"
        );

        Ok(Self {
            device,
            config,
            shared: Arc::new(Shared::default()),
            stream: None,
        })
    }

    /// Open the input stream (no-op when already open)
    ///
    /// # Errors
    ///
    /// Returns `Error::Permission` if the stream is refused
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let shared = Arc::clone(&self.shared);
        let channels = usize::from(self.config.channels);
        let stream = self
            .device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| shared.push_interleaved(data, channels),
                |err| tracing::error!(error = %err, "microphone stream error"),
                None,
            )
            .map_err(open_error)?;

        stream
            .play()
            .map_err(|e| Error::Permission(format!("microphone refused to start: {e}")))?;
        self.stream = Some(stream);

        tracing::info!(channels, "microphone stream opened");
        Ok(())
    }

    /// Close the input stream
    pub fn stop(&mut self) {
        if self.stream.take().is_some() {
            self.shared.clear();
            tracing::debug!("microphone stream closed");
        }
    }

    /// A tap onto the shared buffer
    #[must_use]
    pub fn tap(&self) -> MicrophoneTap {
        MicrophoneTap {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Rate of the samples handed to taps
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }
}

/// Choose a stream config at [`SAMPLE_RATE`], fewest channels and f32 first
fn negotiate(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(SAMPLE_RATE);
    let mut candidates: Vec<_> = device
        .supported_input_configs()
        .map_err(|e| Error::Permission(format!("cannot query microphone: {e}")))?
        .filter(|range| range.min_sample_rate() <= rate && rate <= range.max_sample_rate())
        .collect();
    candidates.sort_by_key(|range| (range.sample_format() != SampleFormat::F32, range.channels()));

    candidates
        .into_iter()
        .next()
        .map(|range| range.with_sample_rate(rate).config())
        .ok_or_else(|| {
            Error::Initialization(format!("microphone cannot record at {SAMPLE_RATE} Hz"))
        })
}

fn open_error(error: BuildStreamError) -> Error {
    match error {
        BuildStreamError::DeviceNotAvailable => {
            Error::Permission("microphone disconnected or in use".to_string())
        }
        other => Error::Permission(format!("microphone unavailable: {other}")),
    }
}

/// Handle onto the shared microphone buffer
///
/// Cheap to clone and `Send`, unlike the stream itself.
#[derive(Clone)]
pub struct MicrophoneTap {
    shared: Arc<Shared>,
}

impl SampleSource for MicrophoneTap {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn attach(&self) {
        self.shared.clear();
        self.shared.listeners.fetch_add(1, Ordering::AcqRel);
    }

    fn take(&self) -> Vec<f32> {
        self.shared
            .buffer
            .lock()
            .map(|mut buffer| std::mem::take(&mut *buffer))
            .unwrap_or_default()
    }

    fn detach(&self) {
        let previous = self
            .shared
            .listeners
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.shared.clear();
        }
    }
}
/// Detaches its source when dropped
///
/// Holding one of these is what keeps a consumer connected to the microphone;
/// every exit path of the consumer releases it.
pub struct AttachedSource<S: SampleSource> {
    source: Arc<S>,
}

impl<S: SampleSource> AttachedSource<S> {
    /// Attach to `source`
    #[must_use]
    pub fn new(source: Arc<S>) -> Self {
        source.attach();
        Self { source }
    }

    /// Drain pending samples
    #[must_use]
    pub fn take(&self) -> Vec<f32> {
        self.source.take()
    }

    /// Sample rate of the underlying source
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.source.sample_rate()
    }
}

impl<S: SampleSource> Drop for AttachedSource<S> {
    fn drop(&mut self) {
        self.source.detach();
        tracing::trace!("sample source detached");
    }
}

/// Encode mono samples as 16-bit PCM WAV
///
/// # Errors
///
/// Returns `Error::Audio` if encoding fails or the clip is too long for WAV
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let count = u32::try_from(samples.len())
        .map_err(|_| Error::Audio("recording too long to encode".to_string()))?;

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).map_err(wav_error)?;
    let mut pcm = writer.get_i16_writer(count);
    for &sample in samples {
        pcm.write_sample(to_pcm16(sample));
    }
    pcm.flush().map_err(wav_error)?;
    writer.finalize().map_err(wav_error)?;

    Ok(bytes)
}

#[allow(clippy::cast_possible_truncation)]
fn to_pcm16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)).round() as i16
}

fn wav_error(error: hound::Error) -> Error {
    Error::Audio(format!("WAV encoding failed: {error}"))
}
