//! Response playback to speakers
//!
//! Replies arrive as encoded clips (WAV or MP3). They are decoded to mono f32,
//! resampled to the speaker rate and played on the default output device.

use std::io::Cursor;
use std::sync::mpsc::{RecvTimeoutError, SyncSender};
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SampleRate, StreamConfig};

use crate::voice::payload::AudioPayload;
use crate::{Error, Result};

/// Preferred speaker rate (matches common TTS output)
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Extra wait past the clip length before giving up on a completion signal
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Time left for the device to flush its last buffer
const FLUSH_TAIL: Duration = Duration::from_millis(100);

/// Plays a reply and resolves when it has finished
#[async_trait]
pub trait ResponsePlayer: Send + Sync {
    /// Play `audio` to completion
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the clip cannot be decoded or played
    async fn play(&self, audio: AudioPayload) -> Result<()>;
}

/// Plays audio on the default output device
pub struct AudioPlayback {
    config: StreamConfig,
}

impl AudioPlayback {
    /// Pick the default speaker
    ///
    /// # Errors
    ///
    /// Returns `Error::Initialization` if no usable output device exists
    pub fn new() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Initialization("no speaker available".to_string()))?;
        let config = output_config(&device)?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            "speaker selected"
        );

        Ok(Self { config })
    }

    /// Rate samples must have for [`Self::play_samples`]
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    /// Play mono samples at [`Self::sample_rate`]
    ///
    /// # Errors
    ///
    /// Returns `Error::Playback` if the output stream fails
    pub async fn play_samples(&self, samples: Vec<f32>) -> Result<()> {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || play_blocking(&config, samples))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

#[async_trait]
impl ResponsePlayer for AudioPlayback {
    async fn play(&self, audio: AudioPayload) -> Result<()> {
        let (samples, sample_rate) = decode_audio(&audio.bytes)?;
        let samples = resample(&samples, sample_rate, self.sample_rate())?;

        tracing::debug!(
            bytes = audio.len(),
            content_type = %audio.content_type,
            source_rate = sample_rate,
            samples = samples.len(),
            "reply decoded"
        );

        self.play_samples(samples).await
    }
}

/// [`PLAYBACK_SAMPLE_RATE`] with the fewest channels, else the device default
fn output_config(device: &Device) -> Result<StreamConfig> {
    let rate = SampleRate(PLAYBACK_SAMPLE_RATE);
    let preferred = device
        .supported_output_configs()
        .map_err(|e| Error::Initialization(format!("cannot query speaker: {e}")))?
        .filter(|range| {
            range.sample_format() == SampleFormat::F32
                && range.min_sample_rate() <= rate
                && rate <= range.max_sample_rate()
        })
        .min_by_key(cpal::SupportedStreamConfigRange::channels);

    if let Some(range) = preferred {
        return Ok(range.with_sample_rate(rate).config());
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::Initialization(format!("speaker has no usable config: {e}")))?;
    tracing::debug!(
        sample_rate = fallback.sample_rate().0,
        "speaker lacks the preferred rate, using its default"
    );
    Ok(fallback.config())
}

enum StreamSignal {
    Drained,
    Failed(String),
}

/// Samples handed to the output callback
struct Feed {
    samples: Vec<f32>,
    position: usize,
    done: Option<SyncSender<StreamSignal>>,
}

impl Feed {
    fn fill(&mut self, data: &mut [f32], channels: usize) {
        for frame in data.chunks_mut(channels) {
            frame.fill(self.samples.get(self.position).copied().unwrap_or(0.0));
            self.position = (self.position + 1).min(self.samples.len());
        }

        if self.position < self.samples.len() {
            return;
        }
        if let Some(done) = self.done.take() {
            let _ = done.try_send(StreamSignal::Drained);
        }
    }
}

/// Play to completion on the calling thread
fn play_blocking(config: &StreamConfig, samples: Vec<f32>) -> Result<()> {
    if samples.is_empty() {
        return Ok(());
    }

    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Playback("speaker disconnected".to_string()))?;

    let channels = usize::from(config.channels).max(1);
    let sample_count = samples.len();
    let length = clip_length(sample_count, config.sample_rate.0);

    let (tx, rx) = std::sync::mpsc::sync_channel(2);
    let errors = tx.clone();
    let mut feed = Feed {
        samples,
        position: 0,
        done: Some(tx),
    };

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| feed.fill(data, channels),
            move |err| {
                tracing::error!(error = %err, "speaker stream error");
                let _ = errors.try_send(StreamSignal::Failed(err.to_string()));
            },
            None,
        )
        .map_err(|e| Error::Playback(format!("cannot open speaker: {e}")))?;
    stream
        .play()
        .map_err(|e| Error::Playback(format!("cannot start speaker: {e}")))?;

    let outcome = rx.recv_timeout(length + DRAIN_GRACE);
    std::thread::sleep(FLUSH_TAIL);
    drop(stream);

    playback_result(outcome, sample_count)
}

/// Turn the output callback's signal into the playback result
fn playback_result(
    outcome: std::result::Result<StreamSignal, RecvTimeoutError>,
    sample_count: usize,
) -> Result<()> {
    match outcome {
        Ok(StreamSignal::Drained) => {
            tracing::debug!(samples = sample_count, "playback complete");
            Ok(())
        }
        Ok(StreamSignal::Failed(e)) => Err(Error::Playback(format!("speaker failed: {e}"))),
        Err(RecvTimeoutError::Timeout) => {
            tracing::warn!(samples = sample_count, "speaker stalled before the clip finished");
            Err(Error::Playback("speaker stalled".to_string()))
        }
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Playback("speaker stream closed unexpectedly".to_string()))
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn clip_length(samples: usize, sample_rate: u32) -> Duration {
    Duration::from_secs_f64(samples as f64 / f64::from(sample_rate.max(1)))
}

/// Decode a WAV or MP3 clip to mono f32 samples and its sample rate
///
/// # Errors
///
/// Returns `Error::Playback` if the bytes are neither valid WAV nor MP3
pub fn decode_audio(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    if bytes.is_empty() {
        return Err(Error::Playback("empty audio reply".to_string()));
    }

    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        decode_wav(bytes)
    } else {
        decode_mp3(bytes)
    }
}

#[allow(clippy::cast_precision_loss)]
fn decode_wav(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?;
    let spec = reader.spec();

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?,
        hound::SampleFormat::Int => {
            let scale = (1_i64 << spec.bits_per_sample.saturating_sub(1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| Error::Playback(format!("WAV decode error: {e}")))?
        }
    };

    Ok((downmix(&interleaved, usize::from(spec.channels)), spec.sample_rate))
}

/// Decode an MP3 clip to mono f32 samples
fn decode_mp3(bytes: &[u8]) -> Result<(Vec<f32>, u32)> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(bytes));
    let mut samples = Vec::new();
    let mut sample_rate = None;

    loop {
        let frame = match decoder.next_frame() {
            Ok(frame) => frame,
            Err(minimp3::Error::Eof) => break,
            Err(minimp3::Error::SkippedData) => continue,
            Err(e) => return Err(Error::Playback(format!("MP3 decode error: {e}"))),
        };
        sample_rate.get_or_insert(frame.sample_rate);
        let pcm: Vec<f32> = frame.data.iter().map(|&s| f32::from(s) / 32768.0).collect();
        samples.extend(downmix(&pcm, frame.channels));
    }

    match sample_rate.and_then(|rate| u32::try_from(rate).ok()) {
        Some(rate) if !samples.is_empty() => Ok((samples, rate)),
        _ => Err(Error::Playback("reply is neither WAV nor MP3".to_string())),
    }
}

/// Average interleaved channels into mono
#[allow(clippy::cast_precision_loss)]
fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Resample audio using rubato
///
/// # Errors
///
/// Returns `Error::Playback` if the resampler cannot be built or fails
#[allow(clippy::cast_possible_truncation)]
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>> {
    use rubato::{FftFixedIn, Resampler};

    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let chunk_size = 1024;
    let sub_chunks = 2;

    let mut resampler =
        FftFixedIn::<f64>::new(from_rate as usize, to_rate as usize, chunk_size, sub_chunks, 1)
            .map_err(|e| Error::Playback(format!("resampler init failed: {e}")))?;

    let mut output = Vec::new();
    for chunk in samples.chunks(chunk_size) {
        // Pad the tail so no input is dropped
        let mut input: Vec<f64> = chunk.iter().map(|&s| f64::from(s)).collect();
        input.resize(chunk_size, 0.0);

        let result = resampler
            .process(&[input], None)
            .map_err(|e| Error::Playback(format!("resample failed: {e}")))?;
        output.extend(result[0].iter().map(|&s| s as f32));
    }

    let expected = (samples.len() as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    output.truncate(expected);
    Ok(output)
}
