//! Binary audio exchanged with the voice API

/// MIME type of captured questions
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

/// An encoded audio clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPayload {
    /// Encoded bytes (WAV, MP3, ...)
    pub bytes: Vec<u8>,
    /// MIME type, e.g. `audio/wav`
    pub content_type: String,
}

impl AudioPayload {
    /// Wrap encoded bytes
    #[must_use]
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Wrap WAV bytes
    #[must_use]
    pub fn wav(bytes: Vec<u8>) -> Self {
        Self::new(bytes, WAV_CONTENT_TYPE)
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the payload holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether the bytes carry a RIFF/WAVE header
    #[must_use]
    pub fn is_wav(&self) -> bool {
        self.bytes.len() >= 12 && &self.bytes[0..4] == b"RIFF" && &self.bytes[8..12] == b"WAVE"
    }

    /// Size in kilobytes, for logs
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn kib(&self) -> f64 {
        self.bytes.len() as f64 / 1024.0
    }
}
