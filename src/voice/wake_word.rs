//! Wake phrase matching
//!
//! Transcripts and phrases are compared after normalization: case-folded,
//! diacritics stripped, punctuation turned into spaces and whitespace collapsed.
//! A wake phrase matches anywhere inside a transcript (the `*prefix phrase *suffix`
//! grammar); a command phrase only matches the whole transcript.

use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::{Error, Result};

/// A successful wake phrase match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeMatch {
    /// Normalized phrase that matched
    pub phrase: String,
    /// Raw transcript the phrase was found in
    pub transcript: String,
}

/// Immutable set of phrases that wake the assistant
#[derive(Debug, Clone)]
pub struct WakePhraseSet {
    phrases: Vec<String>,
    commands: Vec<String>,
}

impl WakePhraseSet {
    /// Create a phrase set
    ///
    /// # Arguments
    ///
    /// * `phrases` - Wake phrases, matched anywhere in a transcript (e.g. "oi inocêncio")
    /// * `commands` - Command phrases, matched only as a whole transcript (e.g. "acordar")
    ///
    /// # Errors
    ///
    /// Returns error if no usable wake phrase remains after normalization
    pub fn new(
        phrases: impl IntoIterator<Item = impl AsRef<str>>,
        commands: impl IntoIterator<Item = impl AsRef<str>>,
    ) -> Result<Self> {
        let phrases = normalize_all(phrases);
        let commands = normalize_all(commands);

        if phrases.is_empty() {
            return Err(Error::Config("wake phrase set is empty".to_string()));
        }

        tracing::debug!(?phrases, ?commands, "wake phrase set initialized");

        Ok(Self { phrases, commands })
    }

    /// Check a single transcript
    #[must_use]
    pub fn find(&self, transcript: &str) -> Option<WakeMatch> {
        let normalized = normalize_transcript(transcript);
        if normalized.is_empty() {
            return None;
        }

        self.phrases
            .iter()
            .find(|p| normalized.contains(p.as_str()))
            .or_else(|| self.commands.iter().find(|c| **c == normalized))
            .map(|phrase| WakeMatch {
                phrase: phrase.clone(),
                transcript: transcript.to_string(),
            })
    }

    /// Check every recognition alternative, best first
    #[must_use]
    pub fn find_any(&self, alternatives: &[String]) -> Option<WakeMatch> {
        alternatives.iter().find_map(|t| self.find(t))
    }

    /// Normalized wake phrases
    #[must_use]
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Normalized command phrases
    #[must_use]
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

fn normalize_all(items: impl IntoIterator<Item = impl AsRef<str>>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let normalized = normalize_transcript(item.as_ref());
        if !normalized.is_empty() && !out.contains(&normalized) {
            out.push(normalized);
        }
    }
    out
}

/// Normalize a transcript for phrase comparison
///
/// `"  Oi, INOCÊNCIO!! "` becomes `"oi inocencio"`.
#[must_use]
pub fn normalize_transcript(text: &str) -> String {
    let folded: String = text
        .to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}
