//! Inocêncio - wake-word virtual receptionist
//!
//! This library provides the core of a voice receptionist that sleeps until
//! its name is spoken, records a question, sends it to a remote voice API and
//! plays back the spoken answer:
//! - Wake-word recognition over a swappable engine
//! - Silence-aware question capture from a shared microphone
//! - Remote inference client (`POST /voice`)
//! - Reply decoding and playback
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Controller                        │
//! │   phases  │  named timers  │  recovery  │  snapshot  │
//! └──────┬──────────┬──────────────┬──────────────┬─────┘
//!        │          │              │              │
//! ┌──────▼───┐ ┌────▼─────┐ ┌──────▼──────┐ ┌─────▼─────┐
//! │Recognizer│ │ Recorder │ │  Voice API  │ │  Player   │
//! └──────┬───┘ └────┬─────┘ └─────────────┘ └───────────┘
//!        └────┬─────┘
//!      ┌──────▼──────┐
//!      │ Microphone  │
//!      └─────────────┘
//! ```

pub mod api;
pub mod assistant;
pub mod config;
pub mod error;
pub mod voice;

pub use api::{VoiceApiClient, VoiceBackend};
pub use assistant::{Command, Components, Controller, ControllerHandle, Phase, SessionSnapshot};
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
