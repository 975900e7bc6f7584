//! Messages posted to the controller
//!
//! Every external callback (recognizer, recorder, network, player, timers,
//! console) becomes one of these and is consumed by the controller's loop.

use tokio::sync::mpsc;

use crate::Result;
use crate::assistant::timers::TimerName;
use crate::voice::{AudioPayload, CaptureOutcome, RecognizerEvent};

/// Identifies one capture cycle
pub type CaptureId = u64;

/// Identifies one upload/playback cycle
pub type RequestId = u64;

/// An input to the state machine
#[derive(Debug)]
pub enum Event {
    /// Recognizer engine callback, tagged with the session that produced it
    Recognizer {
        session: u64,
        event: RecognizerEvent,
    },

    /// Recorder finished (or failed) a capture
    CaptureFinished {
        capture: CaptureId,
        outcome: CaptureOutcome,
    },

    /// Voice API answered
    InferenceFinished {
        request: RequestId,
        result: Result<AudioPayload>,
    },

    /// Response playback ended
    PlaybackFinished {
        request: RequestId,
        result: Result<()>,
    },

    /// A named timer elapsed
    TimerFired { name: TimerName, generation: u64 },

    /// Operator command
    Command(Command),
}

/// Operator / debug commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Behave as if the wake word was heard; `forced` also leaves the error phase
    Activate { forced: bool },
    /// End the current capture now
    StopCapture,
    /// Leave a fatal error phase and listen again
    Recover,
    /// Tear everything down and exit the loop
    Shutdown,
}

/// Posts events to the controller
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Post an event; returns false once the controller is gone
    pub fn send(&self, event: Event) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(event = ?e.0, "controller gone, event dropped");
                false
            }
        }
    }
}

/// Create the controller's event channel
#[must_use]
pub fn event_channel() -> (EventSender, mpsc::UnboundedReceiver<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
