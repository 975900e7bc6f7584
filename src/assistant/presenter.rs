//! Where status updates go
//!
//! The controller never prints. It reports transitions and status lines to a
//! [`Presenter`], which may draw a UI, write to a console, or record them.

use crate::assistant::state::{Phase, SessionSnapshot};

/// Status prefix shown before every status line
pub const STATUS_PREFIX: &str = "● ";

/// Receives the controller's user-facing output
pub trait Presenter: Send {
    /// The phase changed
    fn phase_changed(&mut self, from: Phase, to: Phase);

    /// Replace the status line
    fn status(&mut self, message: &str);

    /// Show a short-lived hint without replacing the status
    fn hint(&mut self, message: &str);

    /// Show the next idle invitation
    fn idle_phrase(&mut self, phrase: &str);

    /// Debug snapshot after a transition, sent only when `session.debug` is set
    fn snapshot(&mut self, _snapshot: &SessionSnapshot) {}
}

/// Presenter writing to stdout
#[derive(Debug, Default)]
pub struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn phase_changed(&mut self, from: Phase, to: Phase) {
        tracing::debug!(%from, %to, "presenter: phase changed");
    }

    fn status(&mut self, message: &str) {
        println!("{STATUS_PREFIX}{message}");
    }

    fn hint(&mut self, message: &str) {
        println!("  {message}");
    }

    fn idle_phrase(&mut self, phrase: &str) {
        println!("  💭 {phrase}");
    }

    fn snapshot(&mut self, snapshot: &SessionSnapshot) {
        match serde_json::to_string(snapshot) {
            Ok(json) => println!("  [debug] {json}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize snapshot"),
        }
    }
}
