//! Receptionist session
//!
//! The controller state machine plus everything it schedules and reports:
//! events, timers, phases, status text, and the presenter seam.

pub mod controller;
pub mod events;
pub mod messages;
pub mod presenter;
pub mod state;
pub mod timers;

pub use controller::{Components, Controller, ControllerHandle};
pub use events::{CaptureId, Command, Event, EventSender, RequestId, event_channel};
pub use messages::{IDLE_PHRASES, Messages};
pub use presenter::{ConsolePresenter, Presenter, STATUS_PREFIX};
pub use state::{LastError, Phase, SessionSnapshot};
pub use timers::{TimerName, Timers};
