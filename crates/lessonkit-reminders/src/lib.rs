//! # LessonKit Reminders
//!
//! Turns the weekly class schedule posted by the host page into local
//! notifications raised five minutes before each class starts.
//!
//! ## Flow
//!
//! ```text
//! host page ──post──→ ControlSender ──mpsc──→ run_control_loop
//!                                                  │
//!                                                  ▼
//!                                          ReminderScheduler
//!                                          (one timer per entry)
//!                                                  │ fires
//!                                                  ▼
//!                                          Notifier::show
//! ```

use thiserror::Error;

pub mod clock;
pub mod control;
pub mod notification;
pub mod schedule;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use control::{control_channel, run_control_loop, ControlMessage, ControlSender};
pub use notification::{Notification, NotificationCenter, NotificationPermission, Notifier};
pub use schedule::{ScheduleEntry, SchoolDay};
pub use scheduler::{ArmedReminder, ReminderScheduler, SchedulerState, TimerId, LEAD_TIME_MINUTES};

/// Errors that can occur while handling reminders.
#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Control channel closed")]
    ChannelClosed,
}
