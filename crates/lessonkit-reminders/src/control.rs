//! Control messages from the host page.
//!
//! Messages travel as raw JSON values so that a malformed or unknown message
//! can be logged and dropped by the loop instead of failing at the sender.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::schedule::ScheduleEntry;
use crate::scheduler::ReminderScheduler;
use crate::ReminderError;

/// A message posted by the host page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ControlMessage {
    /// Replace the reminder schedule.
    #[serde(rename = "SCHEDULE_UPDATED")]
    ScheduleUpdated(Vec<ScheduleEntry>),

    /// Cancel every reminder.
    #[serde(rename = "CLEAR_SCHEDULE")]
    ClearSchedule,
}

impl ControlMessage {
    pub fn from_json(json: &str) -> Result<Self, ReminderError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Sending half of the control channel.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::UnboundedSender<Value>,
}

impl ControlSender {
    /// Post a typed message.
    pub fn post(&self, message: &ControlMessage) -> Result<(), ReminderError> {
        let value = serde_json::to_value(message)?;
        self.post_value(value)
    }

    /// Post a raw JSON value.
    pub fn post_value(&self, value: Value) -> Result<(), ReminderError> {
        self.tx.send(value).map_err(|_| ReminderError::ChannelClosed)
    }

    /// Post a message given as JSON text.
    pub fn post_json(&self, json: &str) -> Result<(), ReminderError> {
        let value: Value = serde_json::from_str(json)?;
        self.post_value(value)
    }
}

/// Create the control channel.
pub fn control_channel() -> (ControlSender, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ControlSender { tx }, rx)
}

/// Apply control messages in receipt order until every sender is dropped.
///
/// Returns the number of messages applied.
pub async fn run_control_loop(
    mut rx: mpsc::UnboundedReceiver<Value>,
    scheduler: Arc<ReminderScheduler>,
) -> usize {
    let mut applied = 0;

    while let Some(value) = rx.recv().await {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("<none>")
            .to_string();

        match serde_json::from_value::<ControlMessage>(value) {
            Ok(ControlMessage::ScheduleUpdated(entries)) => {
                let armed = scheduler.schedule(&entries).await;
                debug!(entries = entries.len(), armed, "Schedule updated");
                applied += 1;
            }
            Ok(ControlMessage::ClearSchedule) => {
                scheduler.clear().await;
                applied += 1;
            }
            Err(e) => {
                warn!(message_type = %kind, error = %e, "Dropping control message");
            }
        }
    }

    info!(applied, "Control channel closed");
    applied
}
