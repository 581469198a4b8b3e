//! Local notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::schedule::ScheduleEntry;
use crate::ReminderError;

/// Default notification icon, relative to the app origin.
pub const DEFAULT_ICON: &str = "/icons/icon-192x192.png";

/// A notification ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    /// Stays on screen until the user dismisses it.
    pub require_interaction: bool,
    pub icon: Option<String>,
}

impl Notification {
    /// The reminder raised ahead of a class.
    pub fn for_entry(entry: &ScheduleEntry, icon: Option<&str>) -> Self {
        let start = entry.start_time.format("%H:%M");
        let end = entry.end_time.format("%H:%M");
        Self {
            title: format!("{} starts at {}", entry.subject, start),
            body: format!("Class {} · {}–{}", entry.group, start, end),
            tag: format!("class-{}", entry.id),
            require_interaction: true,
            icon: icon.map(str::to_string),
        }
    }
}

/// Whether the user allows notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationPermission {
    Granted,
    Denied,
    /// Not decided yet; treated as not granted.
    #[default]
    Default,
}

/// Platform notification capability.
pub trait Notifier: Send + Sync {
    fn permission(&self) -> NotificationPermission;

    fn show(&self, notification: Notification) -> Result<(), ReminderError>;
}

/// In-process notifier that keeps the visible notifications by tag.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    permission: Mutex<NotificationPermission>,
    visible: Mutex<HashMap<String, Notification>>,
    shown: AtomicUsize,
}

impl NotificationCenter {
    pub fn new(permission: NotificationPermission) -> Self {
        Self {
            permission: Mutex::new(permission),
            ..Default::default()
        }
    }

    pub fn set_permission(&self, permission: NotificationPermission) {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner) = permission;
    }

    /// Currently visible notifications, sorted by tag.
    pub fn visible(&self) -> Vec<Notification> {
        let visible = self.visible.lock().unwrap_or_else(PoisonError::into_inner);
        let mut list: Vec<Notification> = visible.values().cloned().collect();
        list.sort_by(|a, b| a.tag.cmp(&b.tag));
        list
    }

    pub fn get(&self, tag: &str) -> Option<Notification> {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tag)
            .cloned()
    }

    /// Dismiss a notification.
    pub fn close(&self, tag: &str) -> bool {
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag)
            .is_some()
    }

    /// Total number of notifications ever shown, replacements included.
    pub fn shown_count(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }
}

impl Notifier for NotificationCenter {
    fn permission(&self) -> NotificationPermission {
        *self.permission.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn show(&self, notification: Notification) -> Result<(), ReminderError> {
        if self.permission() != NotificationPermission::Granted {
            return Err(ReminderError::Notification("permission not granted".to_string()));
        }

        info!(
            tag = %notification.tag,
            title = %notification.title,
            body = %notification.body,
            "Notification shown"
        );
        self.visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(notification.tag.clone(), notification);
        self.shown.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::SchoolDay;
    use chrono::NaiveTime;

    fn math() -> ScheduleEntry {
        ScheduleEntry {
            id: "7".to_string(),
            day: SchoolDay::Monday,
            start_time: NaiveTime::from_hms_opt(10, 8, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(10, 53, 0).unwrap(),
            subject: "Math".to_string(),
            group: "5B".to_string(),
        }
    }

    #[test]
    fn test_notification_content() {
        let n = Notification::for_entry(&math(), Some(DEFAULT_ICON));
        assert_eq!(n.title, "Math starts at 10:08");
        assert_eq!(n.body, "Class 5B · 10:08–10:53");
        assert_eq!(n.tag, "class-7");
        assert!(n.require_interaction);
        assert_eq!(n.icon.as_deref(), Some(DEFAULT_ICON));
    }

    #[test]
    fn test_same_tag_replaces() {
        let center = NotificationCenter::new(NotificationPermission::Granted);
        center.show(Notification::for_entry(&math(), None)).unwrap();
        center.show(Notification::for_entry(&math(), None)).unwrap();

        assert_eq!(center.visible().len(), 1);
        assert_eq!(center.shown_count(), 2);
        assert!(center.close("class-7"));
        assert!(center.get("class-7").is_none());
    }

    #[test]
    fn test_show_requires_permission() {
        let center = NotificationCenter::default();
        assert_eq!(center.permission(), NotificationPermission::Default);
        assert!(matches!(
            center.show(Notification::for_entry(&math(), None)),
            Err(ReminderError::Notification(_))
        ));

        center.set_permission(NotificationPermission::Granted);
        assert!(center.show(Notification::for_entry(&math(), None)).is_ok());
    }
}
