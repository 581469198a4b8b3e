//! Reminder timers for today's classes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, NaiveDateTime, TimeDelta};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::notification::{Notification, NotificationPermission, Notifier};
use crate::schedule::{ScheduleEntry, SchoolDay};

/// How long before a class its reminder fires.
pub const LEAD_TIME_MINUTES: i64 = 5;

/// Unique identifier for an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TimerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether any timer is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
}

/// Read-only view of an armed timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmedReminder {
    pub entry_id: String,
    pub fire_at: NaiveDateTime,
    pub timer: TimerId,
}

struct PendingTimer {
    timer: TimerId,
    fire_at: NaiveDateTime,
    handle: JoinHandle<()>,
}

type ArmedSet = Arc<Mutex<HashMap<String, PendingTimer>>>;

/// Owns at most one timer per schedule entry.
///
/// Each new schedule cancels every armed timer before arming its own, under a
/// single lock acquisition.
pub struct ReminderScheduler {
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    icon: Option<String>,
    armed: ArmedSet,
}

impl ReminderScheduler {
    pub fn new(clock: Arc<dyn Clock>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            clock,
            notifier,
            icon: None,
            armed: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Icon attached to every reminder.
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Replace the armed set with timers for `entries`.
    ///
    /// Only entries on today's weekday whose reminder time is still ahead are
    /// armed; the rest are dropped without catch-up. Returns the number armed.
    pub async fn schedule(&self, entries: &[ScheduleEntry]) -> usize {
        let mut armed = self.armed.lock().await;
        cancel_all(&mut armed);

        let permission = self.notifier.permission();
        if permission != NotificationPermission::Granted {
            info!(?permission, "Notifications not permitted, no reminders armed");
            return 0;
        }

        let now = self.clock.now();
        let today = SchoolDay::from_weekday(now.weekday());
        let lead = TimeDelta::minutes(LEAD_TIME_MINUTES);

        for entry in entries {
            if Some(entry.day) != today {
                continue;
            }
            let start = entry.starts_on(now.date());
            if start <= now {
                continue;
            }
            let fire_at = start - lead;
            let Ok(delay) = (fire_at - now).to_std() else {
                debug!(entry = %entry.id, subject = %entry.subject, "Reminder window already passed");
                continue;
            };
            if delay.is_zero() {
                debug!(entry = %entry.id, subject = %entry.subject, "Reminder window already passed");
                continue;
            }

            let timer = TimerId::new();
            let notification = Notification::for_entry(entry, self.icon.as_deref());
            let handle = tokio::spawn(fire(
                self.armed.clone(),
                self.notifier.clone(),
                entry.id.clone(),
                timer,
                delay,
                notification,
            ));

            let pending = PendingTimer {
                timer,
                fire_at,
                handle,
            };
            if let Some(replaced) = armed.insert(entry.id.clone(), pending) {
                replaced.handle.abort();
            }
            debug!(entry = %entry.id, %fire_at, "Reminder armed");
        }

        info!(entries = entries.len(), armed = armed.len(), "Schedule applied");
        armed.len()
    }

    /// Cancel every armed timer.
    pub async fn clear(&self) {
        let mut armed = self.armed.lock().await;
        let cancelled = cancel_all(&mut armed);
        info!(cancelled, "Reminders cleared");
    }

    pub async fn state(&self) -> SchedulerState {
        if self.armed.lock().await.is_empty() {
            SchedulerState::Idle
        } else {
            SchedulerState::Armed
        }
    }

    pub async fn armed_count(&self) -> usize {
        self.armed.lock().await.len()
    }

    /// Armed timers ordered by fire time.
    pub async fn armed(&self) -> Vec<ArmedReminder> {
        let armed = self.armed.lock().await;
        let mut list: Vec<ArmedReminder> = armed
            .iter()
            .map(|(id, pending)| ArmedReminder {
                entry_id: id.clone(),
                fire_at: pending.fire_at,
                timer: pending.timer,
            })
            .collect();
        list.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then_with(|| a.entry_id.cmp(&b.entry_id)));
        list
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        if let Ok(mut armed) = self.armed.try_lock() {
            cancel_all(&mut armed);
        }
    }
}

fn cancel_all(armed: &mut HashMap<String, PendingTimer>) -> usize {
    let count = armed.len();
    for (_, pending) in armed.drain() {
        pending.handle.abort();
    }
    count
}

async fn fire(
    armed: ArmedSet,
    notifier: Arc<dyn Notifier>,
    entry_id: String,
    timer: TimerId,
    delay: std::time::Duration,
    notification: Notification,
) {
    tokio::time::sleep(delay).await;

    {
        let mut armed = armed.lock().await;
        match armed.get(&entry_id) {
            Some(pending) if pending.timer == timer => {
                armed.remove(&entry_id);
            }
            _ => return,
        }
    }

    if let Err(e) = notifier.show(notification) {
        warn!(entry = %entry_id, error = %e, "Reminder not shown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notification::NotificationCenter;
    use chrono::{NaiveDate, NaiveTime};
    use std::time::Duration;

    /// Monday 2024-09-02, 10:00 local.
    fn monday_morning() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 9, 2)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn entry(id: &str, subject: &str, day: SchoolDay, minutes_from_now: i64) -> ScheduleEntry {
        let start = monday_morning() + TimeDelta::minutes(minutes_from_now);
        ScheduleEntry {
            id: id.to_string(),
            day,
            start_time: start.time(),
            end_time: start.time() + TimeDelta::minutes(45),
            subject: subject.to_string(),
            group: "5B".to_string(),
        }
    }

    fn today(id: &str, subject: &str, minutes_from_now: i64) -> ScheduleEntry {
        entry(id, subject, SchoolDay::Monday, minutes_from_now)
    }

    fn setup(permission: NotificationPermission) -> (ReminderScheduler, Arc<NotificationCenter>) {
        let clock = Arc::new(ManualClock::new(monday_morning()));
        let center = Arc::new(NotificationCenter::new(permission));
        (ReminderScheduler::new(clock, center.clone()), center)
    }

    async fn sleep_minutes(minutes: u64) {
        tokio::time::sleep(Duration::from_secs(minutes * 60)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_reminder() {
        let (scheduler, center) = setup(NotificationPermission::Granted);

        assert_eq!(scheduler.schedule(&[today("m1", "Math", 8)]).await, 1);
        assert_eq!(scheduler.state().await, SchedulerState::Armed);
        let armed = scheduler.armed().await;
        assert_eq!(armed[0].entry_id, "m1");
        assert_eq!(armed[0].fire_at, monday_morning() + TimeDelta::minutes(3));

        tokio::time::sleep(Duration::from_secs(3 * 60 - 1)).await;
        assert_eq!(center.shown_count(), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(center.shown_count(), 1);
        let shown = center.get("class-m1").unwrap();
        assert!(shown.title.contains("Math"));
        assert_eq!(shown.title, "Math starts at 10:08");
        assert!(shown.require_interaction);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);

        sleep_minutes(6).await;
        assert_eq!(center.shown_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_class_starting_within_lead_time_is_dropped() {
        let (scheduler, center) = setup(NotificationPermission::Granted);

        assert_eq!(scheduler.schedule(&[today("p1", "Physics", 3)]).await, 0);
        assert_eq!(scheduler.state().await, SchedulerState::Idle);

        sleep_minutes(10).await;
        assert_eq!(center.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exactly_lead_time_is_dropped() {
        let (scheduler, _center) = setup(NotificationPermission::Granted);
        assert_eq!(scheduler.schedule(&[today("p1", "Physics", 5)]).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_cancels_everything() {
        let (scheduler, center) = setup(NotificationPermission::Granted);

        scheduler.schedule(&[today("h1", "History", 30)]).await;
        scheduler.clear().await;
        assert_eq!(scheduler.armed_count().await, 0);

        sleep_minutes(60).await;
        assert_eq!(center.shown_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_schedule_replaces_old() {
        let (scheduler, center) = setup(NotificationPermission::Granted);

        scheduler
            .schedule(&[today("a", "Art", 10), today("b", "Biology", 20)])
            .await;
        scheduler.schedule(&[today("c", "Chemistry", 15)]).await;
        assert_eq!(scheduler.armed_count().await, 1);

        sleep_minutes(30).await;
        assert_eq!(center.shown_count(), 1);
        assert!(center.get("class-c").is_some());
        assert!(center.get("class-a").is_none());
        assert!(center.get("class-b").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_today_and_future() {
        let (scheduler, _center) = setup(NotificationPermission::Granted);

        let armed = scheduler
            .schedule(&[
                entry("tue", "Music", SchoolDay::Tuesday, 30),
                today("past", "Latin", -30),
                today("now", "Greek", 0),
                today("ok", "English", 45),
            ])
            .await;

        assert_eq!(armed, 1);
        assert_eq!(scheduler.armed().await[0].entry_id, "ok");
    }

    #[tokio::test(start_paused = true)]
    async fn test_weekend_arms_nothing() {
        let saturday = NaiveDate::from_ymd_opt(2024, 9, 7)
            .unwrap()
            .and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap());
        let clock = Arc::new(ManualClock::new(saturday));
        let center = Arc::new(NotificationCenter::new(NotificationPermission::Granted));
        let scheduler = ReminderScheduler::new(clock, center);

        let entries: Vec<ScheduleEntry> = [
            SchoolDay::Monday,
            SchoolDay::Tuesday,
            SchoolDay::Wednesday,
            SchoolDay::Thursday,
            SchoolDay::Friday,
        ]
        .into_iter()
        .map(|day| entry("x", "Math", day, 120))
        .collect();
        assert_eq!(scheduler.schedule(&entries).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_ids_later_wins() {
        let (scheduler, center) = setup(NotificationPermission::Granted);

        scheduler
            .schedule(&[today("dup", "Early", 20), today("dup", "Late", 40)])
            .await;
        let armed = scheduler.armed().await;
        assert_eq!(armed.len(), 1);
        assert_eq!(armed[0].fire_at, monday_morning() + TimeDelta::minutes(35));

        sleep_minutes(60).await;
        assert_eq!(center.shown_count(), 1);
        assert_eq!(center.get("class-dup").unwrap().title, "Late starts at 10:40");
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_gates_arming() {
        for permission in [NotificationPermission::Denied, NotificationPermission::Default] {
            let (scheduler, center) = setup(permission);
            assert_eq!(scheduler.schedule(&[today("m1", "Math", 30)]).await, 0);
            sleep_minutes(60).await;
            assert_eq!(center.shown_count(), 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_icon_attached() {
        let (scheduler, center) = setup(NotificationPermission::Granted);
        let scheduler = scheduler.with_icon("/icons/icon-192x192.png");

        scheduler.schedule(&[today("m1", "Math", 10)]).await;
        sleep_minutes(6).await;

        assert_eq!(
            center.get("class-m1").unwrap().icon.as_deref(),
            Some("/icons/icon-192x192.png")
        );
    }
}
