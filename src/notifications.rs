use anyhow::Result;
use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDateTime, NaiveTime};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

/// When a pending notification fires
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerSchedule {
    /// Every week on `weekday` (1 = Sunday through 7 = Saturday)
    Weekly { weekday: u8, time: NaiveTime },
    Once { at: NaiveDateTime },
}

impl TriggerSchedule {
    /// Next fire time strictly after `now`, or `None` once a one-shot has passed
    pub fn next_fire_after(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            TriggerSchedule::Weekly { weekday, time } => {
                let today = now.date().weekday().number_from_sunday() as i64;
                let days_ahead = (*weekday as i64 - today).rem_euclid(7);
                let candidate = (now.date() + Duration::days(days_ahead)).and_time(*time);
                if candidate > now {
                    Some(candidate)
                } else {
                    Some(candidate + Duration::days(7))
                }
            }
            TriggerSchedule::Once { at } => (*at > now).then_some(*at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationTrigger {
    pub identifier: String,
    pub reminder_id: Uuid,
    pub schedule: TriggerSchedule,
    pub title: String,
    pub body: String,
}

impl NotificationTrigger {
    pub fn weekly_identifier(reminder_id: Uuid, weekday: u8) -> String {
        format!("{}-{}", reminder_id, weekday)
    }

    pub fn once_identifier(reminder_id: Uuid) -> String {
        format!("{}-once", reminder_id)
    }
}

/// Platform notification scheduler
#[async_trait]
pub trait NotificationCenter: Send + Sync {
    /// Add a pending trigger, replacing any with the same identifier
    async fn add(&self, trigger: NotificationTrigger) -> Result<()>;

    /// Remove pending triggers by identifier. Unknown identifiers are ignored.
    async fn remove_pending(&self, identifiers: &[String]) -> Result<()>;

    async fn pending(&self) -> Result<Vec<NotificationTrigger>>;

    async fn request_authorization(&self) -> Result<bool>;
}

/// Keeps pending triggers in memory and logs instead of delivering
#[derive(Debug, Default)]
pub struct InMemoryNotificationCenter {
    pending: Mutex<Vec<NotificationTrigger>>,
}

impl InMemoryNotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NotificationCenter for InMemoryNotificationCenter {
    async fn add(&self, trigger: NotificationTrigger) -> Result<()> {
        let mut pending = self.pending.lock().await;
        pending.retain(|existing| existing.identifier != trigger.identifier);
        debug!(
            identifier = %trigger.identifier,
            reminder_id = %trigger.reminder_id,
            schedule = ?trigger.schedule,
            "Notification trigger added"
        );
        pending.push(trigger);
        Ok(())
    }

    async fn remove_pending(&self, identifiers: &[String]) -> Result<()> {
        let mut pending = self.pending.lock().await;
        let before = pending.len();
        pending.retain(|trigger| !identifiers.contains(&trigger.identifier));
        debug!(removed = before - pending.len(), "Pending notification triggers removed");
        Ok(())
    }

    async fn pending(&self) -> Result<Vec<NotificationTrigger>> {
        Ok(self.pending.lock().await.clone())
    }

    async fn request_authorization(&self) -> Result<bool> {
        info!("Notification authorization granted (in-memory center)");
        Ok(true)
    }
}
