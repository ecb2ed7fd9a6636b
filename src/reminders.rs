//! Practice reminders: persistence plus translation into pending
//! notification triggers.
//!
//! A reminder with repeat days becomes one weekly trigger per day. A
//! reminder without repeat days is a one-shot that fires at its time on its
//! date, rolled forward by exactly one day when that moment is not in the
//! future.

use anyhow::{anyhow, Result};
use chrono::{Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::Database;
use crate::filter::QuestionFilter;
use crate::models::{CreateReminderRequest, Question, Reminder, UpdateReminderRequest};
use crate::notifications::{NotificationCenter, NotificationTrigger, TriggerSchedule};
use crate::query::QuestionQuery;
use crate::{log_service_success, log_service_warn, log_validation};

const NOTIFICATION_TITLE: &str = "Time to practice";

/// Fire time of a one-shot reminder as seen at `now`
pub fn one_shot_fire_time(time: NaiveTime, date: Option<NaiveDate>, now: NaiveDateTime) -> NaiveDateTime {
    let candidate = match date {
        Some(date) if date.and_time(time) > now => date.and_time(time),
        _ => now.date().and_time(time),
    };
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

pub fn validate_repeat_days(days: &BTreeSet<u8>) -> Result<()> {
    if let Some(day) = days.iter().find(|day| !(1..=7).contains(*day)) {
        let error = anyhow!("Invalid repeat day {}: days must be between 1 and 7", day);
        log_validation!(failure, "reminder", error = error);
        return Err(error);
    }
    Ok(())
}

#[derive(Clone)]
pub struct ReminderScheduler {
    center: Arc<dyn NotificationCenter>,
}

impl ReminderScheduler {
    pub fn new(center: Arc<dyn NotificationCenter>) -> Self {
        Self { center }
    }

    pub fn center(&self) -> &Arc<dyn NotificationCenter> {
        &self.center
    }

    /// Replace every pending trigger of `reminder` with its current schedule
    pub async fn schedule_at(
        &self,
        reminder: &Reminder,
        now: NaiveDateTime,
    ) -> Result<Vec<NotificationTrigger>> {
        self.cancel(reminder.id).await?;
        if !reminder.enabled || reminder.is_deleted {
            debug!(reminder_id = %reminder.id, "Reminder inactive, nothing scheduled");
            return Ok(Vec::new());
        }

        let body = reminder
            .filter
            .as_ref()
            .map(QuestionFilter::summary)
            .unwrap_or_else(|| QuestionFilter::empty().summary());

        let triggers: Vec<NotificationTrigger> = if reminder.is_one_shot() {
            vec![NotificationTrigger {
                identifier: NotificationTrigger::once_identifier(reminder.id),
                reminder_id: reminder.id,
                schedule: TriggerSchedule::Once {
                    at: one_shot_fire_time(reminder.time, reminder.date, now),
                },
                title: NOTIFICATION_TITLE.to_string(),
                body,
            }]
        } else {
            reminder
                .repeat_days
                .iter()
                .map(|&weekday| NotificationTrigger {
                    identifier: NotificationTrigger::weekly_identifier(reminder.id, weekday),
                    reminder_id: reminder.id,
                    schedule: TriggerSchedule::Weekly {
                        weekday,
                        time: reminder.time,
                    },
                    title: NOTIFICATION_TITLE.to_string(),
                    body: body.clone(),
                })
                .collect()
        };

        for trigger in &triggers {
            self.center.add(trigger.clone()).await?;
        }
        debug!(reminder_id = %reminder.id, triggers = triggers.len(), "Reminder scheduled");
        Ok(triggers)
    }

    pub async fn schedule(&self, reminder: &Reminder) -> Result<Vec<NotificationTrigger>> {
        self.schedule_at(reminder, Local::now().naive_local()).await
    }

    /// Remove every pending trigger tagged with `reminder_id`. Safe to repeat.
    pub async fn cancel(&self, reminder_id: Uuid) -> Result<()> {
        let identifiers: Vec<String> = self
            .center
            .pending()
            .await?
            .into_iter()
            .filter(|trigger| trigger.reminder_id == reminder_id)
            .map(|trigger| trigger.identifier)
            .collect();
        if identifiers.is_empty() {
            return Ok(());
        }
        self.center.remove_pending(&identifiers).await
    }
}

#[derive(Clone)]
pub struct ReminderService {
    db: Database,
    scheduler: ReminderScheduler,
}

impl ReminderService {
    pub fn new(db: Database, scheduler: ReminderScheduler) -> Self {
        Self { db, scheduler }
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    /// The stored row wins over pending triggers. A failed hand-off to the
    /// notification center is logged and repaired by the next resync.
    async fn arm(&self, reminder: &Reminder) {
        if let Err(e) = self.scheduler.schedule(reminder).await {
            log_service_warn!(
                "reminder_service",
                "schedule",
                format!("reminder {} left unscheduled: {}", reminder.id, e)
            );
        }
    }

    async fn disarm(&self, id: Uuid) {
        if let Err(e) = self.scheduler.cancel(id).await {
            log_service_warn!(
                "reminder_service",
                "cancel",
                format!("pending triggers of reminder {} not removed: {}", id, e)
            );
        }
    }

    pub async fn list(&self) -> Result<Vec<Reminder>> {
        self.db.list_reminders(false).await
    }

    /// Deleted reminders are treated as absent
    pub async fn get(&self, id: Uuid) -> Result<Option<Reminder>> {
        Ok(self.db.get_reminder(id).await?.filter(|r| !r.is_deleted))
    }

    pub async fn create(&self, request: CreateReminderRequest) -> Result<Reminder> {
        validate_repeat_days(&request.repeat_days)?;

        let now = Utc::now();
        let mut reminder = Reminder {
            id: Uuid::new_v4(),
            time: request.time,
            date: request.date,
            repeat_days: request.repeat_days,
            enabled: request.enabled,
            filter: request.filter,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };
        roll_one_shot_date(&mut reminder, Local::now().naive_local());

        self.db.save_reminder(&reminder).await?;
        self.arm(&reminder).await;
        info!(reminder_id = %reminder.id, one_shot = reminder.is_one_shot(), "Reminder created");
        Ok(reminder)
    }

    pub async fn update(&self, id: Uuid, request: UpdateReminderRequest) -> Result<Option<Reminder>> {
        let Some(mut reminder) = self.get(id).await? else {
            return Ok(None);
        };

        if let Some(days) = request.repeat_days {
            validate_repeat_days(&days)?;
            reminder.repeat_days = days;
        }
        if let Some(time) = request.time {
            reminder.time = time;
        }
        if let Some(date) = request.date {
            reminder.date = Some(date);
        }
        if let Some(enabled) = request.enabled {
            reminder.enabled = enabled;
        }
        if let Some(filter) = request.filter {
            reminder.filter = filter;
        }
        reminder.updated_at = Utc::now();
        roll_one_shot_date(&mut reminder, Local::now().naive_local());

        self.db.save_reminder(&reminder).await?;
        self.arm(&reminder).await;
        log_service_success!("reminder_service", "update", "reminder rescheduled");
        Ok(Some(reminder))
    }

    pub async fn set_enabled(&self, id: Uuid, enabled: bool) -> Result<Option<Reminder>> {
        self.update(
            id,
            UpdateReminderRequest {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
        .await
    }

    /// Tombstone the reminder and drop its pending triggers
    pub async fn delete(&self, id: Uuid) -> Result<bool> {
        let Some(mut reminder) = self.get(id).await? else {
            return Ok(false);
        };
        reminder.is_deleted = true;
        reminder.updated_at = Utc::now();
        self.db.save_reminder(&reminder).await?;
        self.disarm(id).await;
        info!(reminder_id = %id, "Reminder deleted");
        Ok(true)
    }

    /// Record that a reminder fired. One-shot reminders switch off.
    pub async fn mark_fired(&self, id: Uuid) -> Result<Option<Reminder>> {
        let Some(mut reminder) = self.get(id).await? else {
            return Ok(None);
        };
        if reminder.is_one_shot() && reminder.enabled {
            reminder.enabled = false;
            reminder.updated_at = Utc::now();
            self.db.save_reminder(&reminder).await?;
            self.disarm(id).await;
            debug!(reminder_id = %id, "One-shot reminder fired and disabled");
        }
        Ok(Some(reminder))
    }

    /// Random unsolved question matching the reminder's filter
    pub async fn suggest_question(&self, id: Uuid) -> Result<Option<Question>> {
        let Some(reminder) = self.get(id).await? else {
            return Ok(None);
        };
        let filter = reminder.filter.unwrap_or_default();
        let predicate = QuestionQuery::new(filter).only_unsolved(true).compile();
        self.db.random_question(&predicate).await
    }

    /// Re-create pending triggers for every stored reminder
    pub async fn resync(&self) -> Result<usize> {
        self.resync_at(Local::now().naive_local()).await
    }

    /// A one-shot whose moment passed while nothing was running counts as
    /// fired: it is switched off instead of re-armed.
    pub async fn resync_at(&self, now: NaiveDateTime) -> Result<usize> {
        let mut scheduled = 0;
        for mut reminder in self.db.list_reminders(true).await? {
            if reminder.is_deleted {
                self.scheduler.cancel(reminder.id).await?;
                continue;
            }
            let expired = reminder.enabled
                && reminder.is_one_shot()
                && reminder.date.is_some_and(|date| date.and_time(reminder.time) <= now);
            if expired {
                reminder.enabled = false;
                reminder.updated_at = Utc::now();
                self.db.save_reminder(&reminder).await?;
                self.scheduler.cancel(reminder.id).await?;
                info!(reminder_id = %reminder.id, "Expired one-shot reminder disabled");
                continue;
            }
            scheduled += self.scheduler.schedule_at(&reminder, now).await?.len();
        }
        log_service_success!("reminder_service", "resync", count = scheduled, duration_ms = 0u64);
        Ok(scheduled)
    }
}

/// Persist the effective date of a one-shot so it survives restarts
fn roll_one_shot_date(reminder: &mut Reminder, now: NaiveDateTime) {
    if reminder.is_one_shot() {
        reminder.date = Some(one_shot_fire_time(reminder.time, reminder.date, now).date());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Difficulty, SeedQuestion};
    use crate::notifications::InMemoryNotificationCenter;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn reminder(time: NaiveTime, repeat_days: BTreeSet<u8>) -> Reminder {
        Reminder {
            id: Uuid::new_v4(),
            time,
            date: None,
            repeat_days,
            enabled: true,
            filter: None,
            is_deleted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn scheduler() -> ReminderScheduler {
        ReminderScheduler::new(Arc::new(InMemoryNotificationCenter::new()))
    }

    #[test]
    fn test_one_shot_rolls_forward_one_day() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(one_shot_fire_time(nine, None, at(2026, 10, 19, 10, 0)), at(2026, 10, 20, 9, 0));
        assert_eq!(one_shot_fire_time(nine, None, at(2026, 10, 19, 8, 0)), at(2026, 10, 19, 9, 0));
        // Equal to now is not in the future
        assert_eq!(one_shot_fire_time(nine, None, at(2026, 10, 19, 9, 0)), at(2026, 10, 20, 9, 0));

        let future = NaiveDate::from_ymd_opt(2026, 12, 1);
        assert_eq!(one_shot_fire_time(nine, future, at(2026, 10, 19, 10, 0)), at(2026, 12, 1, 9, 0));
        let past = NaiveDate::from_ymd_opt(2026, 1, 1);
        assert_eq!(one_shot_fire_time(nine, past, at(2026, 10, 19, 10, 0)), at(2026, 10, 20, 9, 0));
    }

    #[test]
    fn test_repeat_day_validation() {
        assert!(validate_repeat_days(&BTreeSet::from([1, 4, 7])).is_ok());
        assert!(validate_repeat_days(&BTreeSet::from([0])).is_err());
        assert!(validate_repeat_days(&BTreeSet::from([2, 8])).is_err());
    }

    #[tokio::test]
    async fn test_schedule_one_trigger_per_repeat_day() {
        let scheduler = scheduler();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let weekly = reminder(nine, BTreeSet::from([2, 4, 6]));

        let triggers = scheduler.schedule_at(&weekly, at(2026, 10, 19, 10, 0)).await.unwrap();
        let identifiers: Vec<String> = triggers.iter().map(|t| t.identifier.clone()).collect();
        assert_eq!(
            identifiers,
            vec![
                format!("{}-2", weekly.id),
                format!("{}-4", weekly.id),
                format!("{}-6", weekly.id),
            ]
        );

        // Rescheduling replaces rather than accumulates
        scheduler.schedule_at(&weekly, at(2026, 10, 19, 10, 0)).await.unwrap();
        assert_eq!(scheduler.center().pending().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_disabled_reminder_has_no_triggers() {
        let scheduler = scheduler();
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let mut one_shot = reminder(nine, BTreeSet::new());
        scheduler.schedule_at(&one_shot, at(2026, 10, 19, 10, 0)).await.unwrap();
        assert_eq!(scheduler.center().pending().await.unwrap().len(), 1);

        one_shot.enabled = false;
        let triggers = scheduler.schedule_at(&one_shot, at(2026, 10, 19, 10, 0)).await.unwrap();
        assert!(triggers.is_empty());
        assert!(scheduler.center().pending().await.unwrap().is_empty());

        scheduler.cancel(one_shot.id).await.unwrap();
    }

    async fn create_test_service() -> ReminderService {
        let db = Database::new("sqlite::memory:").await.unwrap();
        db.seed_questions(&[
            SeedQuestion {
                id: 1,
                title: "Two Sum".to_string(),
                body: String::new(),
                difficulty: 1,
                tags: vec!["Array".to_string()],
                companies: vec![],
                top_liked: false,
                top_interviewed: false,
            },
            SeedQuestion {
                id: 2,
                title: "Word Ladder".to_string(),
                body: String::new(),
                difficulty: 3,
                tags: vec!["Graph".to_string()],
                companies: vec![],
                top_liked: false,
                top_interviewed: false,
            },
        ])
        .await
        .unwrap();
        ReminderService::new(db, scheduler())
    }

    #[tokio::test]
    async fn test_create_update_delete_lifecycle() {
        let service = create_test_service().await;
        let created = service
            .create(CreateReminderRequest {
                time: NaiveTime::from_hms_opt(20, 30, 0).unwrap(),
                date: None,
                repeat_days: BTreeSet::from([1, 7]),
                enabled: true,
                filter: None,
            })
            .await
            .unwrap();
        assert_eq!(service.list().await.unwrap().len(), 1);
        assert_eq!(service.scheduler().center().pending().await.unwrap().len(), 2);

        let disabled = service.set_enabled(created.id, false).await.unwrap().unwrap();
        assert!(!disabled.enabled);
        assert!(service.scheduler().center().pending().await.unwrap().is_empty());

        assert!(service.delete(created.id).await.unwrap());
        assert!(service.get(created.id).await.unwrap().is_none());
        assert!(service.list().await.unwrap().is_empty());
        assert!(!service.delete(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_create_rejects_invalid_days() {
        let service = create_test_service().await;
        let result = service
            .create(CreateReminderRequest {
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                date: None,
                repeat_days: BTreeSet::from([9]),
                enabled: true,
                filter: None,
            })
            .await;
        assert!(result.is_err());
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_one_shot_disables_after_firing() {
        let service = create_test_service().await;
        let created = service
            .create(CreateReminderRequest {
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                date: None,
                repeat_days: BTreeSet::new(),
                enabled: true,
                filter: None,
            })
            .await
            .unwrap();
        assert!(created.date.is_some());

        let fired = service.mark_fired(created.id).await.unwrap().unwrap();
        assert!(!fired.enabled);
        assert!(service.scheduler().center().pending().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_suggestion_respects_filter() {
        let service = create_test_service().await;
        let created = service
            .create(CreateReminderRequest {
                time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                date: None,
                repeat_days: BTreeSet::from([2]),
                enabled: true,
                filter: Some(QuestionFilter::empty().with_levels([Difficulty::Hard])),
            })
            .await
            .unwrap();

        let suggestion = service.suggest_question(created.id).await.unwrap().unwrap();
        assert_eq!(suggestion.id, 2);
    }

    #[tokio::test]
    async fn test_resync_restores_pending_triggers() {
        let service = create_test_service().await;
        for days in [BTreeSet::from([2, 3]), BTreeSet::new()] {
            service
                .create(CreateReminderRequest {
                    time: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
                    date: None,
                    repeat_days: days,
                    enabled: true,
                    filter: None,
                })
                .await
                .unwrap();
        }
        let pending = service.scheduler().center().pending().await.unwrap();
        let identifiers: Vec<String> = pending.iter().map(|t| t.identifier.clone()).collect();
        service.scheduler().center().remove_pending(&identifiers).await.unwrap();

        assert_eq!(service.resync().await.unwrap(), 3);
        assert_eq!(service.scheduler().center().pending().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_resync_disables_expired_one_shot() {
        let service = create_test_service().await;
        let mut expired = reminder(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), BTreeSet::new());
        expired.date = NaiveDate::from_ymd_opt(2026, 10, 16);
        let mut upcoming = reminder(NaiveTime::from_hms_opt(9, 0, 0).unwrap(), BTreeSet::new());
        upcoming.date = NaiveDate::from_ymd_opt(2026, 10, 25);
        service.db.save_reminder(&expired).await.unwrap();
        service.db.save_reminder(&upcoming).await.unwrap();

        let scheduled = service.resync_at(at(2026, 10, 19, 10, 0)).await.unwrap();
        assert_eq!(scheduled, 1);

        let pending = service.scheduler().center().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].reminder_id, upcoming.id);
        assert_eq!(pending[0].schedule, TriggerSchedule::Once { at: at(2026, 10, 25, 9, 0) });

        let stored = service.get(expired.id).await.unwrap().unwrap();
        assert!(!stored.enabled);
        assert_eq!(stored.date, NaiveDate::from_ymd_opt(2026, 10, 16));

        // A second launch leaves the disabled reminder alone
        assert_eq!(service.resync_at(at(2026, 10, 20, 10, 0)).await.unwrap(), 1);
        assert_eq!(service.scheduler().center().pending().await.unwrap().len(), 1);

        // Re-enabling rolls the date forward and arms it again
        let enabled = service.set_enabled(expired.id, true).await.unwrap().unwrap();
        assert!(enabled.enabled);
        assert!(enabled.date > NaiveDate::from_ymd_opt(2026, 10, 16));
        assert_eq!(service.scheduler().center().pending().await.unwrap().len(), 2);
    }

    /// Refuses every new trigger
    struct RejectingCenter;

    #[async_trait::async_trait]
    impl NotificationCenter for RejectingCenter {
        async fn add(&self, _trigger: NotificationTrigger) -> Result<()> {
            Err(anyhow!("notifications are not authorized"))
        }

        async fn remove_pending(&self, _identifiers: &[String]) -> Result<()> {
            Ok(())
        }

        async fn pending(&self) -> Result<Vec<NotificationTrigger>> {
            Ok(Vec::new())
        }

        async fn request_authorization(&self) -> Result<bool> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_scheduling_failure_keeps_stored_reminder() {
        let db = Database::new("sqlite::memory:").await.unwrap();
        let service = ReminderService::new(db, ReminderScheduler::new(Arc::new(RejectingCenter)));

        let created = service
            .create(CreateReminderRequest {
                time: NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
                date: None,
                repeat_days: BTreeSet::from([3]),
                enabled: true,
                filter: None,
            })
            .await
            .unwrap();
        let stored = service.get(created.id).await.unwrap().unwrap();
        assert_eq!(stored.repeat_days, BTreeSet::from([3]));
        assert!(stored.enabled);

        let updated = service
            .update(
                created.id,
                UpdateReminderRequest {
                    time: NaiveTime::from_hms_opt(19, 0, 0),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(service.get(created.id).await.unwrap().unwrap().time, updated.time);
        assert!(service.delete(created.id).await.unwrap());
    }
}
