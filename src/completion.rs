use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Local, NaiveDate};
use log::{debug, info, warn};
use serde_json::json;
use tokio::sync::RwLock;

use crate::errors::{ReminderError, ReminderResult};
use crate::file_logger;
use crate::identity::ReminderIdentity;
use crate::models::{PrayerName, ReminderSettings};
use crate::platform::{ActionEvent, ActionHandler, NotificationPlatform, DONE_ACTION_ID};
use crate::resolver::{previous_day, PrayerTimesSource};
use crate::scheduler::{cancel_matching, ReminderScheduler};
use crate::store::KeyValueStore;

/// Store key holding the last response that was handled, checked before a cold-start replay.
const HANDLED_ACTION_KEY: &str = "last_handled_action";

/// Identity of one platform response: the notification it came from and the button pressed.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ActionIdentity {
    notification_id: String,
    action_id: String,
}

impl ActionIdentity {
    fn of(event: &ActionEvent) -> Self {
        Self {
            notification_id: event.notification_id.clone(),
            action_id: event.action_id.clone(),
        }
    }

    fn stored_form(&self) -> String {
        format!("{}|{}", self.action_id, self.notification_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed {
        date: NaiveDate,
        prayer: PrayerName,
        cancelled: usize,
    },
    /// Same response already handled, e.g. cold-start replay after the live listener.
    Duplicate,
    /// Not a "done" action, or the prayer cannot be completed.
    Ignored,
}

/// Handles "done" and undo for a single prayer window.
pub struct CompletionController<P, S, A> {
    scheduler: Arc<ReminderScheduler<P, S, A>>,
    settings: Arc<RwLock<ReminderSettings>>,
    last_handled: Mutex<Option<ActionIdentity>>,
}

impl<P, S, A> CompletionController<P, S, A>
where
    P: NotificationPlatform,
    S: KeyValueStore,
    A: PrayerTimesSource,
{
    pub fn new(
        scheduler: Arc<ReminderScheduler<P, S, A>>,
        settings: Arc<RwLock<ReminderSettings>>,
    ) -> Self {
        Self {
            scheduler,
            settings,
            last_handled: Mutex::new(None),
        }
    }

    /// Processes a platform response, skipping an exact repeat of the last one handled.
    ///
    /// The response is remembered only after the ledger write and the cancels
    /// succeed, so a failed attempt is retried on the next delivery.
    pub async fn handle_action(
        &self,
        event: &ActionEvent,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ActionOutcome> {
        let identity = ActionIdentity::of(event);
        if self.already_handled(&identity) {
            debug!("ignoring repeated action for {}", event.notification_id);
            return Ok(ActionOutcome::Duplicate);
        }

        if event.action_id != DONE_ACTION_ID {
            debug!(
                "action '{}' on {} is not a completion",
                event.action_id, event.notification_id
            );
            return Ok(ActionOutcome::Ignored);
        }

        let (date, prayer) = self.target_of(event, settings, now)?;
        if !prayer.is_actionable() {
            return Ok(ActionOutcome::Ignored);
        }

        let today = now.date_naive();
        if date != today && date != previous_day(today)? {
            info!(
                "ignoring stale completion of {} for {date} from {}",
                prayer.slug(),
                event.notification_id
            );
            return Ok(ActionOutcome::Ignored);
        }

        let outcome = self.complete_window(date, prayer, settings, now).await?;
        self.remember(identity.clone());
        self.record_handled(&identity).await;
        Ok(outcome)
    }

    /// Marks `prayer` done for the window the user is in and cancels its pending reminders.
    pub async fn complete(
        &self,
        prayer: PrayerName,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ActionOutcome> {
        if !prayer.is_actionable() {
            return Err(ReminderError::InvalidAction(format!(
                "{} cannot be completed",
                prayer.slug()
            )));
        }

        let date = self
            .scheduler
            .resolver()
            .attributed_date(prayer, now, settings.coordinates)?;
        self.complete_window(date, prayer, settings, now).await
    }

    async fn complete_window(
        &self,
        date: NaiveDate,
        prayer: PrayerName,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ActionOutcome> {
        self.scheduler.ledger().mark_satisfied(date, prayer).await?;

        let today = now.date_naive();
        let yesterday = previous_day(today)?;
        let cancelled = cancel_matching(self.scheduler.platform(), |identity| {
            identity.matches_window(today, prayer) || identity.matches_window(yesterday, prayer)
        })
        .await?
        .into_result()?;

        info!(
            "{} completed for {date}, cancelled {cancelled} pending notification(s)",
            prayer.slug()
        );
        if self.scheduler.journal_enabled() {
            let details = json!({
                "prayer": prayer.slug(),
                "date": date.format("%Y-%m-%d").to_string(),
                "cancelled": cancelled,
            });
            self.scheduler
                .journal_append(settings, file_logger::event_entry(now, "complete", Some(details)))
                .await;
        }

        Ok(ActionOutcome::Completed {
            date,
            prayer,
            cancelled,
        })
    }

    /// Window a response refers to.
    ///
    /// Ids this crate issued carry their own date and prayer. Otherwise the
    /// payload names the prayer, with its `date` or the midnight rule at `now`.
    fn target_of(
        &self,
        event: &ActionEvent,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<(NaiveDate, PrayerName)> {
        if let Some(identity) = ReminderIdentity::parse(&event.notification_id) {
            return Ok((identity.attributed_date, identity.prayer));
        }

        let prayer = event
            .payload
            .get("prayer")
            .and_then(|slug| PrayerName::from_slug(slug))
            .ok_or_else(|| {
                ReminderError::InvalidAction(format!(
                    "cannot tell which prayer {} belongs to",
                    event.notification_id
                ))
            })?;
        let date = match event
            .payload
            .get("date")
            .and_then(|raw| NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok())
        {
            Some(date) => date,
            None => self
                .scheduler
                .resolver()
                .attributed_date(prayer, now, settings.coordinates)?,
        };
        Ok((date, prayer))
    }

    /// Reverts a completion and replans so the window's reminders resume.
    pub async fn undo(
        &self,
        date: NaiveDate,
        prayer: PrayerName,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<usize> {
        self.scheduler.ledger().unmark(date, prayer).await?;
        if self.scheduler.journal_enabled() {
            let details = json!({
                "prayer": prayer.slug(),
                "date": date.format("%Y-%m-%d").to_string(),
            });
            self.scheduler
                .journal_append(settings, file_logger::event_entry(now, "undo", Some(details)))
                .await;
        }
        self.scheduler.reconcile(settings, now).await
    }

    /// Handles the response that launched the app, if the platform kept one.
    ///
    /// Platforms keep that response across launches, so one already handled
    /// in an earlier run is reported as a duplicate.
    pub async fn replay_last_action(&self, now: DateTime<FixedOffset>) -> ReminderResult<Option<ActionOutcome>> {
        let Some(event) = self.scheduler.platform().last_action().await? else {
            return Ok(None);
        };
        let identity = ActionIdentity::of(&event);
        if self.handled_in_earlier_run(&identity).await {
            debug!("launch action on {} was handled before", event.notification_id);
            return Ok(Some(ActionOutcome::Duplicate));
        }
        let settings = self.settings.read().await.clone();
        self.handle_action(&event, &settings, now).await.map(Some)
    }

    async fn handled_in_earlier_run(&self, identity: &ActionIdentity) -> bool {
        match self.scheduler.ledger().store().get(HANDLED_ACTION_KEY).await {
            Ok(stored) => stored.as_deref() == Some(identity.stored_form().as_str()),
            Err(err) => {
                warn!("failed to read last handled action: {err}");
                false
            }
        }
    }

    async fn record_handled(&self, identity: &ActionIdentity) {
        let store = self.scheduler.ledger().store();
        if let Err(err) = store.set(HANDLED_ACTION_KEY, &identity.stored_form()).await {
            warn!("failed to record handled action: {err}");
        }
    }

    fn already_handled(&self, identity: &ActionIdentity) -> bool {
        match self.last_handled.lock() {
            Ok(last) => last.as_ref() == Some(identity),
            Err(poisoned) => poisoned.into_inner().as_ref() == Some(identity),
        }
    }

    fn remember(&self, identity: ActionIdentity) {
        match self.last_handled.lock() {
            Ok(mut last) => *last = Some(identity),
            Err(poisoned) => *poisoned.into_inner() = Some(identity),
        }
    }
}

#[async_trait]
impl<P, S, A> ActionHandler for CompletionController<P, S, A>
where
    P: NotificationPlatform,
    S: KeyValueStore,
    A: PrayerTimesSource,
{
    async fn on_action(&self, event: ActionEvent) {
        let settings = self.settings.read().await.clone();
        let now = Local::now().fixed_offset();
        if let Err(err) = self.handle_action(&event, &settings, now).await {
            warn!(
                "failed to handle action '{}' on {}: {}",
                event.action_id, event.notification_id, err
            );
        }
    }
}
