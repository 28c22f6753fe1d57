mod completion;
mod config;
mod countdown;
mod errors;
mod file_logger;
mod identity;
mod ledger;
mod models;
mod planner;
mod platform;
mod resolver;
mod scheduler;
mod store;

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};
use log::{info, warn};
use tokio::sync::RwLock;

pub use completion::{ActionOutcome, CompletionController};
pub use config::{load_settings, save_settings, validate as validate_settings, SETTINGS_KEY};
pub use countdown::CountdownScheduler;
pub use errors::{ReminderError, ReminderResult};
pub use file_logger::LoggerConfig;
pub use identity::{IdentityKind, Namespace, ReminderIdentity};
pub use ledger::CompletionLedger;
pub use models::{
    default_tier_settings, Coordinates, DailyTimes, PlannedReminder, PrayerName, PrayerWindow,
    ReminderSettings, TierConfig, TierSetting, CURRENT_SETTINGS_VERSION, TIER_COUNT,
};
pub use planner::{plan, remaining_minutes, PlanEntry};
pub use platform::{
    ActionEvent, ActionHandler, MemoryPlatform, NotificationPlatform, NotificationRequest,
    Payload, ScheduledNotification, DONE_ACTION_ID,
};
pub use resolver::{FixedTimesSource, PrayerTimesSource, WindowResolver};
pub use scheduler::{reminder_title, ReminderScheduler};
pub use store::{JsonFileStore, KeyValueStore, MemoryStore};

/// Installs the `env_logger` backend once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(false).try_init();
}

type SharedScheduler<P, S, A> = Arc<ReminderScheduler<Arc<P>, Arc<S>, Arc<A>>>;

/// Wires the schedulers, the completion controller and the shared settings together.
///
/// Every entry point the host calls (launch, foreground, settings change,
/// location change, undo) ends in a fresh reconcile of both namespaces.
pub struct ReminderApp<P, S, A> {
    pub config: Arc<RwLock<ReminderSettings>>,
    store: Arc<S>,
    scheduler: SharedScheduler<P, S, A>,
    controller: Arc<CompletionController<Arc<P>, Arc<S>, Arc<A>>>,
    countdown: CountdownScheduler<Arc<P>, Arc<A>>,
}

impl<P, S, A> ReminderApp<P, S, A>
where
    P: NotificationPlatform + 'static,
    S: KeyValueStore + 'static,
    A: PrayerTimesSource + 'static,
{
    /// Loads settings, registers the action handler, replays the launch action and plans.
    pub async fn start(
        platform: Arc<P>,
        store: Arc<S>,
        source: Arc<A>,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<Self> {
        info!("starting prayer reminders");
        let settings = config::load_settings(store.as_ref()).await?;
        match LoggerConfig::from_settings(&settings) {
            Ok(logger) => file_logger::cleanup_old_logs(&logger, now.date_naive()).await,
            Err(err) => warn!("journal cleanup skipped: {err}"),
        }

        let config = Arc::new(RwLock::new(settings));
        let scheduler = Arc::new(
            ReminderScheduler::new(platform.clone(), store.clone(), source.clone()).with_journal(),
        );
        let controller = Arc::new(CompletionController::new(scheduler.clone(), config.clone()));
        let countdown = CountdownScheduler::new(platform.clone(), source);

        platform.set_action_handler(controller.clone()).await;

        let app = Self {
            config,
            store,
            scheduler,
            controller,
            countdown,
        };

        // The launch action may already have reached the live handler; the dedup slot absorbs it.
        match app.controller.replay_last_action(now).await {
            Ok(Some(outcome)) => info!("launch action replayed: {outcome:?}"),
            Ok(None) => {}
            Err(err) => warn!("launch action replay failed: {err}"),
        }

        // A failed first pass must not keep the host from reaching settings.
        if let Err(err) = app.reconcile_all(now).await {
            warn!("initial reconcile failed: {err}");
        }
        Ok(app)
    }

    pub fn scheduler(&self) -> &ReminderScheduler<Arc<P>, Arc<S>, Arc<A>> {
        &self.scheduler
    }

    pub fn controller(&self) -> &CompletionController<Arc<P>, Arc<S>, Arc<A>> {
        &self.controller
    }

    pub async fn settings(&self) -> ReminderSettings {
        self.config.read().await.clone()
    }

    pub async fn on_foreground(&self, now: DateTime<FixedOffset>) -> ReminderResult<usize> {
        self.reconcile_all(now).await
    }

    /// Validates and persists `settings`, then replans with them.
    pub async fn save_settings(
        &self,
        settings: ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ReminderSettings> {
        let saved = config::save_settings(self.store.as_ref(), settings).await?;
        {
            let mut guard = self.config.write().await;
            *guard = saved.clone();
        }
        self.reconcile_all(now).await?;
        Ok(saved)
    }

    pub async fn update_location(
        &self,
        coordinates: Coordinates,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ReminderSettings> {
        info!(
            "location changed to ({}, {})",
            coordinates.latitude, coordinates.longitude
        );
        let mut settings = self.settings().await;
        settings.coordinates = coordinates;
        self.save_settings(settings, now).await
    }

    /// Marks `prayer` done from the app UI, without a notification.
    pub async fn complete(
        &self,
        prayer: PrayerName,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<ActionOutcome> {
        let settings = self.settings().await;
        self.controller.complete(prayer, &settings, now).await
    }

    pub async fn undo(
        &self,
        date: NaiveDate,
        prayer: PrayerName,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<usize> {
        let settings = self.settings().await;
        self.controller.undo(date, prayer, &settings, now).await
    }

    /// Tiered pass then countdown pass; returns the tiered reminder count.
    async fn reconcile_all(&self, now: DateTime<FixedOffset>) -> ReminderResult<usize> {
        let settings = self.settings().await;
        let scheduled = self.scheduler.reconcile(&settings, now).await?;
        if let Err(err) = self.countdown.reconcile(&settings, now).await {
            warn!("countdown pass failed: {err}");
        }
        Ok(scheduled)
    }
}

impl<P, A> ReminderApp<P, JsonFileStore, A>
where
    P: NotificationPlatform + 'static,
    A: PrayerTimesSource + 'static,
{
    /// Starts with the JSON store at [`JsonFileStore::default_path`].
    pub async fn start_with_default_store(
        platform: Arc<P>,
        source: Arc<A>,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<Self> {
        let store = Arc::new(JsonFileStore::new(JsonFileStore::default_path()?));
        Self::start(platform, store, source, now).await
    }
}
