use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, error, info, warn};
use serde_json::json;

use crate::errors::{ReminderError, ReminderResult};
use crate::file_logger::{self, LoggerConfig};
use crate::identity::{Namespace, ReminderIdentity};
use crate::ledger::CompletionLedger;
use crate::models::{PlannedReminder, PrayerName, PrayerWindow, ReminderSettings};
use crate::planner;
use crate::platform::{NotificationPlatform, NotificationRequest, Payload};
use crate::resolver::{PrayerTimesSource, WindowResolver};
use crate::store::KeyValueStore;

/// Counts from one cancel sweep over the platform listing.
#[derive(Debug, Default)]
pub(crate) struct CancelReport {
    pub cancelled: usize,
    pub failures: Vec<String>,
}

impl CancelReport {
    /// Turns recorded cancel failures into an error for callers that must retry.
    pub fn into_result(self) -> ReminderResult<usize> {
        if self.failures.is_empty() {
            Ok(self.cancelled)
        } else {
            Err(ReminderError::PlatformSchedule(self.failures.join("; ")))
        }
    }
}

/// Cancels every listed notification whose parsed identity satisfies `owned`.
///
/// Ids that do not parse belong to someone else and are left alone. A failed
/// cancel is recorded and the sweep continues.
pub(crate) async fn cancel_matching<P, F>(platform: &P, owned: F) -> ReminderResult<CancelReport>
where
    P: NotificationPlatform + ?Sized,
    F: Fn(&ReminderIdentity) -> bool,
{
    let listed = platform.list_scheduled().await?;
    let mut report = CancelReport::default();
    for scheduled in listed {
        let Some(identity) = ReminderIdentity::parse(&scheduled.id) else {
            continue;
        };
        if !owned(&identity) {
            continue;
        }
        match platform.cancel(&scheduled.id).await {
            Ok(()) => report.cancelled += 1,
            Err(err) => {
                warn!("failed to cancel {}: {}", scheduled.id, err);
                report.failures.push(err.to_string());
            }
        }
    }
    Ok(report)
}

#[derive(Debug, Default)]
struct PassReport {
    cancelled: usize,
    windows: usize,
    scheduled: usize,
    dismissals: usize,
    failures: usize,
}

/// Owns the tiered reminder namespace and rebuilds it on every pass.
pub struct ReminderScheduler<P, S, A> {
    platform: P,
    ledger: CompletionLedger<S>,
    resolver: WindowResolver<A>,
    journal: bool,
}

impl<P, S, A> ReminderScheduler<P, S, A>
where
    P: NotificationPlatform,
    S: KeyValueStore,
    A: PrayerTimesSource,
{
    pub fn new(platform: P, store: S, source: A) -> Self {
        Self {
            platform,
            ledger: CompletionLedger::new(store),
            resolver: WindowResolver::new(source),
            journal: false,
        }
    }

    /// Writes one journal line per pass to the directory named in the settings.
    pub fn with_journal(mut self) -> Self {
        self.journal = true;
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn ledger(&self) -> &CompletionLedger<S> {
        &self.ledger
    }

    pub fn resolver(&self) -> &WindowResolver<A> {
        &self.resolver
    }

    pub(crate) fn journal_enabled(&self) -> bool {
        self.journal
    }

    /// Clears every reminder this scheduler owns, then schedules the current plan.
    ///
    /// Returns the number of reminder notifications scheduled. Running it twice
    /// with the same inputs leaves the same set of ids pending.
    pub async fn reconcile(
        &self,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<usize> {
        let outcome = self.reconcile_pass(settings, now).await;
        match &outcome {
            Ok(report) => {
                info!(
                    "reconcile pass scheduled {} reminder(s) across {} window(s), cancelled {}",
                    report.scheduled, report.windows, report.cancelled
                );
                if self.journal {
                    let details = json!({
                        "windows": report.windows,
                        "dismissals": report.dismissals,
                        "failures": report.failures,
                    });
                    self.journal_append(
                        settings,
                        file_logger::pass_entry(
                            now,
                            "reconcile",
                            report.scheduled,
                            report.cancelled,
                            Some(details),
                        ),
                    )
                    .await;
                }
            }
            Err(err) => {
                error!("reconcile pass aborted: {}", err);
                if self.journal {
                    self.journal_append(
                        settings,
                        file_logger::error_entry(now, "reconcile", &err.to_string()),
                    )
                    .await;
                }
            }
        }
        outcome.map(|report| report.scheduled)
    }

    async fn reconcile_pass(
        &self,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<PassReport> {
        // Cleanup runs before anything else so a disabled or failed pass leaves nothing stale.
        let cleanup = cancel_matching(&self.platform, |identity| {
            identity.matches_namespace(Namespace::Tiered)
        })
        .await?;
        let mut report = PassReport {
            cancelled: cleanup.cancelled,
            ..Default::default()
        };

        if !settings.active {
            info!("reminders inactive, {} stale reminder(s) cleared", report.cancelled);
            return Ok(report);
        }

        let windows = self.resolver.resolve(now, settings.coordinates)?;
        let tiers = settings.tier_config();
        let now_utc = now.with_timezone(&Utc);

        for window in windows {
            if !window.name.is_actionable() || window.is_closed_at(now_utc) {
                continue;
            }
            if self
                .ledger
                .is_satisfied(window.attributed_date, window.name)
                .await
            {
                debug!(
                    "{} on {} already done, skipping",
                    window.name.slug(),
                    window.attributed_date
                );
                continue;
            }

            report.windows += 1;
            let mut window_scheduled = 0;
            for entry in planner::plan(&window, &tiers, now) {
                let fire_at = PlannedReminder::fire_at_for(&window, entry.minutes_before_end);
                if fire_at <= now_utc {
                    continue;
                }
                let reminder = PlannedReminder {
                    window: window.clone(),
                    tier: entry.tier,
                    minutes_before_end: entry.minutes_before_end,
                    fire_at,
                    label: entry.label,
                };
                let request = reminder_request(&reminder);
                match self.platform.schedule(request).await {
                    Ok(()) => window_scheduled += 1,
                    Err(err) => {
                        report.failures += 1;
                        warn!(
                            "failed to schedule {} tier {} at -{}m: {}",
                            window.name.slug(),
                            reminder.tier,
                            reminder.minutes_before_end,
                            err
                        );
                    }
                }
            }

            if window_scheduled > 0 && settings.dismiss_at_window_end {
                match self.platform.schedule(dismiss_request(&window)).await {
                    Ok(()) => report.dismissals += 1,
                    Err(err) => {
                        report.failures += 1;
                        warn!("failed to schedule dismiss for {}: {}", window.name.slug(), err);
                    }
                }
            }
            report.scheduled += window_scheduled;
        }

        Ok(report)
    }

    pub(crate) async fn journal_append(
        &self,
        settings: &ReminderSettings,
        entry: file_logger::LogEntry,
    ) {
        let result = match LoggerConfig::from_settings(settings) {
            Ok(config) => file_logger::append(&config, entry).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!("failed to write journal entry: {}", err);
        }
    }
}

pub fn reminder_title(prayer: PrayerName, tier: u8) -> String {
    let name = prayer.display_name();
    match tier {
        1 | 2 => format!("{name} reminder"),
        3 => format!("{name} is ending soon"),
        _ => format!("{name} is about to end"),
    }
}

fn base_payload(kind: &str, window: &PrayerWindow) -> Payload {
    let mut payload = Payload::new();
    payload.insert("kind".to_string(), kind.to_string());
    payload.insert("prayer".to_string(), window.name.slug().to_string());
    payload.insert(
        "date".to_string(),
        window.attributed_date.format("%Y-%m-%d").to_string(),
    );
    payload
}

fn reminder_request(reminder: &PlannedReminder) -> NotificationRequest {
    let window = &reminder.window;
    let mut payload = base_payload("reminder", window);
    payload.insert("tier".to_string(), reminder.tier.to_string());
    payload.insert(
        "minutes_before_end".to_string(),
        reminder.minutes_before_end.to_string(),
    );
    NotificationRequest {
        id: ReminderIdentity::reminder(
            window.attributed_date,
            window.name,
            reminder.tier,
            reminder.minutes_before_end,
        )
        .to_string(),
        fire_at: reminder.fire_at,
        title: reminder_title(window.name, reminder.tier),
        body: reminder.label.clone(),
        payload,
    }
}

fn dismiss_request(window: &PrayerWindow) -> NotificationRequest {
    NotificationRequest {
        id: ReminderIdentity::dismiss(window.attributed_date, window.name).to_string(),
        fire_at: window.end,
        title: String::new(),
        body: String::new(),
        payload: base_payload("dismiss", window),
    }
}
