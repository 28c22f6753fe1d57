use chrono::{DateTime, FixedOffset, Utc};
use log::{info, warn};

use crate::errors::ReminderResult;
use crate::identity::{Namespace, ReminderIdentity};
use crate::models::{PrayerWindow, ReminderSettings};
use crate::platform::{NotificationPlatform, NotificationRequest, Payload};
use crate::resolver::{PrayerTimesSource, WindowResolver};
use crate::scheduler::cancel_matching;

/// One "has begun" banner per upcoming window, in its own namespace.
pub struct CountdownScheduler<P, A> {
    platform: P,
    resolver: WindowResolver<A>,
}

impl<P, A> CountdownScheduler<P, A>
where
    P: NotificationPlatform,
    A: PrayerTimesSource,
{
    pub fn new(platform: P, source: A) -> Self {
        Self {
            platform,
            resolver: WindowResolver::new(source),
        }
    }

    /// Replaces all countdown banners; returns how many were scheduled.
    pub async fn reconcile(
        &self,
        settings: &ReminderSettings,
        now: DateTime<FixedOffset>,
    ) -> ReminderResult<usize> {
        let cleanup = cancel_matching(&self.platform, |identity| {
            identity.matches_namespace(Namespace::Countdown)
        })
        .await?;

        if !(settings.active && settings.countdown_enabled) {
            return Ok(0);
        }

        let now_utc = now.with_timezone(&Utc);
        let offset = *now.offset();
        let mut scheduled = 0;
        for window in self.resolver.resolve(now, settings.coordinates)? {
            if !window.name.is_actionable() || window.start <= now_utc {
                continue;
            }
            match self.platform.schedule(banner_request(&window, offset)).await {
                Ok(()) => scheduled += 1,
                Err(err) => warn!("failed to schedule countdown for {}: {}", window.name.slug(), err),
            }
        }

        info!(
            "countdown pass scheduled {scheduled} banner(s), cancelled {}",
            cleanup.cancelled
        );
        Ok(scheduled)
    }
}

fn banner_request(window: &PrayerWindow, offset: FixedOffset) -> NotificationRequest {
    let name = window.name.display_name();
    let ends = window.end.with_timezone(&offset).format("%H:%M");
    let mut payload = Payload::new();
    payload.insert("kind".to_string(), "countdown".to_string());
    payload.insert("prayer".to_string(), window.name.slug().to_string());
    payload.insert(
        "date".to_string(),
        window.attributed_date.format("%Y-%m-%d").to_string(),
    );
    NotificationRequest {
        id: ReminderIdentity::countdown(window.attributed_date, window.name).to_string(),
        fire_at: window.start,
        title: name.to_string(),
        body: format!("{name} has begun, ends at {ends}"),
        payload,
    }
}
