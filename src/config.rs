use log::{debug, info, warn};

use crate::errors::{ReminderError, ReminderResult};
use crate::models::{default_tier_settings, ReminderSettings, CURRENT_SETTINGS_VERSION, TIER_COUNT};
use crate::store::KeyValueStore;

pub const SETTINGS_KEY: &str = "reminder_settings";

/// Upper bound for tier thresholds and repeats (12 h).
const MAX_TIER_MINUTES: u32 = 720;

/// Clamp, trim, and pad every field so the schedulers can trust it.
pub fn validate(mut settings: ReminderSettings) -> ReminderSettings {
    // -- tier count --
    if settings.tiers.len() > TIER_COUNT {
        warn!(
            "settings: truncating {} tiers → {TIER_COUNT}",
            settings.tiers.len()
        );
        settings.tiers.truncate(TIER_COUNT);
    }
    let defaults = default_tier_settings();
    while settings.tiers.len() < TIER_COUNT {
        let idx = settings.tiers.len();
        settings.tiers.push(defaults[idx].clone());
    }

    for (idx, tier) in settings.tiers.iter_mut().enumerate() {
        if tier.threshold_minutes > MAX_TIER_MINUTES {
            warn!(
                "tier {}: threshold {}m out of range, clamping",
                idx + 1,
                tier.threshold_minutes
            );
        }
        tier.threshold_minutes = tier.threshold_minutes.min(MAX_TIER_MINUTES);
        tier.repeat_every_minutes = tier.repeat_every_minutes.min(MAX_TIER_MINUTES);

        // blank overrides fall back to the built-in message
        tier.message = tier
            .message
            .take()
            .filter(|message| !message.trim().is_empty());
    }

    if !settings.coordinates.is_valid() {
        warn!(
            "settings: coordinates ({}, {}) out of range, prayer times will fail to compute",
            settings.coordinates.latitude, settings.coordinates.longitude
        );
    }

    settings.log_directory = settings.log_directory.and_then(|path| {
        let trimmed = path.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    });
    settings.max_log_days = settings.max_log_days.clamp(1, 365);

    if settings.settings_version < CURRENT_SETTINGS_VERSION {
        info!(
            "settings migrated from v{} → v{CURRENT_SETTINGS_VERSION}",
            settings.settings_version
        );
    }
    settings.settings_version = CURRENT_SETTINGS_VERSION;
    settings
}

/// Reads settings from `store`, falling back to defaults when none were saved.
///
/// Stored settings are validated and written back so the store always holds
/// the current schema.
pub async fn load_settings<S: KeyValueStore + ?Sized>(store: &S) -> ReminderResult<ReminderSettings> {
    let Some(raw) = store.get(SETTINGS_KEY).await? else {
        info!("no saved settings, using defaults");
        return Ok(ReminderSettings::default());
    };

    debug!("loading settings from store key {SETTINGS_KEY}");
    let parsed: ReminderSettings = serde_json::from_str(&raw)
        .map_err(|err| ReminderError::Config(format!("invalid settings JSON: {err}")))?;
    let validated = validate(parsed);

    match serde_json::to_string(&validated) {
        Ok(serialized) if serialized != raw => {
            if let Err(err) = store.set(SETTINGS_KEY, &serialized).await {
                warn!("failed to re-save validated settings: {err}");
            }
        }
        Ok(_) => {}
        Err(err) => warn!("failed to serialize validated settings: {err}"),
    }

    Ok(validated)
}

/// Validates `input` and persists it, returning what was stored.
pub async fn save_settings<S: KeyValueStore + ?Sized>(
    store: &S,
    input: ReminderSettings,
) -> ReminderResult<ReminderSettings> {
    let validated = validate(input);
    let serialized = serde_json::to_string(&validated)?;
    store.set(SETTINGS_KEY, &serialized).await?;
    info!("settings saved (active: {})", validated.active);
    Ok(validated)
}
