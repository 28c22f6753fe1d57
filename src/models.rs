use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const TIER_COUNT: usize = 4;
pub const CURRENT_SETTINGS_VERSION: u32 = 2;

/// Named points of the solar day, in their fixed daily order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrayerName {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Maghrib,
    Isha,
}

impl PrayerName {
    pub const ALL: [PrayerName; 6] = [
        PrayerName::Fajr,
        PrayerName::Sunrise,
        PrayerName::Dhuhr,
        PrayerName::Asr,
        PrayerName::Maghrib,
        PrayerName::Isha,
    ];

    /// First point of the day; its time is where the previous day's last window ends.
    pub const FIRST: PrayerName = PrayerName::Fajr;

    /// The only window that can run past midnight.
    pub const LAST: PrayerName = PrayerName::Isha;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn slug(self) -> &'static str {
        match self {
            PrayerName::Fajr => "fajr",
            PrayerName::Sunrise => "sunrise",
            PrayerName::Dhuhr => "dhuhr",
            PrayerName::Asr => "asr",
            PrayerName::Maghrib => "maghrib",
            PrayerName::Isha => "isha",
        }
    }

    pub fn from_slug(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|name| name.slug() == value)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PrayerName::Fajr => "Fajr",
            PrayerName::Sunrise => "Sunrise",
            PrayerName::Dhuhr => "Dhuhr",
            PrayerName::Asr => "Asr",
            PrayerName::Maghrib => "Maghrib",
            PrayerName::Isha => "Isha",
        }
    }

    /// Sunrise only marks the end of Fajr; it cannot be prayed or completed.
    pub fn is_actionable(self) -> bool {
        self != PrayerName::Sunrise
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        // Istanbul
        Self::new(41.0082, 28.9784)
    }
}

/// The six point times for one calendar date, indexed by `PrayerName::index`.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyTimes {
    pub date: NaiveDate,
    pub times: [DateTime<Utc>; 6],
}

impl DailyTimes {
    pub fn time_of(&self, name: PrayerName) -> DateTime<Utc> {
        self.times[name.index()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrayerWindow {
    pub name: PrayerName,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Local calendar date the window began on.
    pub attributed_date: NaiveDate,
}

impl PrayerWindow {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        self.start <= now && now < self.end
    }

    pub fn is_closed_at(&self, now: DateTime<Utc>) -> bool {
        self.end <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierSetting {
    pub threshold_minutes: u32,
    pub repeat_every_minutes: u32,
    /// Body template; `{prayer}` and `{minutes}` are substituted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl TierSetting {
    pub fn new(threshold_minutes: u32, repeat_every_minutes: u32) -> Self {
        Self {
            threshold_minutes,
            repeat_every_minutes,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl Default for TierSetting {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

const DEFAULT_TIERS: [(u32, u32); TIER_COUNT] = [(45, 15), (30, 10), (15, 5), (5, 1)];

pub fn default_tier_settings() -> Vec<TierSetting> {
    DEFAULT_TIERS
        .iter()
        .map(|&(threshold, repeat)| TierSetting::new(threshold, repeat))
        .collect()
}

pub fn default_tier_message(tier: u8) -> &'static str {
    match tier {
        1 => "{prayer} ends in {minutes} minutes",
        2 => "{prayer} ends in {minutes} minutes, make time for it",
        3 => "Only {minutes} minutes left for {prayer}",
        _ => "Last call: {prayer} ends in {minutes} minutes",
    }
}

/// Four escalation tiers, index 0 is tier 1 (loosest), index 3 is tier 4 (most urgent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierConfig {
    pub tiers: [TierSetting; TIER_COUNT],
}

impl TierConfig {
    pub fn new(tiers: [TierSetting; TIER_COUNT]) -> Self {
        Self { tiers }
    }

    /// Builds a config from `(threshold, repeat)` pairs, tier 1 first.
    pub fn from_pairs(pairs: [(u32, u32); TIER_COUNT]) -> Self {
        Self::new(pairs.map(|(threshold, repeat)| TierSetting::new(threshold, repeat)))
    }

    /// `tier` is 1-based.
    pub fn tier(&self, tier: u8) -> &TierSetting {
        &self.tiers[usize::from(tier - 1)]
    }

    pub fn max_threshold(&self) -> u32 {
        self.tiers
            .iter()
            .map(|tier| tier.threshold_minutes)
            .max()
            .unwrap_or(0)
    }

    pub fn render_label(&self, tier: u8, prayer: PrayerName, minutes: u32) -> String {
        let template = self
            .tier(tier)
            .message
            .as_deref()
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| default_tier_message(tier));
        template
            .replace("{prayer}", prayer.display_name())
            .replace("{minutes}", &minutes.to_string())
    }
}

impl Default for TierConfig {
    fn default() -> Self {
        Self::from_pairs(DEFAULT_TIERS)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedReminder {
    pub window: PrayerWindow,
    pub tier: u8,
    pub minutes_before_end: u32,
    pub fire_at: DateTime<Utc>,
    pub label: String,
}

impl PlannedReminder {
    pub fn fire_at_for(window: &PrayerWindow, minutes_before_end: u32) -> DateTime<Utc> {
        window.end - Duration::minutes(i64::from(minutes_before_end))
    }
}

fn default_active() -> bool {
    false
}

fn default_dismiss_at_window_end() -> bool {
    true
}

fn default_max_log_days() -> u64 {
    7
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSettings {
    #[serde(default = "default_active")]
    pub active: bool,
    pub coordinates: Coordinates,
    /// Exactly `TIER_COUNT` entries once validated.
    pub tiers: Vec<TierSetting>,
    #[serde(default = "default_dismiss_at_window_end")]
    pub dismiss_at_window_end: bool,
    #[serde(default)]
    pub countdown_enabled: bool,
    #[serde(default)]
    pub log_directory: Option<String>,
    #[serde(default = "default_max_log_days")]
    pub max_log_days: u64,
    #[serde(default)]
    pub settings_version: u32,
}

impl ReminderSettings {
    pub fn tier_config(&self) -> TierConfig {
        let defaults = default_tier_settings();
        let pick = |idx: usize| {
            self.tiers
                .get(idx)
                .cloned()
                .unwrap_or_else(|| defaults[idx].clone())
        };
        TierConfig::new([pick(0), pick(1), pick(2), pick(3)])
    }
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            active: default_active(),
            coordinates: Coordinates::default(),
            tiers: default_tier_settings(),
            dismiss_at_window_end: default_dismiss_at_window_end(),
            countdown_enabled: false,
            log_directory: None,
            max_log_days: default_max_log_days(),
            settings_version: CURRENT_SETTINGS_VERSION,
        }
    }
}
