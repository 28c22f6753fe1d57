//! Typed platform notification identifiers.
//!
//! Identifiers are plain strings on the platform side, but every id this crate
//! issues is built from and parsed back into a [`ReminderIdentity`]. Cleanup
//! and ownership checks go through [`ReminderIdentity::matches_namespace`]
//! instead of raw prefix matching, so ids from unrelated schedulers sharing the
//! same platform listing are never touched.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::errors::ReminderError;
use crate::models::PrayerName;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DISMISS_SUFFIX: &str = "bitis";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Escalating tier reminders and their window-end dismiss entries.
    Tiered,
    /// Single "time remaining" banner per window.
    Countdown,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Tiered => "prayer-reminder",
            Namespace::Countdown => "prayer-countdown",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value {
            "prayer-reminder" => Some(Namespace::Tiered),
            "prayer-countdown" => Some(Namespace::Countdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentityKind {
    Reminder { tier: u8, minutes_before_end: u32 },
    /// Zero-content entry that clears the visible reminder at window end.
    Dismiss,
    Countdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderIdentity {
    pub namespace: Namespace,
    pub attributed_date: NaiveDate,
    pub prayer: PrayerName,
    pub kind: IdentityKind,
}

impl ReminderIdentity {
    pub fn reminder(
        attributed_date: NaiveDate,
        prayer: PrayerName,
        tier: u8,
        minutes_before_end: u32,
    ) -> Self {
        Self {
            namespace: Namespace::Tiered,
            attributed_date,
            prayer,
            kind: IdentityKind::Reminder {
                tier,
                minutes_before_end,
            },
        }
    }

    pub fn dismiss(attributed_date: NaiveDate, prayer: PrayerName) -> Self {
        Self {
            namespace: Namespace::Tiered,
            attributed_date,
            prayer,
            kind: IdentityKind::Dismiss,
        }
    }

    pub fn countdown(attributed_date: NaiveDate, prayer: PrayerName) -> Self {
        Self {
            namespace: Namespace::Countdown,
            attributed_date,
            prayer,
            kind: IdentityKind::Countdown,
        }
    }

    /// Parses a platform id, returning `None` for ids this crate did not issue.
    pub fn parse(id: &str) -> Option<Self> {
        id.parse().ok()
    }

    pub fn matches_namespace(&self, namespace: Namespace) -> bool {
        self.namespace == namespace
    }

    /// True when this id belongs to the tiered namespace and to `prayer` on `date`.
    pub fn matches_window(&self, date: NaiveDate, prayer: PrayerName) -> bool {
        self.matches_namespace(Namespace::Tiered)
            && self.attributed_date == date
            && self.prayer == prayer
    }
}

impl fmt::Display for ReminderIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}",
            self.namespace.as_str(),
            self.attributed_date.format(DATE_FORMAT),
            self.prayer.slug()
        )?;
        match self.kind {
            IdentityKind::Reminder {
                tier,
                minutes_before_end,
            } => write!(f, "_{tier}_{minutes_before_end}"),
            IdentityKind::Dismiss => write!(f, "_{DISMISS_SUFFIX}"),
            IdentityKind::Countdown => Ok(()),
        }
    }
}

impl FromStr for ReminderIdentity {
    type Err = ReminderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ReminderError::InvalidAction(format!("unrecognised notification id '{value}'"));
        let parts: Vec<&str> = value.split('_').collect();
        if parts.len() < 3 {
            return Err(invalid());
        }

        let namespace = Namespace::parse(parts[0]).ok_or_else(invalid)?;
        let attributed_date =
            NaiveDate::parse_from_str(parts[1], DATE_FORMAT).map_err(|_| invalid())?;
        let prayer = PrayerName::from_slug(parts[2]).ok_or_else(invalid)?;

        let kind = match (namespace, &parts[3..]) {
            (Namespace::Tiered, [tier, minutes]) => {
                let tier: u8 = tier.parse().map_err(|_| invalid())?;
                if !(1..=4).contains(&tier) {
                    return Err(invalid());
                }
                IdentityKind::Reminder {
                    tier,
                    minutes_before_end: minutes.parse().map_err(|_| invalid())?,
                }
            }
            (Namespace::Tiered, [suffix]) if *suffix == DISMISS_SUFFIX => IdentityKind::Dismiss,
            (Namespace::Countdown, []) => IdentityKind::Countdown,
            _ => return Err(invalid()),
        };

        Ok(Self {
            namespace,
            attributed_date,
            prayer,
            kind,
        })
    }
}
