use chrono::{DateTime, FixedOffset, Utc};

use crate::models::{PrayerWindow, TierConfig, TIER_COUNT};

/// One minute-offset chosen for a window; at most one exists per `minutes_before_end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub minutes_before_end: u32,
    pub tier: u8,
    pub label: String,
}

/// Whole minutes left in `window` at `now`, floored; zero or negative once closed.
pub fn remaining_minutes(window: &PrayerWindow, now: DateTime<FixedOffset>) -> i64 {
    let seconds = (window.end - now.with_timezone(&Utc)).num_seconds();
    seconds.div_euclid(60)
}

/// Picks the notification minutes for one window.
///
/// Minutes are swept from the widest threshold down to 1. For each minute the
/// most urgent tier whose threshold covers it is the active one, and the minute
/// is kept when it sits a whole number of that tier's repeats below the tier's
/// own threshold. Entries come back in firing order (largest offset first).
///
/// A repeat that does not divide a tier's span can leave the minutes just
/// before the next tier takes over without a reminder; that timing is kept.
pub fn plan(window: &PrayerWindow, tiers: &TierConfig, now: DateTime<FixedOffset>) -> Vec<PlanEntry> {
    let remaining = remaining_minutes(window, now);
    if remaining <= 0 {
        return Vec::new();
    }

    let max_threshold = tiers.max_threshold();
    let sweep_start = u32::try_from(remaining).unwrap_or(u32::MAX).min(max_threshold);

    let mut entries = Vec::new();
    for k in (1..=sweep_start).rev() {
        let Some(active) = active_tier(tiers, k) else {
            continue;
        };
        let setting = tiers.tier(active);
        let delta = setting.threshold_minutes - k;
        if setting.repeat_every_minutes > 0 && delta % setting.repeat_every_minutes == 0 {
            entries.push(PlanEntry {
                minutes_before_end: k,
                tier: active,
                label: tiers.render_label(active, window.name, k),
            });
        }
    }
    entries
}

/// Last tier in 1..=4 whose threshold covers minute `k`.
fn active_tier(tiers: &TierConfig, k: u32) -> Option<u8> {
    let mut active = None;
    for tier in 1..=TIER_COUNT as u8 {
        if k <= tiers.tier(tier).threshold_minutes {
            active = Some(tier);
        }
    }
    active
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PrayerName;
    use chrono::{Duration, NaiveDate, TimeZone};
    use std::collections::HashSet;

    fn now() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(3 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 1, 16, 0, 0)
            .unwrap()
    }

    fn window_with(remaining: Duration) -> PrayerWindow {
        let end = now().with_timezone(&Utc) + remaining;
        PrayerWindow {
            name: PrayerName::Asr,
            start: end - Duration::hours(3),
            end,
            attributed_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        }
    }

    fn pairs(entries: &[PlanEntry]) -> Vec<(u32, u8)> {
        entries
            .iter()
            .map(|entry| (entry.minutes_before_end, entry.tier))
            .collect()
    }

    #[test]
    fn identical_tiers_collapse_to_the_most_urgent() {
        let tiers = TierConfig::from_pairs([(25, 30), (25, 30), (25, 30), (25, 30)]);
        let entries = plan(&window_with(Duration::minutes(30)), &tiers, now());
        assert_eq!(pairs(&entries), vec![(25, 4)]);
    }

    #[test]
    fn escalating_tiers_restart_phase_at_each_threshold() {
        let tiers = TierConfig::from_pairs([(25, 15), (20, 10), (15, 5), (10, 2)]);
        let entries = plan(&window_with(Duration::minutes(25)), &tiers, now());
        assert_eq!(
            pairs(&entries),
            vec![
                (25, 1),
                (20, 2),
                (15, 3),
                (10, 4),
                (8, 4),
                (6, 4),
                (4, 4),
                (2, 4)
            ]
        );
        assert_eq!(entries[0].label, "Asr ends in 25 minutes");
    }

    #[test]
    fn closed_or_sub_minute_windows_plan_nothing() {
        let tiers = TierConfig::default();
        assert!(plan(&window_with(Duration::seconds(59)), &tiers, now()).is_empty());
        assert!(plan(&window_with(Duration::minutes(-5)), &tiers, now()).is_empty());
    }

    #[test]
    fn remaining_time_is_floored_to_whole_minutes() {
        let tiers = TierConfig::from_pairs([(0, 0), (0, 0), (0, 0), (10, 1)]);
        let entries = plan(&window_with(Duration::seconds(7 * 60 + 59)), &tiers, now());
        assert_eq!(entries.first().map(|e| e.minutes_before_end), Some(7));
        assert_eq!(entries.len(), 7);
    }

    #[test]
    fn never_more_than_one_entry_per_minute_or_max_threshold_in_total() {
        let configs = [
            TierConfig::from_pairs([(60, 1), (45, 1), (30, 1), (15, 1)]),
            TierConfig::from_pairs([(10, 3), (90, 7), (40, 0), (20, 4)]),
            TierConfig::from_pairs([(5, 1), (5, 1), (120, 11), (1, 1)]),
            TierConfig::default(),
        ];
        for tiers in &configs {
            for remaining in [1, 7, 30, 59, 61, 200] {
                let entries = plan(&window_with(Duration::minutes(remaining)), tiers, now());
                let minutes: HashSet<u32> =
                    entries.iter().map(|entry| entry.minutes_before_end).collect();
                assert_eq!(minutes.len(), entries.len());
                assert!(entries.len() as u32 <= tiers.max_threshold());
            }
        }
    }

    #[test]
    fn overlapping_thresholds_resolve_to_the_smaller_one() {
        let tiers = TierConfig::from_pairs([(60, 1), (45, 1), (30, 1), (15, 1)]);
        let entries = plan(&window_with(Duration::minutes(90)), &tiers, now());
        assert_eq!(entries.len(), 60);
        for entry in &entries {
            let k = entry.minutes_before_end;
            let smallest_covering = (1..=4u8)
                .filter(|tier| k <= tiers.tier(*tier).threshold_minutes)
                .min_by_key(|tier| tiers.tier(*tier).threshold_minutes)
                .unwrap();
            assert_eq!(entry.tier, smallest_covering, "minute {k}");
        }
    }

    #[test]
    fn every_tier_fires_exactly_at_its_threshold() {
        let tiers = TierConfig::from_pairs([(45, 15), (30, 10), (15, 5), (5, 1)]);
        for remaining in [45, 50, 120] {
            let entries = plan(&window_with(Duration::minutes(remaining)), &tiers, now());
            for tier in 1..=4u8 {
                let threshold = tiers.tier(tier).threshold_minutes;
                assert!(
                    entries
                        .iter()
                        .any(|e| e.minutes_before_end == threshold && e.tier == tier),
                    "tier {tier} missing at {threshold} with {remaining} remaining"
                );
            }
        }
    }

    #[test]
    fn uneven_repeat_leaves_gap_before_next_tier() {
        // tier 1 spans 30..21 with a 7 minute repeat: 30 and 23 fire, 22 and 21 stay silent
        let tiers = TierConfig::from_pairs([(30, 7), (20, 20), (0, 0), (0, 0)]);
        let entries = plan(&window_with(Duration::minutes(30)), &tiers, now());
        assert_eq!(pairs(&entries), vec![(30, 1), (23, 1), (20, 2)]);
    }

    #[test]
    fn unordered_thresholds_use_the_last_covering_tier() {
        // tier 4 covers 30..1 and shadows tiers 1 and 3 even though their thresholds are smaller
        let tiers = TierConfig::from_pairs([(10, 1), (40, 5), (5, 1), (30, 3)]);
        let entries = plan(&window_with(Duration::minutes(60)), &tiers, now());
        assert_eq!(
            pairs(&entries),
            vec![
                (40, 2),
                (35, 2),
                (30, 4),
                (27, 4),
                (24, 4),
                (21, 4),
                (18, 4),
                (15, 4),
                (12, 4),
                (9, 4),
                (6, 4),
                (3, 4)
            ]
        );
        assert!(entries.iter().all(|entry| entry.tier != 1 && entry.tier != 3));
    }

    #[test]
    fn zero_repeat_disables_a_tier_without_releasing_its_minutes() {
        let tiers = TierConfig::from_pairs([(30, 5), (0, 0), (0, 0), (10, 0)]);
        let entries = plan(&window_with(Duration::minutes(30)), &tiers, now());
        assert_eq!(pairs(&entries), vec![(30, 1), (25, 1), (20, 1), (15, 1)]);
    }
}
