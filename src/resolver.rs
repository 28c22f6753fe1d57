use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use log::debug;

use crate::errors::{ReminderError, ReminderResult};
use crate::models::{Coordinates, DailyTimes, PrayerName, PrayerWindow};

/// Astronomical prayer-time computation, treated as deterministic and pure.
pub trait PrayerTimesSource: Send + Sync {
    fn compute_times(&self, coords: Coordinates, date: NaiveDate) -> ReminderResult<DailyTimes>;
}

impl<T: PrayerTimesSource + ?Sized> PrayerTimesSource for Arc<T> {
    fn compute_times(&self, coords: Coordinates, date: NaiveDate) -> ReminderResult<DailyTimes> {
        (**self).compute_times(coords, date)
    }
}

/// Same six local clock times every day at a fixed UTC offset.
///
/// Used for manually entered timetables and in tests. Coordinates are only
/// validated, never used.
#[derive(Debug, Clone)]
pub struct FixedTimesSource {
    offset: FixedOffset,
    times: [NaiveTime; 6],
}

impl FixedTimesSource {
    pub fn new(offset: FixedOffset, times: [NaiveTime; 6]) -> Self {
        Self { offset, times }
    }

    /// Parses `HH:MM` clock times, Fajr first.
    pub fn from_clock_times(offset: FixedOffset, times: [&str; 6]) -> ReminderResult<Self> {
        let mut parsed = [NaiveTime::default(); 6];
        for (slot, value) in parsed.iter_mut().zip(times) {
            *slot = NaiveTime::parse_from_str(value, "%H:%M").map_err(|err| {
                ReminderError::Config(format!("invalid clock time '{value}': {err}"))
            })?;
        }
        Ok(Self::new(offset, parsed))
    }
}

impl PrayerTimesSource for FixedTimesSource {
    fn compute_times(&self, coords: Coordinates, date: NaiveDate) -> ReminderResult<DailyTimes> {
        if !coords.is_valid() {
            return Err(ReminderError::Computation(format!(
                "coordinates out of range: ({}, {})",
                coords.latitude, coords.longitude
            )));
        }

        let mut times = [DateTime::<Utc>::default(); 6];
        for (slot, clock) in times.iter_mut().zip(self.times) {
            let local = self
                .offset
                .from_local_datetime(&date.and_time(clock))
                .single()
                .ok_or_else(|| {
                    ReminderError::Computation(format!("no local time {clock} on {date}"))
                })?;
            *slot = local.with_timezone(&Utc);
        }
        Ok(DailyTimes { date, times })
    }
}

/// Turns daily point times into named windows around "now".
pub struct WindowResolver<A> {
    source: A,
}

impl<A: PrayerTimesSource> WindowResolver<A> {
    pub fn new(source: A) -> Self {
        Self { source }
    }

    /// Windows that are open at `now` or open before tomorrow's first point, in order.
    pub fn resolve(
        &self,
        now: DateTime<FixedOffset>,
        coords: Coordinates,
    ) -> ReminderResult<Vec<PrayerWindow>> {
        let now_utc = now.with_timezone(&Utc);
        let windows: Vec<PrayerWindow> = self
            .resolve_including_closed(now, coords)?
            .into_iter()
            .filter(|window| !window.is_closed_at(now_utc))
            .collect();
        debug!(
            "resolved {} open or upcoming window(s) for {}",
            windows.len(),
            now.date_naive()
        );
        Ok(windows)
    }

    /// Yesterday's final window followed by today's six windows, closed ones included.
    ///
    /// Yesterday's final window is attributed to yesterday and ends at today's
    /// first point, so it is still open whenever `now` is before that point.
    pub fn resolve_including_closed(
        &self,
        now: DateTime<FixedOffset>,
        coords: Coordinates,
    ) -> ReminderResult<Vec<PrayerWindow>> {
        let today = now.date_naive();
        let yesterday = previous_day(today)?;
        let tomorrow = next_day(today)?;

        let yesterday_times = self.times_for(coords, yesterday)?;
        let today_times = self.times_for(coords, today)?;
        let tomorrow_times = self.times_for(coords, tomorrow)?;

        let mut windows = Vec::with_capacity(PrayerName::ALL.len() + 1);
        windows.push(build_window(
            PrayerName::LAST,
            yesterday_times.time_of(PrayerName::LAST),
            today_times.time_of(PrayerName::FIRST),
            yesterday,
        )?);

        for (idx, name) in PrayerName::ALL.iter().copied().enumerate() {
            let end = match PrayerName::ALL.get(idx + 1) {
                Some(next) => today_times.time_of(*next),
                None => tomorrow_times.time_of(PrayerName::FIRST),
            };
            windows.push(build_window(name, today_times.time_of(name), end, today)?);
        }

        Ok(windows)
    }

    /// Calendar date a completion of `name` at `now` belongs to.
    ///
    /// Mirrors the midnight rule in [`Self::resolve_including_closed`]: the last
    /// window is yesterday's until today's first point.
    pub fn attributed_date(
        &self,
        name: PrayerName,
        now: DateTime<FixedOffset>,
        coords: Coordinates,
    ) -> ReminderResult<NaiveDate> {
        let today = now.date_naive();
        if name != PrayerName::LAST {
            return Ok(today);
        }
        let first_point = self.times_for(coords, today)?.time_of(PrayerName::FIRST);
        if now.with_timezone(&Utc) < first_point {
            previous_day(today)
        } else {
            Ok(today)
        }
    }

    fn times_for(&self, coords: Coordinates, date: NaiveDate) -> ReminderResult<DailyTimes> {
        let daily = self.source.compute_times(coords, date)?;
        if daily.times.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ReminderError::Computation(format!(
                "prayer times for {date} are not strictly increasing"
            )));
        }
        Ok(daily)
    }
}

fn build_window(
    name: PrayerName,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    attributed_date: NaiveDate,
) -> ReminderResult<PrayerWindow> {
    if start >= end {
        return Err(ReminderError::Computation(format!(
            "{} window on {attributed_date} does not end after it starts",
            name.slug()
        )));
    }
    Ok(PrayerWindow {
        name,
        start,
        end,
        attributed_date,
    })
}

pub(crate) fn previous_day(date: NaiveDate) -> ReminderResult<NaiveDate> {
    date.pred_opt()
        .ok_or_else(|| ReminderError::Computation(format!("no day before {date}")))
}

fn next_day(date: NaiveDate) -> ReminderResult<NaiveDate> {
    date.succ_opt()
        .ok_or_else(|| ReminderError::Computation(format!("no day after {date}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn offset() -> FixedOffset {
        FixedOffset::east_opt(3 * 3600).unwrap()
    }

    pub(crate) fn source() -> FixedTimesSource {
        FixedTimesSource::from_clock_times(
            offset(),
            ["05:30", "07:00", "12:30", "15:45", "18:20", "19:50"],
        )
        .unwrap()
    }

    pub(crate) fn local(date: NaiveDate, hm: &str) -> DateTime<FixedOffset> {
        let time = NaiveTime::parse_from_str(hm, "%H:%M").unwrap();
        offset().from_local_datetime(&date.and_time(time)).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn resolves_remaining_windows_of_the_day() {
        let resolver = WindowResolver::new(source());
        let windows = resolver
            .resolve(local(day(), "13:00"), Coordinates::default())
            .unwrap();
        let names: Vec<_> = windows.iter().map(|w| w.name).collect();
        assert_eq!(
            names,
            vec![
                PrayerName::Dhuhr,
                PrayerName::Asr,
                PrayerName::Maghrib,
                PrayerName::Isha
            ]
        );
        let isha = windows.last().unwrap();
        assert_eq!(isha.attributed_date, day());
        assert_eq!(
            isha.end,
            local(day().succ_opt().unwrap(), "05:30").with_timezone(&Utc)
        );
        assert!(windows[0].is_open_at(local(day(), "13:00").with_timezone(&Utc)));
    }

    #[test]
    fn last_window_before_first_point_belongs_to_yesterday() {
        let resolver = WindowResolver::new(source());
        let now = local(day(), "05:30") - Duration::minutes(1);
        let windows = resolver.resolve(now, Coordinates::default()).unwrap();

        let first = &windows[0];
        assert_eq!(first.name, PrayerName::Isha);
        assert_eq!(first.attributed_date, day().pred_opt().unwrap());
        assert_eq!(first.end, local(day(), "05:30").with_timezone(&Utc));
        assert_eq!(windows.len(), 7);
    }

    #[test]
    fn closed_windows_only_come_back_when_requested() {
        let resolver = WindowResolver::new(source());
        let now = local(day(), "16:00");
        let open = resolver.resolve(now, Coordinates::default()).unwrap();
        let all = resolver
            .resolve_including_closed(now, Coordinates::default())
            .unwrap();
        assert_eq!(open.len(), 3);
        assert_eq!(all.len(), 7);
        assert!(all[0].is_closed_at(now.with_timezone(&Utc)));
    }

    #[test]
    fn attribution_follows_the_midnight_rule() {
        let resolver = WindowResolver::new(source());
        let coords = Coordinates::default();
        let yesterday = day().pred_opt().unwrap();

        assert_eq!(
            resolver.attributed_date(PrayerName::Isha, local(day(), "01:10"), coords).unwrap(),
            yesterday
        );
        assert_eq!(
            resolver.attributed_date(PrayerName::Isha, local(day(), "21:00"), coords).unwrap(),
            day()
        );
        assert_eq!(
            resolver.attributed_date(PrayerName::Fajr, local(day(), "01:10"), coords).unwrap(),
            day()
        );
    }

    #[test]
    fn malformed_coordinates_fail_resolution() {
        let resolver = WindowResolver::new(source());
        let err = resolver
            .resolve(local(day(), "13:00"), Coordinates::new(120.0, 0.0))
            .unwrap_err();
        assert!(matches!(err, ReminderError::Computation(_)));
    }

    #[test]
    fn out_of_order_times_are_a_computation_error() {
        let broken = FixedTimesSource::from_clock_times(
            offset(),
            ["05:30", "07:00", "12:30", "12:30", "18:20", "19:50"],
        )
        .unwrap();
        let resolver = WindowResolver::new(broken);
        assert!(matches!(
            resolver.resolve(local(day(), "13:00"), Coordinates::default()),
            Err(ReminderError::Computation(_))
        ));
    }
}
