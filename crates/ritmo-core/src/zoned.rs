//! Timezone-correct calendar-day resolution.
//!
//! All day-boundary math in the engine goes through [`ZonedDay`], an
//! immutable value for "a civil calendar day as experienced in one IANA
//! zone". Its UTC bracket is 23h or 25h wide on DST transition days but
//! always spans exactly one civil day. Constructing the bracket handles
//! both DST edge shapes: a skipped local midnight resolves to the first
//! valid instant of the day, an ambiguous one to the earlier instant.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Parse an IANA zone id, falling back to UTC on failure.
///
/// An unknown zone id is a degraded-but-working state, not a hard error:
/// streaks and reminders keep functioning in UTC and the fallback is
/// logged as a warning.
pub fn resolve_zone(id: &str) -> Tz {
    id.parse().unwrap_or_else(|_| {
        tracing::warn!(zone = id, "unknown IANA zone id, falling back to UTC");
        Tz::UTC
    })
}

/// True when two instants land on the same civil day in `zone`.
pub fn is_same_zoned_day(a: DateTime<Utc>, b: DateTime<Utc>, zone: Tz) -> bool {
    a.with_timezone(&zone).date_naive() == b.with_timezone(&zone).date_naive()
}

/// A civil calendar day in a specific IANA zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonedDay {
    date: NaiveDate,
    zone: Tz,
}

impl ZonedDay {
    /// Project a UTC instant to the civil day it falls on in `zone`.
    pub fn of(instant: DateTime<Utc>, zone: Tz) -> Self {
        Self {
            date: instant.with_timezone(&zone).date_naive(),
            zone,
        }
    }

    /// A specific calendar date in `zone`.
    pub fn from_date(date: NaiveDate, zone: Tz) -> Self {
        Self { date, zone }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// UTC instant of this day's local midnight (inclusive lower bound).
    pub fn start_utc(&self) -> DateTime<Utc> {
        local_midnight_utc(self.zone, self.date)
    }

    /// UTC instant of the next day's local midnight (exclusive upper bound).
    pub fn end_utc(&self) -> DateTime<Utc> {
        local_midnight_utc(self.zone, next_date(self.date))
    }

    /// True when `instant` falls within this civil day.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start_utc() && instant < self.end_utc()
    }

    /// The previous civil day.
    pub fn pred(&self) -> Self {
        Self {
            date: self.date.pred_opt().unwrap_or(self.date),
            zone: self.zone,
        }
    }

    /// The next civil day.
    pub fn succ(&self) -> Self {
        Self {
            date: next_date(self.date),
            zone: self.zone,
        }
    }

    /// Weekday with Sunday = 0 .. Saturday = 6.
    pub fn weekday0(&self) -> u8 {
        self.date.weekday().num_days_from_sunday() as u8
    }

    /// ISO week (Monday-based) as (iso year, week number).
    pub fn iso_week(&self) -> (i32, u32) {
        let week = self.date.iso_week();
        (week.year(), week.week())
    }

    /// The Monday starting this day's ISO week.
    pub fn iso_week_start(&self) -> NaiveDate {
        let back = self.date.weekday().num_days_from_monday() as i64;
        self.date - Duration::days(back)
    }

    /// Whole civil days from `other` to `self` (positive when self is later).
    pub fn days_since(&self, other: &ZonedDay) -> i64 {
        (self.date - other.date).num_days()
    }
}

fn next_date(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

/// Resolve a local midnight to a UTC instant, absorbing DST edges.
fn local_midnight_utc(zone: Tz, date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match zone.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        // Fall-back transition: the local midnight occurs twice; the
        // earlier instant is the day's true lower bound.
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Spring-forward transition: the local midnight does not exist
        // (e.g. America/Santiago). Probe forward in 30-minute steps for
        // the first valid local time of the day.
        LocalResult::None => {
            let mut probe = midnight;
            for _ in 0..6 {
                probe += Duration::minutes(30);
                if let LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) =
                    zone.from_local_datetime(&probe)
                {
                    return dt.with_timezone(&Utc);
                }
            }
            // No zone on record skips more than 3 hours; treat as UTC.
            Utc.from_utc_datetime(&midnight)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32, zone: Tz) -> ZonedDay {
        ZonedDay::from_date(NaiveDate::from_ymd_opt(y, m, d).unwrap(), zone)
    }

    #[test]
    fn resolve_known_zone() {
        assert_eq!(resolve_zone("Europe/Oslo"), Tz::Europe__Oslo);
    }

    #[test]
    fn resolve_unknown_zone_falls_back_to_utc() {
        assert_eq!(resolve_zone("Mars/Olympus_Mons"), Tz::UTC);
        assert_eq!(resolve_zone(""), Tz::UTC);
    }

    #[test]
    fn regular_day_brackets_24_hours() {
        let d = day(2024, 1, 15, Tz::America__New_York);
        let width = d.end_utc() - d.start_utc();
        assert_eq!(width, Duration::hours(24));
        assert_eq!(d.start_utc(), utc(2024, 1, 15, 5, 0)); // EST is UTC-5
    }

    #[test]
    fn spring_forward_day_brackets_23_hours() {
        // US DST began 2024-03-10 at 02:00 local.
        let d = day(2024, 3, 10, Tz::America__New_York);
        let width = d.end_utc() - d.start_utc();
        assert_eq!(width, Duration::hours(23));
    }

    #[test]
    fn fall_back_day_brackets_25_hours() {
        // US DST ended 2024-11-03 at 02:00 local.
        let d = day(2024, 11, 3, Tz::America__New_York);
        let width = d.end_utc() - d.start_utc();
        assert_eq!(width, Duration::hours(25));
    }

    #[test]
    fn skipped_local_midnight_resolves_forward() {
        // Chile springs forward at midnight: 2024-09-08 00:00 did not
        // exist; the day starts at 01:00 local.
        let d = day(2024, 9, 8, Tz::America__Santiago);
        let start_local = d.start_utc().with_timezone(&Tz::America__Santiago);
        assert_eq!(start_local.date_naive(), d.date());
        assert_eq!(
            start_local.time(),
            chrono::NaiveTime::from_hms_opt(1, 0, 0).unwrap()
        );
        assert!(d.contains(d.start_utc()));
        let width = d.end_utc() - d.start_utc();
        assert_eq!(width, Duration::hours(23));
    }

    #[test]
    fn consecutive_days_share_a_boundary() {
        let d = day(2024, 11, 3, Tz::America__New_York);
        assert_eq!(d.end_utc(), d.succ().start_utc());
        assert_eq!(d.start_utc(), d.pred().end_utc());
    }

    #[test]
    fn projection_respects_zone_not_utc_date() {
        // 2024-01-15 03:00 UTC is still Jan 14 in New York.
        let instant = utc(2024, 1, 15, 3, 0);
        let d = ZonedDay::of(instant, Tz::America__New_York);
        assert_eq!(d.date(), NaiveDate::from_ymd_opt(2024, 1, 14).unwrap());
        assert!(d.contains(instant));
    }

    #[test]
    fn same_zoned_day_across_utc_midnight() {
        let a = utc(2024, 1, 14, 23, 0);
        let b = utc(2024, 1, 15, 3, 0);
        assert!(!is_same_zoned_day(a, b, Tz::UTC));
        // Both are Jan 14 in New York.
        assert!(is_same_zoned_day(a, b, Tz::America__New_York));
    }

    #[test]
    fn weekday_numbering_starts_at_sunday() {
        // 2024-01-14 was a Sunday.
        assert_eq!(day(2024, 1, 14, Tz::UTC).weekday0(), 0);
        assert_eq!(day(2024, 1, 15, Tz::UTC).weekday0(), 1);
        assert_eq!(day(2024, 1, 20, Tz::UTC).weekday0(), 6);
    }

    #[test]
    fn iso_week_is_monday_based() {
        // Sunday 2024-01-14 closes ISO week 2; Monday 2024-01-15 opens week 3.
        assert_eq!(day(2024, 1, 14, Tz::UTC).iso_week(), (2024, 2));
        assert_eq!(day(2024, 1, 15, Tz::UTC).iso_week(), (2024, 3));
        assert_eq!(
            day(2024, 1, 14, Tz::UTC).iso_week_start(),
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap()
        );
    }

    #[test]
    fn days_since_counts_civil_days() {
        let today = day(2024, 3, 11, Tz::America__New_York);
        let before_dst = day(2024, 3, 8, Tz::America__New_York);
        // Three civil days apart even though the wall-clock span is 71h.
        assert_eq!(today.days_since(&before_dst), 3);
    }
}
