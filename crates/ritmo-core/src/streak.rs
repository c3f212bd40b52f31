//! Streak derivation from completion history.
//!
//! The calculator is pure: it projects a habit's completions onto zoned
//! calendar days (ISO weeks for weekly habits) and walks a descending
//! cursor from today. The current streak only extends while the walk is
//! still anchored at today; the longest-streak segment tolerates single
//! missed days, which is what a forgiveness token can bridge. Forgiveness
//! itself is not special-cased here: spending a token inserts a synthetic
//! completion and this same walk re-runs.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::completion::Completion;
use crate::habit::{Frequency, Habit, HabitId};
use crate::zoned::ZonedDay;

/// Derived streak statistics for one habit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakSnapshot {
    /// Consecutive periods (days, or ISO weeks for weekly habits) ending
    /// at today.
    pub current_streak: u32,
    /// Longest segment observed anywhere in the history, tolerating
    /// single-period gaps.
    pub longest_streak: u32,
    /// Zoned days between today and the newest completion; `None` for an
    /// empty history.
    pub days_since_last: Option<i64>,
    /// A token may bridge yesterday or the day before.
    pub can_use_forgiveness: bool,
}

impl StreakSnapshot {
    fn empty() -> Self {
        Self {
            current_streak: 0,
            longest_streak: 0,
            days_since_last: None,
            can_use_forgiveness: false,
        }
    }
}

/// Streak derivation over an explicit history snapshot.
pub struct StreakCalculator;

impl StreakCalculator {
    /// Compute streak statistics for one habit at `now`.
    pub fn for_habit(
        habit: &Habit,
        completions: &[Completion],
        zone: Tz,
        now: DateTime<Utc>,
    ) -> StreakSnapshot {
        let today = ZonedDay::of(now, zone);
        let days = project_days(completions, zone);
        if days.is_empty() {
            return StreakSnapshot::empty();
        }
        let days_since_last = (today.date() - days[0]).num_days();

        let (current, longest) = match habit.frequency {
            Frequency::Weekly => {
                let weeks = project_week_starts(&days);
                walk(&weeks, today.iso_week_start(), 7)
            }
            _ => walk(&days, today.date(), 1),
        };

        StreakSnapshot {
            current_streak: current,
            longest_streak: longest,
            days_since_last: Some(days_since_last),
            can_use_forgiveness: (1..=2).contains(&days_since_last),
        }
    }
}

/// Project completions to distinct zoned dates, newest first.
fn project_days(completions: &[Completion], zone: Tz) -> Vec<NaiveDate> {
    let mut days: Vec<NaiveDate> = completions
        .iter()
        .map(|c| ZonedDay::of(c.completed_at, zone).date())
        .collect();
    days.sort_unstable_by(|a, b| b.cmp(a));
    days.dedup();
    days
}

/// Collapse dates to distinct ISO-week start Mondays, newest first.
fn project_week_starts(days: &[NaiveDate]) -> Vec<NaiveDate> {
    let mut weeks: Vec<NaiveDate> = days
        .iter()
        .map(|d| *d - Duration::days(d.weekday().num_days_from_monday() as i64))
        .collect();
    weeks.sort_unstable_by(|a, b| b.cmp(a));
    weeks.dedup();
    weeks
}

/// Descending cursor walk. `step` is 1 for day streaks, 7 for week
/// streaks; gaps are measured in whole steps.
fn walk(periods: &[NaiveDate], start: NaiveDate, step: i64) -> (u32, u32) {
    let mut expected = start;
    let mut anchored = true;
    let mut current: u32 = 0;
    let mut segment: u32 = 0;
    let mut longest: u32 = 0;

    for &period in periods {
        let gap = (expected - period).num_days() / step;
        if gap < 0 {
            // Future or duplicate anomaly.
            continue;
        }
        if gap == 0 {
            segment += 1;
            if anchored {
                current += 1;
            }
        } else if gap == 1 {
            // Single missed period: the segment survives for
            // longest-streak purposes, but nothing bridged it, so the
            // today-anchored streak stops extending here.
            segment += 1;
            anchored = false;
        } else {
            segment = 1;
            anchored = false;
        }
        expected = period - Duration::days(step);
        longest = longest.max(segment);
    }

    (current, longest)
}

/// The "perfect day" / grant-qualification check: every habit active and
/// eligible on `day` has a qualifying completion, and at least one habit
/// was eligible at all. Weekly habits qualify via `day`'s ISO week.
pub fn all_satisfied_on(
    habits: &[Habit],
    completions_by_habit: &HashMap<HabitId, Vec<Completion>>,
    day: &ZonedDay,
) -> bool {
    let mut any_eligible = false;
    for habit in habits {
        if !habit.eligible_on_day(day) {
            continue;
        }
        let history: &[Completion] = completions_by_habit
            .get(&habit.id)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let satisfied = match &habit.frequency {
            Frequency::Daily => completed_on_date(history, day),
            Frequency::Weekly => {
                let week = day.iso_week();
                history
                    .iter()
                    .any(|c| ZonedDay::of(c.completed_at, day.zone()).iso_week() == week)
            }
            Frequency::Custom { days } => {
                if !days.contains(&day.weekday0()) {
                    // Off-schedule day: this habit is not required today.
                    continue;
                }
                completed_on_date(history, day)
            }
        };
        any_eligible = true;
        if !satisfied {
            return false;
        }
    }
    any_eligible
}

fn completed_on_date(history: &[Completion], day: &ZonedDay) -> bool {
    history
        .iter()
        .any(|c| ZonedDay::of(c.completed_at, day.zone()).date() == day.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::UserId;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn daily_habit() -> Habit {
        Habit::new(UserId::new(), "Read", Frequency::Daily, utc(2023, 1, 1, 8)).unwrap()
    }

    fn completions(habit: &Habit, instants: &[DateTime<Utc>]) -> Vec<Completion> {
        instants
            .iter()
            .map(|&at| Completion::new(habit.id, habit.user_id, at, "UTC"))
            .collect()
    }

    #[test]
    fn empty_history_is_all_zero() {
        let habit = daily_habit();
        let snap = StreakCalculator::for_habit(&habit, &[], Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 0);
        assert_eq!(snap.longest_streak, 0);
        assert_eq!(snap.days_since_last, None);
        assert!(!snap.can_use_forgiveness);
    }

    #[test]
    fn three_consecutive_days_ending_today() {
        let habit = daily_habit();
        let history = completions(
            &habit,
            &[utc(2024, 1, 15, 9), utc(2024, 1, 14, 9), utc(2024, 1, 13, 9)],
        );
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 3);
        assert!(snap.longest_streak >= 3);
        assert_eq!(snap.days_since_last, Some(0));
    }

    #[test]
    fn isolated_completions_are_separate_unit_segments() {
        // Today and three days ago: two segments of length 1.
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 15, 9), utc(2024, 1, 12, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 1);
        assert_eq!(snap.longest_streak, 1);
    }

    #[test]
    fn single_gap_is_tolerated_for_longest_only() {
        // Today and the day before yesterday: current streak is just
        // today, but the longest segment bridges the single gap.
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 15, 9), utc(2024, 1, 13, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 1);
        assert_eq!(snap.longest_streak, 2);
    }

    #[test]
    fn missed_today_freezes_current_streak() {
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 14, 9), utc(2024, 1, 13, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 0);
        assert_eq!(snap.longest_streak, 2);
        assert_eq!(snap.days_since_last, Some(1));
        assert!(snap.can_use_forgiveness);
    }

    #[test]
    fn forgiveness_window_closes_after_two_days() {
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 12, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.days_since_last, Some(3));
        assert!(!snap.can_use_forgiveness);
    }

    #[test]
    fn same_day_duplicates_collapse() {
        let habit = daily_habit();
        let history = completions(
            &habit,
            &[utc(2024, 1, 15, 9), utc(2024, 1, 15, 20), utc(2024, 1, 14, 9)],
        );
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 22));
        assert_eq!(snap.current_streak, 2);
    }

    #[test]
    fn future_completions_are_skipped() {
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 18, 9), utc(2024, 1, 15, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12));
        assert_eq!(snap.current_streak, 1);
        assert_eq!(snap.longest_streak, 1);
    }

    #[test]
    fn zone_projection_decides_day_membership() {
        // 02:00 UTC on the 15th is the evening of the 14th in New York,
        // so these two completions are consecutive days there, same day
        // nowhere.
        let habit = daily_habit();
        let history = completions(&habit, &[utc(2024, 1, 15, 2), utc(2024, 1, 14, 2)]);
        let ny = Tz::America__New_York;
        let snap = StreakCalculator::for_habit(&habit, &history, ny, utc(2024, 1, 15, 2));
        assert_eq!(snap.current_streak, 2);
    }

    #[test]
    fn streak_unbroken_across_dst_transition() {
        // Completions straddle the US spring-forward (2024-03-10).
        let habit = daily_habit();
        let history = completions(
            &habit,
            &[utc(2024, 3, 11, 15), utc(2024, 3, 10, 15), utc(2024, 3, 9, 15)],
        );
        let snap = StreakCalculator::for_habit(
            &habit,
            &history,
            Tz::America__New_York,
            utc(2024, 3, 11, 16),
        );
        assert_eq!(snap.current_streak, 3);
    }

    #[test]
    fn weekly_streak_counts_weeks() {
        let habit =
            Habit::new(UserId::new(), "Review", Frequency::Weekly, utc(2023, 1, 1, 8)).unwrap();
        // Completions in ISO weeks 1, 2 and 3 of 2024, different weekdays.
        let history = completions(
            &habit,
            &[utc(2024, 1, 17, 9), utc(2024, 1, 8, 9), utc(2024, 1, 5, 9)],
        );
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 18, 12));
        assert_eq!(snap.current_streak, 3);
        assert_eq!(snap.days_since_last, Some(1));
    }

    #[test]
    fn weekly_streak_breaks_on_skipped_weeks() {
        let habit =
            Habit::new(UserId::new(), "Review", Frequency::Weekly, utc(2023, 1, 1, 8)).unwrap();
        // Weeks 3 and... week 52 of 2023: far apart.
        let history = completions(&habit, &[utc(2024, 1, 17, 9), utc(2023, 12, 27, 9)]);
        let snap = StreakCalculator::for_habit(&habit, &history, Tz::UTC, utc(2024, 1, 18, 12));
        assert_eq!(snap.current_streak, 1);
        assert_eq!(snap.longest_streak, 1);
    }

    #[test]
    fn perfect_day_requires_every_eligible_habit() {
        let user = UserId::new();
        let daily = Habit::new(user, "Read", Frequency::Daily, utc(2023, 1, 1, 8)).unwrap();
        let custom = Habit::new(
            user,
            "Gym",
            Frequency::Custom {
                days: [2].into_iter().collect(), // Tuesdays
            },
            utc(2023, 1, 1, 8),
        )
        .unwrap();
        let habits = vec![daily.clone(), custom.clone()];
        // Monday 2024-01-15: only the daily habit is required.
        let monday = ZonedDay::from_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), Tz::UTC);
        let mut by_habit: HashMap<HabitId, Vec<Completion>> = HashMap::new();
        by_habit.insert(
            daily.id,
            completions(&daily, &[utc(2024, 1, 15, 9)]),
        );
        assert!(all_satisfied_on(&habits, &by_habit, &monday));
        // Tuesday requires both.
        let tuesday = monday.succ();
        by_habit.insert(daily.id, completions(&daily, &[utc(2024, 1, 16, 9)]));
        assert!(!all_satisfied_on(&habits, &by_habit, &tuesday));
        by_habit.insert(custom.id, completions(&custom, &[utc(2024, 1, 16, 18)]));
        assert!(all_satisfied_on(&habits, &by_habit, &tuesday));
    }

    #[test]
    fn no_eligible_habits_is_not_a_perfect_day() {
        let day = ZonedDay::from_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(), Tz::UTC);
        assert!(!all_satisfied_on(&[], &HashMap::new(), &day));
    }
}
