//! Completion eligibility rules.
//!
//! [`can_complete`] is a pure decision function over a habit, its
//! completion history, and "now"; every comparison happens on zoned
//! calendar days, never raw instants. Denials carry a closed
//! [`DenyReason`] so callers render messages from typed data instead of
//! matching strings.

use std::fmt;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::completion::Completion;
use crate::habit::{Frequency, Habit, WEEKDAY_NAMES};
use crate::zoned::ZonedDay;

/// Why a completion attempt was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DenyReason {
    DailyAlreadyCompleted,
    WeeklyAlreadyCompleted,
    /// Today's weekday is not in the habit's day set; carries the full
    /// allowed set (0 = Sunday .. 6 = Saturday, sorted).
    CustomWrongDay { allowed: Vec<u8> },
    CustomAlreadyCompleted,
    /// A custom habit with an empty day set reached the validator despite
    /// construction-time validation.
    InvalidFrequency,
    /// Today is before the habit's zoned creation day.
    NotYetActive,
    /// Today is on or after the habit's zoned deactivation day.
    Deactivated,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::DailyAlreadyCompleted => write!(f, "already completed today"),
            DenyReason::WeeklyAlreadyCompleted => write!(f, "already completed this week"),
            DenyReason::CustomWrongDay { allowed } => {
                let names: Vec<&str> = allowed
                    .iter()
                    .filter_map(|&d| WEEKDAY_NAMES.get(d as usize).copied())
                    .collect();
                write!(f, "only scheduled on {}", names.join(", "))
            }
            DenyReason::CustomAlreadyCompleted => write!(f, "already completed today"),
            DenyReason::InvalidFrequency => write!(f, "habit has an invalid frequency"),
            DenyReason::NotYetActive => write!(f, "habit did not exist yet on this day"),
            DenyReason::Deactivated => write!(f, "habit is deactivated"),
        }
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum CompletionDecision {
    Allowed,
    Denied { reason: DenyReason },
}

impl CompletionDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, CompletionDecision::Allowed)
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            CompletionDecision::Allowed => None,
            CompletionDecision::Denied { reason } => Some(reason),
        }
    }
}

/// Per-habit, per-day state. Transitions are implicit: the state is a
/// pure function of the habit, its history, and "now", so day rollover
/// needs no stored bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HabitDayState {
    NotEligible,
    EligibleUncompleted,
    Completed,
}

/// Decide whether `habit` may be completed at `now`.
pub fn can_complete(
    habit: &Habit,
    history: &[Completion],
    zone: Tz,
    now: DateTime<Utc>,
) -> CompletionDecision {
    let today = ZonedDay::of(now, zone);

    if let Some(reason) = lifecycle_denial(habit, &today) {
        return CompletionDecision::Denied { reason };
    }

    let reason = match &habit.frequency {
        Frequency::Daily => completed_on(history, &today).then_some(DenyReason::DailyAlreadyCompleted),
        Frequency::Weekly => {
            completed_in_week(history, &today).then_some(DenyReason::WeeklyAlreadyCompleted)
        }
        Frequency::Custom { days } => {
            if days.is_empty() {
                Some(DenyReason::InvalidFrequency)
            } else if !days.contains(&today.weekday0()) {
                Some(DenyReason::CustomWrongDay {
                    allowed: days.iter().copied().collect(),
                })
            } else {
                completed_on(history, &today).then_some(DenyReason::CustomAlreadyCompleted)
            }
        }
    };

    match reason {
        Some(reason) => CompletionDecision::Denied { reason },
        None => CompletionDecision::Allowed,
    }
}

/// Derive the day-state machine position for `habit` at `now`.
pub fn day_state(
    habit: &Habit,
    history: &[Completion],
    zone: Tz,
    now: DateTime<Utc>,
) -> HabitDayState {
    let today = ZonedDay::of(now, zone);

    if lifecycle_denial(habit, &today).is_some() {
        return HabitDayState::NotEligible;
    }

    match &habit.frequency {
        Frequency::Daily => {
            if completed_on(history, &today) {
                HabitDayState::Completed
            } else {
                HabitDayState::EligibleUncompleted
            }
        }
        Frequency::Weekly => {
            if completed_in_week(history, &today) {
                HabitDayState::Completed
            } else {
                HabitDayState::EligibleUncompleted
            }
        }
        Frequency::Custom { days } => {
            if !days.contains(&today.weekday0()) {
                HabitDayState::NotEligible
            } else if completed_on(history, &today) {
                HabitDayState::Completed
            } else {
                HabitDayState::EligibleUncompleted
            }
        }
    }
}

fn lifecycle_denial(habit: &Habit, today: &ZonedDay) -> Option<DenyReason> {
    let created_day = ZonedDay::of(habit.created_at, today.zone());
    if today.days_since(&created_day) < 0 {
        return Some(DenyReason::NotYetActive);
    }
    if let Some(deactivated_at) = habit.deactivated_at {
        let deactivated_day = ZonedDay::of(deactivated_at, today.zone());
        if today.days_since(&deactivated_day) >= 0 {
            return Some(DenyReason::Deactivated);
        }
    }
    None
}

fn completed_on(history: &[Completion], day: &ZonedDay) -> bool {
    history
        .iter()
        .any(|c| ZonedDay::of(c.completed_at, day.zone()).date() == day.date())
}

fn completed_in_week(history: &[Completion], day: &ZonedDay) -> bool {
    let week = day.iso_week();
    history
        .iter()
        .any(|c| ZonedDay::of(c.completed_at, day.zone()).iso_week() == week)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::habit::UserId;
    use chrono::TimeZone;

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    fn daily_habit(created: DateTime<Utc>) -> Habit {
        Habit::new(UserId::new(), "Read", Frequency::Daily, created).unwrap()
    }

    fn completion_at(habit: &Habit, at: DateTime<Utc>) -> Completion {
        Completion::new(habit.id, habit.user_id, at, "UTC")
    }

    #[test]
    fn daily_allows_first_completion() {
        let habit = daily_habit(utc(2024, 1, 1, 8));
        let decision = can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 15, 9));
        assert!(decision.is_allowed());
    }

    #[test]
    fn daily_denies_second_completion_same_day() {
        let habit = daily_habit(utc(2024, 1, 1, 8));
        let history = vec![completion_at(&habit, utc(2024, 1, 15, 7))];
        let decision = can_complete(&habit, &history, Tz::UTC, utc(2024, 1, 15, 21));
        assert_eq!(
            decision.deny_reason(),
            Some(&DenyReason::DailyAlreadyCompleted)
        );
    }

    #[test]
    fn daily_same_utc_day_different_zoned_day_allows() {
        let habit = daily_habit(utc(2024, 1, 1, 8));
        // 01:00 UTC Jan 15 is Jan 14 evening in New York; a later attempt
        // at 14:00 UTC Jan 15 is Jan 15 morning there.
        let history = vec![completion_at(&habit, utc(2024, 1, 15, 1))];
        let decision = can_complete(&habit, &history, Tz::America__New_York, utc(2024, 1, 15, 14));
        assert!(decision.is_allowed());
    }

    #[test]
    fn weekly_denies_same_iso_week_any_weekday() {
        let habit = Habit::new(UserId::new(), "Review", Frequency::Weekly, utc(2024, 1, 1, 8))
            .unwrap();
        // Monday Jan 15 completed; Thursday Jan 18 is the same ISO week.
        let history = vec![completion_at(&habit, utc(2024, 1, 15, 10))];
        let decision = can_complete(&habit, &history, Tz::UTC, utc(2024, 1, 18, 10));
        assert_eq!(
            decision.deny_reason(),
            Some(&DenyReason::WeeklyAlreadyCompleted)
        );
        // Monday Jan 22 opens a new ISO week.
        let decision = can_complete(&habit, &history, Tz::UTC, utc(2024, 1, 22, 10));
        assert!(decision.is_allowed());
    }

    #[test]
    fn custom_denies_wrong_day_with_full_allowed_set() {
        let habit = Habit::new(
            UserId::new(),
            "Gym",
            Frequency::Custom {
                days: [1, 3, 5].into_iter().collect(),
            },
            utc(2024, 1, 1, 8),
        )
        .unwrap();
        // 2024-01-16 is a Tuesday.
        let decision = can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 16, 10));
        let reason = decision.deny_reason().unwrap().clone();
        assert_eq!(
            reason,
            DenyReason::CustomWrongDay {
                allowed: vec![1, 3, 5]
            }
        );
        assert_eq!(
            reason.to_string(),
            "only scheduled on Monday, Wednesday, Friday"
        );
    }

    #[test]
    fn custom_allows_listed_day_once() {
        let habit = Habit::new(
            UserId::new(),
            "Gym",
            Frequency::Custom {
                days: [1, 3, 5].into_iter().collect(),
            },
            utc(2024, 1, 1, 8),
        )
        .unwrap();
        // 2024-01-15 is a Monday.
        assert!(can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 15, 10)).is_allowed());
        let history = vec![completion_at(&habit, utc(2024, 1, 15, 10))];
        assert_eq!(
            can_complete(&habit, &history, Tz::UTC, utc(2024, 1, 15, 20)).deny_reason(),
            Some(&DenyReason::CustomAlreadyCompleted)
        );
    }

    #[test]
    fn denies_before_zoned_creation_day() {
        let habit = daily_habit(utc(2024, 1, 15, 12));
        let decision = can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 14, 23));
        assert_eq!(decision.deny_reason(), Some(&DenyReason::NotYetActive));
        // Earlier the same zoned day is fine: creation day inclusive.
        assert!(can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 15, 0)).is_allowed());
    }

    #[test]
    fn denies_on_zoned_deactivation_day() {
        let mut habit = daily_habit(utc(2024, 1, 1, 8));
        habit.deactivate(utc(2024, 1, 20, 18));
        // Deactivation day exclusive: the whole deactivation day is out.
        let decision = can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 20, 9));
        assert_eq!(decision.deny_reason(), Some(&DenyReason::Deactivated));
        assert!(can_complete(&habit, &[], Tz::UTC, utc(2024, 1, 19, 9)).is_allowed());
    }

    #[test]
    fn day_state_tracks_completion_and_rollover() {
        let habit = daily_habit(utc(2024, 1, 1, 8));
        let history = vec![completion_at(&habit, utc(2024, 1, 15, 10))];
        assert_eq!(
            day_state(&habit, &history, Tz::UTC, utc(2024, 1, 15, 12)),
            HabitDayState::Completed
        );
        // "Now" advancing past midnight rolls the state back to eligible.
        assert_eq!(
            day_state(&habit, &history, Tz::UTC, utc(2024, 1, 16, 1)),
            HabitDayState::EligibleUncompleted
        );
    }

    #[test]
    fn day_state_not_eligible_off_schedule() {
        let habit = Habit::new(
            UserId::new(),
            "Gym",
            Frequency::Custom {
                days: [1].into_iter().collect(),
            },
            utc(2024, 1, 1, 8),
        )
        .unwrap();
        // Tuesday: not a scheduled day.
        assert_eq!(
            day_state(&habit, &[], Tz::UTC, utc(2024, 1, 16, 12)),
            HabitDayState::NotEligible
        );
    }
}
