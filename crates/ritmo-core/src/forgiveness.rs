//! Forgiveness token ledger rules.
//!
//! Pure decision logic only: spend preconditions and the daily grant
//! qualification. The processor owns the side effects (inserting the
//! synthetic completion, decrementing the balance, writing the
//! idempotency record) inside its per-user critical section.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::completion::Completion;
use crate::error::TokenError;
use crate::habit::{Habit, HabitId};
use crate::storage::ForgivenessConfig;
use crate::streak::all_satisfied_on;
use crate::zoned::ZonedDay;

/// Ledger decision logic, parameterized by configuration.
#[derive(Debug, Clone, Default)]
pub struct ForgivenessLedger {
    config: ForgivenessConfig,
}

/// Outcome of one user's evaluation in the grant job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantOutcome {
    /// Balance incremented.
    Granted,
    /// Qualified while already at the cap; idempotency record written,
    /// balance unchanged.
    AtCap,
    /// Already evaluated for this zoned day.
    AlreadyGranted,
    /// Not every eligible habit was satisfied, or none were eligible.
    NotQualified,
    /// No active habits; user skipped entirely.
    NoActiveHabits,
}

impl ForgivenessLedger {
    pub fn new(config: ForgivenessConfig) -> Self {
        Self { config }
    }

    pub fn token_cap(&self) -> u8 {
        self.config.token_cap
    }

    /// Check every spend precondition.
    ///
    /// `target` and `today` are dates in the user's zone;
    /// `already_completed` reports whether the habit has any completion on
    /// the target day; `spends_today` counts spends the user already
    /// performed today.
    pub fn validate_spend(
        &self,
        balance: u8,
        target: NaiveDate,
        today: NaiveDate,
        already_completed: bool,
        spends_today: u32,
    ) -> Result<(), TokenError> {
        let days_back = (today - target).num_days();
        if days_back < 0 {
            return Err(TokenError::FutureDate);
        }
        if days_back == 0 || days_back > self.config.window_days {
            return Err(TokenError::OutOfWindow {
                window_days: self.config.window_days,
            });
        }
        if already_completed {
            return Err(TokenError::AlreadyCompleted);
        }
        if balance == 0 {
            return Err(TokenError::InsufficientTokens);
        }
        if spends_today >= self.config.daily_spend_cap {
            return Err(TokenError::DailySpendCapReached {
                cap: self.config.daily_spend_cap,
            });
        }
        Ok(())
    }

    /// Evaluate the daily grant for one user.
    ///
    /// `previous_day` is the user's zoned yesterday; `already_recorded` is
    /// the idempotency check for `(user, previous_day)`.
    pub fn evaluate_grant(
        &self,
        habits: &[Habit],
        completions_by_habit: &HashMap<HabitId, Vec<Completion>>,
        previous_day: &ZonedDay,
        balance: u8,
        already_recorded: bool,
    ) -> GrantOutcome {
        if already_recorded {
            return GrantOutcome::AlreadyGranted;
        }
        let active: Vec<Habit> = habits.iter().filter(|h| h.active).cloned().collect();
        if active.is_empty() {
            return GrantOutcome::NoActiveHabits;
        }
        if !all_satisfied_on(&active, completions_by_habit, previous_day) {
            return GrantOutcome::NotQualified;
        }
        if balance >= self.config.token_cap {
            GrantOutcome::AtCap
        } else {
            GrantOutcome::Granted
        }
    }

    /// Forgiven completions earn half the normal award, rounded down.
    pub fn forgiven_xp(normal_award: u32) -> u32 {
        normal_award / 2
    }
}
