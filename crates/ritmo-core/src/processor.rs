//! Completion event processing.
//!
//! The processor sequences the pure calculators for a single user action
//! or a scheduled batch run: resolve the zoned day, validate eligibility,
//! record the completion, recompute the streak, award XP, detect
//! level-ups, and emit events. It owns the only mutable coordination in
//! the engine: a per-user mutex map serializing every
//! balance-check-then-decrement and XP read-modify-write against the
//! repository.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::completion::Completion;
use crate::error::{CoreError, EligibilityError, NotFoundError, Result, TokenError};
use crate::events::{Event, NoopSink, NotificationSink, STREAK_MILESTONES};
use crate::forgiveness::{ForgivenessLedger, GrantOutcome};
use crate::frequency::{self, CompletionDecision, DenyReason, HabitDayState};
use crate::habit::{Frequency, Habit, HabitId, UserId};
use crate::repository::Repository;
use crate::storage::EngineConfig;
use crate::streak::{all_satisfied_on, StreakCalculator, StreakSnapshot};
use crate::user::UserProgress;
use crate::xp::{self, AwardBreakdown, AwardMultiplier, LevelInfo, LevelUp, Reward};
use crate::zoned::{resolve_zone, ZonedDay};

/// Result of recording a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionOutcome {
    pub completion: Completion,
    pub streak: StreakSnapshot,
    pub award: AwardBreakdown,
    pub level: LevelInfo,
    pub level_up: Option<LevelUp>,
}

/// Result of a same-day uncomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevertOutcome {
    pub xp_reversed: u32,
    pub streak: StreakSnapshot,
    pub level: LevelInfo,
}

/// Result of spending a forgiveness token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpendOutcome {
    pub completion: Completion,
    pub balance: u8,
    pub streak: StreakSnapshot,
    pub level_up: Option<LevelUp>,
}

/// Aggregate result of one grant batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrantJobSummary {
    pub granted: u32,
    pub skipped: u32,
    pub failed: u32,
}

/// Per-user lock map.
///
/// Two concurrent spends, or a spend racing the scheduled grant, must not
/// slip past the balance check together; everything that mutates one
/// user's progression takes this lock first.
#[derive(Default)]
struct UserLocks {
    inner: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn for_user(&self, user: UserId) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Orchestrator for completion, forgiveness, and grant operations.
pub struct CompletionProcessor {
    repo: Arc<dyn Repository>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    config: EngineConfig,
    ledger: ForgivenessLedger,
    locks: UserLocks,
}

impl CompletionProcessor {
    /// Create a processor with the system clock and a no-op sink.
    pub fn new(repo: Arc<dyn Repository>, config: EngineConfig) -> Self {
        let ledger = ForgivenessLedger::new(config.forgiveness.clone());
        Self {
            repo,
            clock: Arc::new(SystemClock),
            sink: Arc::new(NoopSink),
            config,
            ledger,
            locks: UserLocks::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Create a user profile.
    pub fn create_user(&self, timezone: &str) -> Result<UserProgress> {
        // Resolution warns and falls back to UTC later if the id is bad;
        // store what the device reported.
        let user = UserProgress::new(timezone, self.clock.now());
        self.repo.insert_user(&user)?;
        Ok(user)
    }

    /// Create a habit; definition validation happens here, not at
    /// completion time.
    pub fn create_habit(
        &self,
        user_id: UserId,
        name: &str,
        frequency: Frequency,
    ) -> Result<Habit> {
        self.repo.user(user_id)?;
        let habit = Habit::new(user_id, name, frequency, self.clock.now())?;
        self.repo.insert_habit(&habit)?;
        Ok(habit)
    }

    /// Soft-deactivate a habit, retaining its history.
    pub fn deactivate_habit(&self, user_id: UserId, habit_id: HabitId) -> Result<Habit> {
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
        self.owned_habit(user_id, habit_id)?;
        self.repo.deactivate_habit(habit_id, self.clock.now())?;
        self.repo.habit(habit_id)
    }

    // ── Completion ───────────────────────────────────────────────────

    /// Record a habit completion "now".
    pub fn complete_habit(
        &self,
        user_id: UserId,
        habit_id: HabitId,
        device_zone: Option<&str>,
    ) -> Result<CompletionOutcome> {
        let now = self.clock.now();
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let today = ZonedDay::of(now, zone);

        let history = self.repo.completions_for_habit(habit_id)?;
        if let CompletionDecision::Denied { reason } =
            frequency::can_complete(&habit, &history, zone, now)
        {
            return Err(CoreError::Eligibility(EligibilityError {
                habit_id,
                reason,
            }));
        }

        let all_prior = self.repo.completions_for_user(user_id)?;
        let first_ever = all_prior.is_empty();

        let mut completion = Completion::new(
            habit_id,
            user_id,
            now,
            device_zone.unwrap_or(&user.timezone),
        );

        let mut history_after = history;
        history_after.push(completion.clone());
        let streak = StreakCalculator::for_habit(&habit, &history_after, zone, now);

        let multiplier = if first_ever {
            AwardMultiplier::FirstCompletion
        } else if self.is_perfect_day(user_id, &all_prior, &completion, &today)? {
            AwardMultiplier::PerfectDay
        } else {
            AwardMultiplier::Standard
        };

        let award = xp::award(streak.current_streak, multiplier, &self.config.xp);
        completion.xp_earned = award.total;

        let old_total = user.total_xp;
        user.total_xp = old_total + u64::from(award.total);
        let level = xp::level_info(user.total_xp);
        user.current_level = level.level;
        let level_up = xp::detect_level_up(old_total, user.total_xp);
        if let Some(up) = &level_up {
            self.apply_token_rewards(&mut user, &up.rewards);
        }

        self.repo.insert_completion(&completion)?;
        self.repo.update_user(&user)?;

        self.sink.deliver(&Event::CompletionRecorded {
            habit_id,
            user_id,
            day: today.date(),
            xp_awarded: award.total,
            current_streak: streak.current_streak,
            at: now,
        });
        if STREAK_MILESTONES.contains(&streak.current_streak) {
            self.sink.deliver(&Event::StreakMilestone {
                habit_id,
                user_id,
                length: streak.current_streak,
                at: now,
            });
        }
        if let Some(up) = &level_up {
            self.sink.deliver(&Event::level_up(user_id, up, now));
        }

        Ok(CompletionOutcome {
            completion,
            streak,
            award,
            level,
            level_up,
        })
    }

    /// Revert today's completion of a habit. Same zoned day only, never
    /// retroactive, never a forgiveness completion.
    pub fn uncomplete_habit(&self, user_id: UserId, habit_id: HabitId) -> Result<RevertOutcome> {
        let now = self.clock.now();
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let today = ZonedDay::of(now, zone);

        let history = self.repo.completions_for_habit(habit_id)?;
        let target = history
            .iter()
            .find(|c| {
                !c.forgiveness_used && ZonedDay::of(c.completed_at, zone).date() == today.date()
            })
            .cloned()
            .ok_or(CoreError::NotFound(NotFoundError::CompletionToday(
                habit_id,
            )))?;

        self.repo.remove_completion(target.id)?;
        user.total_xp = user.total_xp.saturating_sub(u64::from(target.xp_earned));
        let level = xp::level_info(user.total_xp);
        user.current_level = level.level;
        self.repo.update_user(&user)?;

        let remaining: Vec<Completion> = history.into_iter().filter(|c| c.id != target.id).collect();
        let streak = StreakCalculator::for_habit(&habit, &remaining, zone, now);

        self.sink.deliver(&Event::CompletionReverted {
            habit_id,
            user_id,
            day: today.date(),
            xp_reversed: target.xp_earned,
            at: now,
        });

        Ok(RevertOutcome {
            xp_reversed: target.xp_earned,
            streak,
            level,
        })
    }

    // ── Forgiveness ──────────────────────────────────────────────────

    /// Spend a forgiveness token on a missed past day.
    pub fn spend_forgiveness(
        &self,
        user_id: UserId,
        habit_id: HabitId,
        target: NaiveDate,
    ) -> Result<SpendOutcome> {
        let now = self.clock.now();
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let today = ZonedDay::of(now, zone);
        let target_day = ZonedDay::from_date(target, zone);

        let history = self.repo.completions_for_habit(habit_id)?;
        let already_completed = history
            .iter()
            .any(|c| ZonedDay::of(c.completed_at, zone).date() == target);
        let spends_today = self.repo.spends_on(user_id, today.date())?;

        self.ledger.validate_spend(
            user.forgiveness_tokens,
            target,
            today.date(),
            already_completed,
            spends_today,
        )?;

        // The habit must actually have been missable on the target day:
        // lifecycle and weekday checks apply as if completing then.
        if let CompletionDecision::Denied { reason } =
            frequency::can_complete(&habit, &history, zone, target_day.start_utc())
        {
            return Err(match reason {
                DenyReason::DailyAlreadyCompleted
                | DenyReason::WeeklyAlreadyCompleted
                | DenyReason::CustomAlreadyCompleted => CoreError::Token(TokenError::AlreadyCompleted),
                reason => CoreError::Eligibility(EligibilityError { habit_id, reason }),
            });
        }

        // Half of what a normal completion on the target day would have
        // earned, given the streak the synthetic completion restores.
        let mut bridged = history.clone();
        let probe = Completion::forgiven(habit_id, user_id, target_day.start_utc(), 0);
        bridged.push(probe);
        let streak_at_target =
            StreakCalculator::for_habit(&habit, &bridged, zone, target_day.start_utc());
        let normal = xp::award(
            streak_at_target.current_streak,
            AwardMultiplier::Standard,
            &self.config.xp,
        );
        let forgiven_xp = ForgivenessLedger::forgiven_xp(normal.total);

        let completion =
            Completion::forgiven(habit_id, user_id, target_day.start_utc(), forgiven_xp);

        let old_total = user.total_xp;
        user.total_xp = old_total + u64::from(forgiven_xp);
        user.current_level = xp::level_info(user.total_xp).level;
        let level_up = xp::detect_level_up(old_total, user.total_xp);
        if let Some(up) = &level_up {
            self.apply_token_rewards(&mut user, &up.rewards);
        }
        user.forgiveness_tokens -= 1;

        self.repo.insert_completion(&completion)?;
        self.repo.record_spend(user_id, today.date())?;
        self.repo.update_user(&user)?;

        self.sink.deliver(&Event::ForgivenessSpent {
            user_id,
            habit_id,
            target_day: target,
            balance: user.forgiveness_tokens,
            at: now,
        });
        if let Some(up) = &level_up {
            self.sink.deliver(&Event::level_up(user_id, up, now));
        }

        let mut after = history;
        after.push(completion.clone());
        let streak = StreakCalculator::for_habit(&habit, &after, zone, now);

        Ok(SpendOutcome {
            completion,
            balance: user.forgiveness_tokens,
            streak,
            level_up,
        })
    }

    /// Run the daily grant for an explicit set of users.
    ///
    /// Per-user failures are logged and counted; they never abort the
    /// batch. Safe to re-run for the same day: grants are idempotent per
    /// `(user, zoned day)`.
    pub fn run_grant_job(&self, users: &[UserId], now: DateTime<Utc>) -> GrantJobSummary {
        let mut summary = GrantJobSummary::default();
        for &user_id in users {
            match self.grant_for_user(user_id, now) {
                Ok(GrantOutcome::Granted) => summary.granted += 1,
                Ok(_) => summary.skipped += 1,
                Err(err) => {
                    tracing::error!(user = %user_id, error = %err, "grant evaluation failed");
                    summary.failed += 1;
                }
            }
        }
        summary
    }

    fn grant_for_user(&self, user_id: UserId, now: DateTime<Utc>) -> Result<GrantOutcome> {
        let lock = self.locks.for_user(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut user = self.repo.user(user_id)?;
        let zone = resolve_zone(&user.timezone);
        let previous_day = ZonedDay::of(now, zone).pred();

        let already_recorded = self.repo.grant_recorded(user_id, previous_day.date())?;
        let habits = self.repo.habits_for_user(user_id)?;
        let mut completions_by_habit: HashMap<HabitId, Vec<Completion>> = HashMap::new();
        for habit in habits.iter().filter(|h| h.active) {
            completions_by_habit
                .insert(habit.id, self.repo.completions_for_habit(habit.id)?);
        }

        let outcome = self.ledger.evaluate_grant(
            &habits,
            &completions_by_habit,
            &previous_day,
            user.forgiveness_tokens,
            already_recorded,
        );

        match outcome {
            GrantOutcome::Granted => {
                user.forgiveness_tokens += 1;
                self.repo.update_user(&user)?;
                self.repo.record_grant(user_id, previous_day.date())?;
                self.sink.deliver(&Event::ForgivenessGranted {
                    user_id,
                    qualifying_day: previous_day.date(),
                    balance: user.forgiveness_tokens,
                    at: now,
                });
            }
            GrantOutcome::AtCap => {
                // Balance unchanged; the record still closes the day.
                self.repo.record_grant(user_id, previous_day.date())?;
            }
            _ => {}
        }
        Ok(outcome)
    }

    // ── Read-only snapshots ──────────────────────────────────────────

    /// All habits owned by a user.
    pub fn habits(&self, user_id: UserId) -> Result<Vec<Habit>> {
        self.repo.user(user_id)?;
        self.repo.habits_for_user(user_id)
    }

    /// Every user the repository knows; input for the grant job.
    pub fn known_users(&self) -> Result<Vec<UserId>> {
        self.repo.all_user_ids()
    }

    /// Eligibility decision without recording anything.
    pub fn check_completion(&self, user_id: UserId, habit_id: HabitId) -> Result<CompletionDecision> {
        let user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let history = self.repo.completions_for_habit(habit_id)?;
        Ok(frequency::can_complete(&habit, &history, zone, self.clock.now()))
    }

    pub fn habit_streak(&self, user_id: UserId, habit_id: HabitId) -> Result<StreakSnapshot> {
        let user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let history = self.repo.completions_for_habit(habit_id)?;
        Ok(StreakCalculator::for_habit(
            &habit,
            &history,
            zone,
            self.clock.now(),
        ))
    }

    pub fn habit_day_state(&self, user_id: UserId, habit_id: HabitId) -> Result<HabitDayState> {
        let user = self.repo.user(user_id)?;
        let habit = self.owned_habit(user_id, habit_id)?;
        let zone = resolve_zone(&user.timezone);
        let history = self.repo.completions_for_habit(habit_id)?;
        Ok(frequency::day_state(
            &habit,
            &history,
            zone,
            self.clock.now(),
        ))
    }

    /// Current progression with its level breakdown.
    pub fn progress(&self, user_id: UserId) -> Result<(UserProgress, LevelInfo)> {
        let user = self.repo.user(user_id)?;
        let level = xp::level_info(user.total_xp);
        Ok((user, level))
    }

    // ── Internals ────────────────────────────────────────────────────

    /// Load a habit and verify ownership; foreign habits surface as
    /// not-found.
    fn owned_habit(&self, user_id: UserId, habit_id: HabitId) -> Result<Habit> {
        let habit = self.repo.habit(habit_id)?;
        if habit.user_id != user_id {
            return Err(CoreError::NotFound(NotFoundError::Habit(habit_id)));
        }
        Ok(habit)
    }

    /// Perfect day: counting `new_completion`, every active habit
    /// eligible today is satisfied.
    fn is_perfect_day(
        &self,
        user_id: UserId,
        prior: &[Completion],
        new_completion: &Completion,
        today: &ZonedDay,
    ) -> Result<bool> {
        let habits: Vec<Habit> = self
            .repo
            .habits_for_user(user_id)?
            .into_iter()
            .filter(|h| h.active)
            .collect();
        let mut by_habit: HashMap<HabitId, Vec<Completion>> = HashMap::new();
        for completion in prior.iter().chain(std::iter::once(new_completion)) {
            by_habit
                .entry(completion.habit_id)
                .or_default()
                .push(completion.clone());
        }
        Ok(all_satisfied_on(&habits, &by_habit, today))
    }

    fn apply_token_rewards(&self, user: &mut UserProgress, rewards: &[Reward]) {
        let cap = self.ledger.token_cap();
        for reward in rewards {
            if matches!(reward, Reward::ForgivenessToken) && user.forgiveness_tokens < cap {
                user.forgiveness_tokens += 1;
            }
        }
    }
}
