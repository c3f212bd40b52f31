//! Repository seam.
//!
//! The engine reads explicit snapshots and writes computed deltas through
//! this trait; it never holds live mutable aggregates. Implementations
//! must make the individual calls atomic; cross-call consistency is the
//! processor's job via its per-user lock.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::completion::{Completion, CompletionId};
use crate::error::{CoreError, NotFoundError, Result};
use crate::habit::{Habit, HabitId, UserId};
use crate::user::UserProgress;

/// Storage access used by the processor.
pub trait Repository: Send + Sync {
    fn habit(&self, id: HabitId) -> Result<Habit>;
    fn habits_for_user(&self, user: UserId) -> Result<Vec<Habit>>;
    fn insert_habit(&self, habit: &Habit) -> Result<()>;
    /// Stamp a habit inactive, retaining history.
    fn deactivate_habit(&self, id: HabitId, at: DateTime<Utc>) -> Result<()>;

    fn user(&self, id: UserId) -> Result<UserProgress>;
    fn insert_user(&self, user: &UserProgress) -> Result<()>;
    fn update_user(&self, user: &UserProgress) -> Result<()>;
    fn all_user_ids(&self) -> Result<Vec<UserId>>;

    fn completions_for_habit(&self, habit: HabitId) -> Result<Vec<Completion>>;
    fn completions_for_user(&self, user: UserId) -> Result<Vec<Completion>>;
    fn insert_completion(&self, completion: &Completion) -> Result<()>;
    /// Remove one completion record (same-day uncomplete only).
    fn remove_completion(&self, id: CompletionId) -> Result<()>;

    /// Idempotency check for the daily grant job.
    fn grant_recorded(&self, user: UserId, day: NaiveDate) -> Result<bool>;
    fn record_grant(&self, user: UserId, day: NaiveDate) -> Result<()>;

    /// How many forgiveness spends the user performed on `day`.
    fn spends_on(&self, user: UserId, day: NaiveDate) -> Result<u32>;
    fn record_spend(&self, user: UserId, day: NaiveDate) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    habits: HashMap<HabitId, Habit>,
    users: HashMap<UserId, UserProgress>,
    completions: Vec<Completion>,
    grants: HashSet<(UserId, NaiveDate)>,
    spends: HashMap<(UserId, NaiveDate), u32>,
}

/// In-memory repository for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }
}

impl Repository for MemoryRepository {
    fn habit(&self, id: HabitId) -> Result<Habit> {
        self.with_state(|s| {
            s.habits
                .get(&id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(NotFoundError::Habit(id)))
        })
    }

    fn habits_for_user(&self, user: UserId) -> Result<Vec<Habit>> {
        self.with_state(|s| {
            Ok(s.habits
                .values()
                .filter(|h| h.user_id == user)
                .cloned()
                .collect())
        })
    }

    fn insert_habit(&self, habit: &Habit) -> Result<()> {
        self.with_state(|s| {
            s.habits.insert(habit.id, habit.clone());
            Ok(())
        })
    }

    fn deactivate_habit(&self, id: HabitId, at: DateTime<Utc>) -> Result<()> {
        self.with_state(|s| {
            let habit = s
                .habits
                .get_mut(&id)
                .ok_or(CoreError::NotFound(NotFoundError::Habit(id)))?;
            habit.deactivate(at);
            Ok(())
        })
    }

    fn user(&self, id: UserId) -> Result<UserProgress> {
        self.with_state(|s| {
            s.users
                .get(&id)
                .cloned()
                .ok_or_else(|| CoreError::NotFound(NotFoundError::User(id)))
        })
    }

    fn insert_user(&self, user: &UserProgress) -> Result<()> {
        self.with_state(|s| {
            s.users.insert(user.id, user.clone());
            Ok(())
        })
    }

    fn update_user(&self, user: &UserProgress) -> Result<()> {
        self.with_state(|s| {
            if !s.users.contains_key(&user.id) {
                return Err(CoreError::NotFound(NotFoundError::User(user.id)));
            }
            s.users.insert(user.id, user.clone());
            Ok(())
        })
    }

    fn all_user_ids(&self) -> Result<Vec<UserId>> {
        self.with_state(|s| Ok(s.users.keys().copied().collect()))
    }

    fn completions_for_habit(&self, habit: HabitId) -> Result<Vec<Completion>> {
        self.with_state(|s| {
            Ok(s.completions
                .iter()
                .filter(|c| c.habit_id == habit)
                .cloned()
                .collect())
        })
    }

    fn completions_for_user(&self, user: UserId) -> Result<Vec<Completion>> {
        self.with_state(|s| {
            Ok(s.completions
                .iter()
                .filter(|c| c.user_id == user)
                .cloned()
                .collect())
        })
    }

    fn insert_completion(&self, completion: &Completion) -> Result<()> {
        self.with_state(|s| {
            s.completions.push(completion.clone());
            Ok(())
        })
    }

    fn remove_completion(&self, id: CompletionId) -> Result<()> {
        self.with_state(|s| {
            s.completions.retain(|c| c.id != id);
            Ok(())
        })
    }

    fn grant_recorded(&self, user: UserId, day: NaiveDate) -> Result<bool> {
        self.with_state(|s| Ok(s.grants.contains(&(user, day))))
    }

    fn record_grant(&self, user: UserId, day: NaiveDate) -> Result<()> {
        self.with_state(|s| {
            s.grants.insert((user, day));
            Ok(())
        })
    }

    fn spends_on(&self, user: UserId, day: NaiveDate) -> Result<u32> {
        self.with_state(|s| Ok(s.spends.get(&(user, day)).copied().unwrap_or(0)))
    }

    fn record_spend(&self, user: UserId, day: NaiveDate) -> Result<()> {
        self.with_state(|s| {
            *s.spends.entry((user, day)).or_insert(0) += 1;
            Ok(())
        })
    }
}
