//! Completion records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::habit::{HabitId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionId(pub Uuid);

impl CompletionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CompletionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CompletionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One recorded habit completion.
///
/// Belongs to exactly one habit and one user, never reassigned. Immutable
/// once persisted apart from the `edited` flag; the only removal path is
/// the same-day uncomplete operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub id: CompletionId,
    pub habit_id: HabitId,
    pub user_id: UserId,
    pub completed_at: DateTime<Utc>,
    /// IANA zone id reported by the device at completion time. Recorded
    /// verbatim for audit; streak math always uses the user's zone.
    pub device_timezone: String,
    pub xp_earned: u32,
    pub forgiveness_used: bool,
    pub edited: bool,
}

impl Completion {
    pub fn new(
        habit_id: HabitId,
        user_id: UserId,
        completed_at: DateTime<Utc>,
        device_timezone: impl Into<String>,
    ) -> Self {
        Self {
            id: CompletionId::new(),
            habit_id,
            user_id,
            completed_at,
            device_timezone: device_timezone.into(),
            xp_earned: 0,
            forgiveness_used: false,
            edited: false,
        }
    }

    /// Synthetic completion inserted by a forgiveness spend.
    pub fn forgiven(
        habit_id: HabitId,
        user_id: UserId,
        completed_at: DateTime<Utc>,
        xp_earned: u32,
    ) -> Self {
        Self {
            id: CompletionId::new(),
            habit_id,
            user_id,
            completed_at,
            device_timezone: String::new(),
            xp_earned,
            forgiveness_used: true,
            edited: false,
        }
    }
}
