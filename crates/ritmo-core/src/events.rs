//! Engine events.
//!
//! Every progression-relevant state change produces an [`Event`]. The
//! notification dispatcher consumes them fire-and-forget; nothing in the
//! core ever depends on a sink's behavior.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::{HabitId, UserId};
use crate::xp::{LevelUp, Reward};

/// Streak lengths worth announcing.
pub const STREAK_MILESTONES: [u32; 5] = [7, 30, 100, 200, 365];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    CompletionRecorded {
        habit_id: HabitId,
        user_id: UserId,
        day: NaiveDate,
        xp_awarded: u32,
        current_streak: u32,
        at: DateTime<Utc>,
    },
    /// Same-day uncomplete reversed a completion and its award.
    CompletionReverted {
        habit_id: HabitId,
        user_id: UserId,
        day: NaiveDate,
        xp_reversed: u32,
        at: DateTime<Utc>,
    },
    StreakMilestone {
        habit_id: HabitId,
        user_id: UserId,
        length: u32,
        at: DateTime<Utc>,
    },
    LevelUp {
        user_id: UserId,
        from_level: u32,
        to_level: u32,
        rewards: Vec<Reward>,
        at: DateTime<Utc>,
    },
    ForgivenessGranted {
        user_id: UserId,
        /// The zoned day whose completions qualified the grant.
        qualifying_day: NaiveDate,
        balance: u8,
        at: DateTime<Utc>,
    },
    ForgivenessSpent {
        user_id: UserId,
        habit_id: HabitId,
        target_day: NaiveDate,
        balance: u8,
        at: DateTime<Utc>,
    },
}

impl Event {
    pub fn level_up(user_id: UserId, up: &LevelUp, at: DateTime<Utc>) -> Self {
        Event::LevelUp {
            user_id,
            from_level: up.from_level,
            to_level: up.to_level,
            rewards: up.rewards.clone(),
            at,
        }
    }
}

/// Fire-and-forget event consumer.
///
/// Implementations must not fail the calling operation; delivery errors
/// are theirs to swallow or log.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, event: &Event);
}

/// Default sink: drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn deliver(&self, _event: &Event) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = Event::StreakMilestone {
            habit_id: HabitId::new(),
            user_id: UserId::new(),
            length: 30,
            at: Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"StreakMilestone\""));
        assert!(json.contains("\"length\":30"));
    }
}
