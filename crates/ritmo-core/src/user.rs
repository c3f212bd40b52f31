//! User progression state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::habit::UserId;

/// Per-user progression snapshot.
///
/// `total_xp` and `forgiveness_tokens` are mutated exclusively through the
/// processor's locked read-modify-write sections; `current_level` is
/// always recomputed from `total_xp`, never adjusted independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProgress {
    pub id: UserId,
    /// IANA zone id the user experiences their days in.
    pub timezone: String,
    pub total_xp: u64,
    pub current_level: u32,
    pub forgiveness_tokens: u8,
    pub created_at: DateTime<Utc>,
}

impl UserProgress {
    pub fn new(timezone: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: UserId::new(),
            timezone: timezone.into(),
            total_xp: 0,
            current_level: 1,
            forgiveness_tokens: 0,
            created_at,
        }
    }
}
