//! Habit definitions and lifecycle.
//!
//! A habit is an immutable snapshot once loaded; lifecycle changes
//! (creation, soft deactivation) are expressed as repository deltas. The
//! activity boundary rule lives in exactly one place,
//! [`Habit::eligible_on_day`]: creation day inclusive, deactivation day
//! exclusive.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::zoned::ZonedDay;

/// Weekday names indexed by the 0 = Sunday .. 6 = Saturday convention.
pub const WEEKDAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HabitId(pub Uuid);

impl HabitId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HabitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HabitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for HabitId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// How often a habit expects a completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frequency {
    /// One completion per zoned calendar day.
    Daily,
    /// One completion per ISO week (Monday through Sunday).
    Weekly,
    /// One completion per zoned day, only on the listed weekdays
    /// (0 = Sunday .. 6 = Saturday).
    Custom { days: BTreeSet<u8> },
}

impl Frequency {
    /// Construction-time validation: a custom day set must be non-empty
    /// and each value in 0..=6. Never deferred to completion time.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Frequency::Custom { days } = self {
            if days.is_empty() {
                return Err(ValidationError::NoCustomDays);
            }
            for &value in days {
                if value > 6 {
                    return Err(ValidationError::InvalidDayValue { value });
                }
            }
        }
        Ok(())
    }
}

/// A recurring habit owned by one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub user_id: UserId,
    pub name: String,
    pub frequency: Frequency,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub deactivated_at: Option<DateTime<Utc>>,
}

impl Habit {
    /// Create a validated habit.
    pub fn new(
        user_id: UserId,
        name: impl Into<String>,
        frequency: Frequency,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        frequency.validate()?;
        Ok(Self {
            id: HabitId::new(),
            user_id,
            name,
            frequency,
            active: true,
            created_at,
            deactivated_at: None,
        })
    }

    /// The activity boundary: eligible for zoned day `day` iff the zoned
    /// creation day is on or before `day` (creation day inclusive) and the
    /// zoned deactivation day, if any, is strictly after `day`
    /// (deactivation day exclusive).
    pub fn eligible_on_day(&self, day: &ZonedDay) -> bool {
        let created_day = ZonedDay::of(self.created_at, day.zone());
        if day.days_since(&created_day) < 0 {
            return false;
        }
        match self.deactivated_at {
            Some(deactivated_at) => {
                let deactivated_day = ZonedDay::of(deactivated_at, day.zone());
                day.days_since(&deactivated_day) < 0
            }
            None => true,
        }
    }

    /// Soft-deactivate, retaining history.
    pub fn deactivate(&mut self, at: DateTime<Utc>) {
        self.active = false;
        self.deactivated_at = Some(at);
    }
}
