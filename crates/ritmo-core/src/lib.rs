//! # Ritmo Core Library
//!
//! This library provides the core business logic for Ritmo, a habit
//! tracker with streaks, experience points, and a forgiveness-token
//! economy. All progression state is derived from a time-stamped
//! completion log, deterministically and independently of server locale.
//!
//! ## Architecture
//!
//! - **Zoned days**: every calendar comparison goes through [`ZonedDay`],
//!   a value type bounding one civil day in one IANA zone, DST included
//! - **Pure calculators**: eligibility, streaks, and XP are synchronous
//!   functions over explicit snapshots; they hold no mutable state
//! - **Processor**: the single orchestrator sequencing validate → record
//!   → streak → award → events, with per-user mutual exclusion
//! - **Storage**: SQLite-backed repository and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`CompletionProcessor`]: orchestrator for user actions and the
//!   scheduled grant job
//! - [`StreakCalculator`]: streak derivation with single-gap tolerance
//! - [`ForgivenessLedger`]: token grant/spend decision rules
//! - [`level_info`]: the progressive level curve

pub mod clock;
pub mod completion;
pub mod error;
pub mod events;
pub mod forgiveness;
pub mod frequency;
pub mod habit;
pub mod processor;
pub mod repository;
pub mod storage;
pub mod streak;
pub mod user;
pub mod xp;
pub mod zoned;

pub use clock::{Clock, FixedClock, SystemClock};
pub use completion::{Completion, CompletionId};
pub use error::{
    CoreError, DatabaseError, EligibilityError, NotFoundError, TokenError, ValidationError,
};
pub use events::{Event, NoopSink, NotificationSink};
pub use forgiveness::{ForgivenessLedger, GrantOutcome};
pub use frequency::{can_complete, day_state, CompletionDecision, DenyReason, HabitDayState};
pub use habit::{Frequency, Habit, HabitId, UserId};
pub use processor::{
    CompletionOutcome, CompletionProcessor, GrantJobSummary, RevertOutcome, SpendOutcome,
};
pub use repository::{MemoryRepository, Repository};
pub use storage::{EngineConfig, SqliteRepository};
pub use streak::{StreakCalculator, StreakSnapshot};
pub use user::UserProgress;
pub use xp::{award, detect_level_up, level_info, AwardMultiplier, LevelInfo, LevelUp, Reward};
pub use zoned::{is_same_zoned_day, resolve_zone, ZonedDay};
