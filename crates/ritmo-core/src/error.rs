//! Core error types for ritmo-core.
//!
//! Four recoverable domain families (validation, eligibility, not-found,
//! token ledger) are surfaced verbatim to the caller for user-facing
//! display; database and config wrappers cover the storage layer.

use std::path::PathBuf;
use thiserror::Error;

use crate::habit::{HabitId, UserId};

/// Core error type for ritmo-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed habit definition
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Frequency or lifecycle denial
    #[error("Eligibility error: {0}")]
    Eligibility(#[from] EligibilityError),

    /// Unknown habit or user
    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// Forgiveness ledger precondition failures
    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Habit-definition validation errors, raised at construction time.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Custom-frequency habit with an empty day set
    #[error("Custom frequency requires at least one weekday")]
    NoCustomDays,

    /// Weekday value outside 0..=6
    #[error("Invalid weekday value {value}: must be in 0..=6 (0 = Sunday)")]
    InvalidDayValue { value: u8 },

    /// Empty habit name
    #[error("Habit name must not be empty")]
    EmptyName,
}

/// Completion-eligibility denial, carrying the typed reason.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Completion denied for habit {habit_id}: {reason}")]
pub struct EligibilityError {
    pub habit_id: HabitId,
    pub reason: crate::frequency::DenyReason,
}

/// Unknown-entity errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotFoundError {
    #[error("Unknown habit {0}")]
    Habit(HabitId),

    #[error("Unknown user {0}")]
    User(UserId),

    /// No completion exists to revert for the given zoned day
    #[error("No completion recorded today for habit {0}")]
    CompletionToday(HabitId),
}

/// Forgiveness-ledger spend/grant precondition failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Target date is after today in the user's zone
    #[error("Cannot forgive a future date")]
    FutureDate,

    /// Target date is today or more than the window allows in the past
    #[error("Target date is outside the forgiveness window of {window_days} past days")]
    OutOfWindow { window_days: i64 },

    /// A completion already exists for the habit on the target date
    #[error("Habit already has a completion on the target date")]
    AlreadyCompleted,

    /// Balance is zero
    #[error("No forgiveness tokens available")]
    InsufficientTokens,

    /// Per-user-per-day spend cap exhausted
    #[error("Daily forgiveness spend cap of {cap} reached")]
    DailySpendCapReached { cap: u32 },
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row contains data the domain layer rejects
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: String, message: String },
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Home directory could not be determined
    #[error("Could not determine a data directory")]
    NoDataDir,
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        DatabaseError::QueryFailed(err.to_string())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
