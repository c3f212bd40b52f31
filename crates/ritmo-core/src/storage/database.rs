//! SQLite-backed repository.
//!
//! Durable storage for habits, completions, user progression, and the
//! forgiveness ledger's idempotency records. Timestamps are stored as
//! RFC 3339 TEXT; custom day sets as JSON arrays.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use super::data_dir;
use crate::completion::{Completion, CompletionId};
use crate::error::{CoreError, DatabaseError, NotFoundError, Result};
use crate::habit::{Frequency, Habit, HabitId, UserId};
use crate::repository::Repository;
use crate::user::UserProgress;

/// SQLite database implementing [`Repository`].
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open the database at `~/.config/ritmo/ritmo.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> Result<Self> {
        let path = data_dir()?.join("ritmo.db");
        Self::open_at(&path)
    }

    /// Open a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).map_err(|source| {
            CoreError::Database(DatabaseError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })
        })?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.migrate()?;
        Ok(repo)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            CoreError::Database(DatabaseError::QueryFailed(e.to_string()))
        })?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.migrate()?;
        Ok(repo)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS users (
                id                 TEXT PRIMARY KEY,
                timezone           TEXT NOT NULL,
                total_xp           INTEGER NOT NULL DEFAULT 0,
                current_level      INTEGER NOT NULL DEFAULT 1,
                forgiveness_tokens INTEGER NOT NULL DEFAULT 0,
                created_at         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS habits (
                id             TEXT PRIMARY KEY,
                user_id        TEXT NOT NULL,
                name           TEXT NOT NULL,
                frequency      TEXT NOT NULL,
                custom_days    TEXT,
                active         INTEGER NOT NULL DEFAULT 1,
                created_at     TEXT NOT NULL,
                deactivated_at TEXT
            );

            CREATE TABLE IF NOT EXISTS completions (
                id               TEXT PRIMARY KEY,
                habit_id         TEXT NOT NULL,
                user_id          TEXT NOT NULL,
                completed_at     TEXT NOT NULL,
                device_timezone  TEXT NOT NULL DEFAULT '',
                xp_earned        INTEGER NOT NULL DEFAULT 0,
                forgiveness_used INTEGER NOT NULL DEFAULT 0,
                edited           INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS forgiveness_grants (
                user_id TEXT NOT NULL,
                day     TEXT NOT NULL,
                PRIMARY KEY (user_id, day)
            );

            CREATE TABLE IF NOT EXISTS forgiveness_spends (
                user_id TEXT NOT NULL,
                day     TEXT NOT NULL,
                count   INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, day)
            );

            CREATE INDEX IF NOT EXISTS idx_habits_user ON habits(user_id);
            CREATE INDEX IF NOT EXISTS idx_completions_habit ON completions(habit_id);
            CREATE INDEX IF NOT EXISTS idx_completions_user ON completions(user_id);
            CREATE INDEX IF NOT EXISTS idx_completions_completed_at ON completions(completed_at);",
        )
        .map_err(|e| CoreError::Database(DatabaseError::MigrationFailed(e.to_string())))?;
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn habit_from_row(row: &Row<'_>) -> rusqlite::Result<Habit> {
    let id: String = row.get("id")?;
    let user_id: String = row.get("user_id")?;
    let frequency: String = row.get("frequency")?;
    let custom_days: Option<String> = row.get("custom_days")?;
    let created_at: String = row.get("created_at")?;
    let deactivated_at: Option<String> = row.get("deactivated_at")?;

    let frequency = match frequency.as_str() {
        "daily" => Frequency::Daily,
        "weekly" => Frequency::Weekly,
        "custom" => {
            let days: BTreeSet<u8> = custom_days
                .as_deref()
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or_default();
            Frequency::Custom { days }
        }
        other => {
            return Err(corrupt("habits", format!("unknown frequency '{other}'")));
        }
    };

    Ok(Habit {
        id: HabitId(parse_uuid(&id, "habits")?),
        user_id: UserId(parse_uuid(&user_id, "habits")?),
        name: row.get("name")?,
        frequency,
        active: row.get::<_, i64>("active")? != 0,
        created_at: parse_instant(&created_at, "habits")?,
        deactivated_at: match deactivated_at {
            Some(raw) => Some(parse_instant(&raw, "habits")?),
            None => None,
        },
    })
}

fn completion_from_row(row: &Row<'_>) -> rusqlite::Result<Completion> {
    let id: String = row.get("id")?;
    let habit_id: String = row.get("habit_id")?;
    let user_id: String = row.get("user_id")?;
    let completed_at: String = row.get("completed_at")?;
    Ok(Completion {
        id: CompletionId(parse_uuid(&id, "completions")?),
        habit_id: HabitId(parse_uuid(&habit_id, "completions")?),
        user_id: UserId(parse_uuid(&user_id, "completions")?),
        completed_at: parse_instant(&completed_at, "completions")?,
        device_timezone: row.get("device_timezone")?,
        xp_earned: row.get::<_, i64>("xp_earned")? as u32,
        forgiveness_used: row.get::<_, i64>("forgiveness_used")? != 0,
        edited: row.get::<_, i64>("edited")? != 0,
    })
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserProgress> {
    let id: String = row.get("id")?;
    let created_at: String = row.get("created_at")?;
    Ok(UserProgress {
        id: UserId(parse_uuid(&id, "users")?),
        timezone: row.get("timezone")?,
        total_xp: row.get::<_, i64>("total_xp")? as u64,
        current_level: row.get::<_, i64>("current_level")? as u32,
        forgiveness_tokens: row.get::<_, i64>("forgiveness_tokens")? as u8,
        created_at: parse_instant(&created_at, "users")?,
    })
}

fn parse_uuid(raw: &str, table: &str) -> rusqlite::Result<Uuid> {
    raw.parse()
        .map_err(|_| corrupt(table, format!("bad uuid '{raw}'")))
}

fn parse_instant(raw: &str, table: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| corrupt(table, format!("bad timestamp '{raw}'")))
}

fn corrupt(table: &str, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        Box::new(CoreError::Database(DatabaseError::CorruptRow {
            table: table.to_string(),
            message,
        })),
    )
}

fn frequency_columns(frequency: &Frequency) -> (&'static str, Option<String>) {
    match frequency {
        Frequency::Daily => ("daily", None),
        Frequency::Weekly => ("weekly", None),
        Frequency::Custom { days } => (
            "custom",
            Some(serde_json::to_string(days).unwrap_or_else(|_| "[]".to_string())),
        ),
    }
}

impl Repository for SqliteRepository {
    fn habit(&self, id: HabitId) -> Result<Habit> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM habits WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id.0.to_string()], habit_from_row)?;
        match rows.next() {
            Some(habit) => Ok(habit?),
            None => Err(CoreError::NotFound(NotFoundError::Habit(id))),
        }
    }

    fn habits_for_user(&self, user: UserId) -> Result<Vec<Habit>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT * FROM habits WHERE user_id = ?1 ORDER BY created_at")?;
        let rows = stmt.query_map(params![user.0.to_string()], habit_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn insert_habit(&self, habit: &Habit) -> Result<()> {
        let (frequency, custom_days) = frequency_columns(&habit.frequency);
        let conn = self.lock();
        conn.execute(
            "INSERT INTO habits (id, user_id, name, frequency, custom_days, active, created_at, deactivated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                habit.id.0.to_string(),
                habit.user_id.0.to_string(),
                habit.name,
                frequency,
                custom_days,
                habit.active as i64,
                habit.created_at.to_rfc3339(),
                habit.deactivated_at.map(|at| at.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    fn deactivate_habit(&self, id: HabitId, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE habits SET active = 0, deactivated_at = ?2 WHERE id = ?1",
            params![id.0.to_string(), at.to_rfc3339()],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(NotFoundError::Habit(id)));
        }
        Ok(())
    }

    fn user(&self, id: UserId) -> Result<UserProgress> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT * FROM users WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id.0.to_string()], user_from_row)?;
        match rows.next() {
            Some(user) => Ok(user?),
            None => Err(CoreError::NotFound(NotFoundError::User(id))),
        }
    }

    fn insert_user(&self, user: &UserProgress) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO users (id, timezone, total_xp, current_level, forgiveness_tokens, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                user.id.0.to_string(),
                user.timezone,
                user.total_xp as i64,
                user.current_level as i64,
                user.forgiveness_tokens as i64,
                user.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn update_user(&self, user: &UserProgress) -> Result<()> {
        let conn = self.lock();
        let changed = conn.execute(
            "UPDATE users SET timezone = ?2, total_xp = ?3, current_level = ?4, forgiveness_tokens = ?5
             WHERE id = ?1",
            params![
                user.id.0.to_string(),
                user.timezone,
                user.total_xp as i64,
                user.current_level as i64,
                user.forgiveness_tokens as i64,
            ],
        )?;
        if changed == 0 {
            return Err(CoreError::NotFound(NotFoundError::User(user.id)));
        }
        Ok(())
    }

    fn all_user_ids(&self) -> Result<Vec<UserId>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM users")?;
        let rows = stmt.query_map([], |row| {
            let id: String = row.get(0)?;
            Ok(UserId(parse_uuid(&id, "users")?))
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn completions_for_habit(&self, habit: HabitId) -> Result<Vec<Completion>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM completions WHERE habit_id = ?1 ORDER BY completed_at DESC")?;
        let rows = stmt.query_map(params![habit.0.to_string()], completion_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn completions_for_user(&self, user: UserId) -> Result<Vec<Completion>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM completions WHERE user_id = ?1 ORDER BY completed_at DESC")?;
        let rows = stmt.query_map(params![user.0.to_string()], completion_from_row)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn insert_completion(&self, completion: &Completion) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO completions (id, habit_id, user_id, completed_at, device_timezone, xp_earned, forgiveness_used, edited)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                completion.id.0.to_string(),
                completion.habit_id.0.to_string(),
                completion.user_id.0.to_string(),
                completion.completed_at.to_rfc3339(),
                completion.device_timezone,
                completion.xp_earned as i64,
                completion.forgiveness_used as i64,
                completion.edited as i64,
            ],
        )?;
        Ok(())
    }

    fn remove_completion(&self, id: CompletionId) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM completions WHERE id = ?1",
            params![id.0.to_string()],
        )?;
        Ok(())
    }

    fn grant_recorded(&self, user: UserId, day: NaiveDate) -> Result<bool> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT 1 FROM forgiveness_grants WHERE user_id = ?1 AND day = ?2")?;
        let found = stmt.exists(params![user.0.to_string(), day.to_string()])?;
        Ok(found)
    }

    fn record_grant(&self, user: UserId, day: NaiveDate) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR IGNORE INTO forgiveness_grants (user_id, day) VALUES (?1, ?2)",
            params![user.0.to_string(), day.to_string()],
        )?;
        Ok(())
    }

    fn spends_on(&self, user: UserId, day: NaiveDate) -> Result<u32> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT count FROM forgiveness_spends WHERE user_id = ?1 AND day = ?2")?;
        let mut rows = stmt.query_map(params![user.0.to_string(), day.to_string()], |row| {
            row.get::<_, i64>(0)
        })?;
        match rows.next() {
            Some(count) => Ok(count? as u32),
            None => Ok(0),
        }
    }

    fn record_spend(&self, user: UserId, day: NaiveDate) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO forgiveness_spends (user_id, day, count) VALUES (?1, ?2, 1)
             ON CONFLICT (user_id, day) DO UPDATE SET count = count + 1",
            params![user.0.to_string(), day.to_string()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_user() -> UserProgress {
        UserProgress::new(
            "Europe/Oslo",
            Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap(),
        )
    }

    #[test]
    fn habit_round_trip_preserves_custom_days() {
        let repo = SqliteRepository::open_memory().unwrap();
        let user = sample_user();
        repo.insert_user(&user).unwrap();
        let habit = Habit::new(
            user.id,
            "Gym",
            Frequency::Custom {
                days: [1, 3, 5].into_iter().collect(),
            },
            user.created_at,
        )
        .unwrap();
        repo.insert_habit(&habit).unwrap();
        let loaded = repo.habit(habit.id).unwrap();
        assert_eq!(loaded, habit);
    }

    #[test]
    fn completion_round_trip() {
        let repo = SqliteRepository::open_memory().unwrap();
        let user = sample_user();
        let habit = Habit::new(user.id, "Read", Frequency::Daily, user.created_at).unwrap();
        let mut completion = Completion::new(
            habit.id,
            user.id,
            Utc.with_ymd_and_hms(2024, 1, 15, 9, 30, 0).unwrap(),
            "Europe/Oslo",
        );
        completion.xp_earned = 45;
        repo.insert_completion(&completion).unwrap();
        let loaded = repo.completions_for_habit(habit.id).unwrap();
        assert_eq!(loaded, vec![completion]);
    }

    #[test]
    fn user_update_persists_progression() {
        let repo = SqliteRepository::open_memory().unwrap();
        let mut user = sample_user();
        repo.insert_user(&user).unwrap();
        user.total_xp = 250;
        user.current_level = 3;
        user.forgiveness_tokens = 2;
        repo.update_user(&user).unwrap();
        let loaded = repo.user(user.id).unwrap();
        assert_eq!(loaded.total_xp, 250);
        assert_eq!(loaded.current_level, 3);
        assert_eq!(loaded.forgiveness_tokens, 2);
    }

    #[test]
    fn grant_records_are_idempotent_keys() {
        let repo = SqliteRepository::open_memory().unwrap();
        let user = sample_user();
        let day = NaiveDate::from_ymd_opt(2024, 1, 14).unwrap();
        assert!(!repo.grant_recorded(user.id, day).unwrap());
        repo.record_grant(user.id, day).unwrap();
        repo.record_grant(user.id, day).unwrap();
        assert!(repo.grant_recorded(user.id, day).unwrap());
    }

    #[test]
    fn spend_counter_increments() {
        let repo = SqliteRepository::open_memory().unwrap();
        let user = sample_user();
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        repo.record_spend(user.id, day).unwrap();
        repo.record_spend(user.id, day).unwrap();
        assert_eq!(repo.spends_on(user.id, day).unwrap(), 2);
    }

    #[test]
    fn removing_a_completion_deletes_exactly_one_row() {
        let repo = SqliteRepository::open_memory().unwrap();
        let user = sample_user();
        let habit = Habit::new(user.id, "Read", Frequency::Daily, user.created_at).unwrap();
        let a = Completion::new(habit.id, user.id, user.created_at, "UTC");
        let b = Completion::new(
            habit.id,
            user.id,
            user.created_at + chrono::Duration::days(1),
            "UTC",
        );
        repo.insert_completion(&a).unwrap();
        repo.insert_completion(&b).unwrap();
        repo.remove_completion(a.id).unwrap();
        let left = repo.completions_for_habit(habit.id).unwrap();
        assert_eq!(left, vec![b]);
    }

    #[test]
    fn persists_across_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ritmo.db");
        let user = sample_user();
        {
            let repo = SqliteRepository::open_at(&path).unwrap();
            repo.insert_user(&user).unwrap();
        }
        let repo = SqliteRepository::open_at(&path).unwrap();
        assert_eq!(repo.user(user.id).unwrap().timezone, "Europe/Oslo");
    }
}
