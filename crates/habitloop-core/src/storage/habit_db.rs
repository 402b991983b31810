//! SQLite-based storage for users, habits, and completions.
//!
//! This layer owns the two correctness mechanisms the engine relies on:
//! the `UNIQUE(habit_id, completed_date)` index with conflict-free inserts
//! (completion idempotency), and the guarded conditional UPDATE that makes
//! freeze application first-writer-wins per user per local day.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::{data_dir, migrations};
use crate::error::{CoreError, DatabaseError};
use crate::habit::{format_tier, parse_tier, Completion, Habit, User};
use crate::schedule::{format_schedule, parse_schedule, Schedule};

// === Helper Functions ===

/// Parse a stored `YYYY-MM-DD` date column.
fn parse_date_column(idx: usize, value: String) -> Result<NaiveDate, rusqlite::Error> {
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_date_column_opt(
    idx: usize,
    value: Option<String>,
) -> Result<Option<NaiveDate>, rusqlite::Error> {
    value.map(|v| parse_date_column(idx, v)).transpose()
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Build a Habit from a database row.
///
/// Column order: id, user_id, name, icon, color, schedule_kind, custom_days,
/// current_streak, longest_streak, total_completions, date_created,
/// is_active, is_archived.
fn row_to_habit(row: &rusqlite::Row) -> Result<Habit, rusqlite::Error> {
    let kind: String = row.get(5)?;
    let days_json: String = row.get(6)?;
    let schedule = parse_schedule(&kind, &days_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Habit {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        icon: row.get(3)?,
        color: row.get(4)?,
        schedule,
        current_streak: row.get::<_, i64>(7)?.max(0) as u32,
        longest_streak: row.get::<_, i64>(8)?.max(0) as u32,
        total_completions: row.get::<_, i64>(9)?.max(0) as u32,
        date_created: parse_date_column(10, row.get(10)?)?,
        is_active: row.get(11)?,
        is_archived: row.get(12)?,
    })
}

/// Build a User from a database row.
///
/// Column order: id, telegram_id, timezone, subscription_tier, status,
/// created_at, habit_freezes_used, habit_freezes_reset_month,
/// last_freeze_applied_date, last_freeze_notification_date,
/// last_freeze_habit_id, last_freeze_streak.
fn row_to_user(row: &rusqlite::Row) -> Result<User, rusqlite::Error> {
    let tier: Option<String> = row.get(3)?;
    Ok(User {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        timezone: row.get(2)?,
        tier: parse_tier(tier.as_deref()),
        status: row.get(4)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
        freezes_used: row.get::<_, i64>(6)?.max(0) as u32,
        freezes_reset_month: parse_date_column_opt(7, row.get(7)?)?,
        last_freeze_applied_date: parse_date_column_opt(8, row.get(8)?)?,
        last_freeze_notification_date: parse_date_column_opt(9, row.get(9)?)?,
        last_freeze_habit_id: row.get(10)?,
        last_freeze_streak: row.get::<_, Option<i64>>(11)?.map(|v| v.max(0) as u32),
    })
}

fn row_to_completion(row: &rusqlite::Row) -> Result<Completion, rusqlite::Error> {
    Ok(Completion {
        id: row.get(0)?,
        habit_id: row.get(1)?,
        user_id: row.get(2)?,
        completed_date: parse_date_column(3, row.get(3)?)?,
        is_frozen: row.get(4)?,
        created_at: parse_datetime_fallback(&row.get::<_, String>(5)?),
    })
}

const USER_COLUMNS: &str = "id, telegram_id, timezone, subscription_tier, status, created_at,
     habit_freezes_used, habit_freezes_reset_month, last_freeze_applied_date,
     last_freeze_notification_date, last_freeze_habit_id, last_freeze_streak";

const HABIT_COLUMNS: &str = "id, user_id, name, icon, color, schedule_kind, custom_days,
     current_streak, longest_streak, total_completions, date_created, is_active, is_archived";

/// SQLite database for habit engine storage.
pub struct HabitDb {
    conn: Connection,
}

impl HabitDb {
    /// Open the database at `<data_dir>/habitloop.db`, migrating as needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("habitloop.db");
        Self::open_at(&path)
    }

    /// Open the database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    #[cfg(test)]
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        migrations::migrate(&self.conn).map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    /// Test hook for writing rows the typed API would reject.
    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> Result<(), DatabaseError> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    // === Users ===

    pub fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO users (id, telegram_id, timezone, subscription_tier, status, created_at,
                 habit_freezes_used, habit_freezes_reset_month, last_freeze_applied_date,
                 last_freeze_notification_date, last_freeze_habit_id, last_freeze_streak)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                user.id,
                user.telegram_id,
                user.timezone,
                format_tier(user.tier),
                user.status,
                user.created_at.to_rfc3339(),
                user.freezes_used as i64,
                user.freezes_reset_month.map(|d| d.to_string()),
                user.last_freeze_applied_date.map(|d| d.to_string()),
                user.last_freeze_notification_date.map(|d| d.to_string()),
                user.last_freeze_habit_id,
                user.last_freeze_streak.map(|v| v as i64),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let user = self
            .conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Users the freeze sweep iterates: active status with at least one
    /// active, non-archived habit.
    pub fn list_users_with_active_habits(&self) -> Result<Vec<User>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT DISTINCT {USER_COLUMNS}
             FROM users
             WHERE status = 'active'
               AND id IN (SELECT user_id FROM habits WHERE is_active = 1 AND is_archived = 0)
             ORDER BY id ASC"
        ))?;
        let users = stmt
            .query_map([], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    pub fn update_user_timezone(&self, id: &str, timezone: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn
            .execute("UPDATE users SET timezone = ?2 WHERE id = ?1", params![id, timezone])?;
        Ok(n > 0)
    }

    pub fn update_user_tier(
        &self,
        id: &str,
        tier: crate::habit::SubscriptionTier,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE users SET subscription_tier = ?2 WHERE id = ?1",
            params![id, format_tier(tier)],
        )?;
        Ok(n > 0)
    }

    pub fn set_user_telegram(&self, id: &str, telegram_id: i64) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE users SET telegram_id = ?2 WHERE id = ?1",
            params![id, telegram_id],
        )?;
        Ok(n > 0)
    }

    // === Habits ===

    pub fn insert_habit(&self, habit: &Habit) -> Result<(), DatabaseError> {
        let (kind, days) = format_schedule(&habit.schedule);
        self.conn.execute(
            "INSERT INTO habits (id, user_id, name, icon, color, schedule_kind, custom_days,
                 current_streak, longest_streak, total_completions, date_created, is_active, is_archived)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                habit.id,
                habit.user_id,
                habit.name,
                habit.icon,
                habit.color,
                kind,
                days,
                habit.current_streak as i64,
                habit.longest_streak as i64,
                habit.total_completions as i64,
                habit.date_created.to_string(),
                habit.is_active,
                habit.is_archived,
            ],
        )?;
        Ok(())
    }

    pub fn get_habit(&self, id: &str) -> Result<Option<Habit>, DatabaseError> {
        let habit = self
            .conn
            .query_row(
                &format!("SELECT {HABIT_COLUMNS} FROM habits WHERE id = ?1"),
                params![id],
                row_to_habit,
            )
            .optional()?;
        Ok(habit)
    }

    /// Active, non-archived habits for a user.
    pub fn list_active_habits(&self, user_id: &str) -> Result<Vec<Habit>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits
             WHERE user_id = ?1 AND is_active = 1 AND is_archived = 0
             ORDER BY date_created ASC, id ASC"
        ))?;
        let habits = stmt
            .query_map(params![user_id], row_to_habit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    /// All habits for a user, archived included (history survives archiving).
    pub fn list_habits(&self, user_id: &str) -> Result<Vec<Habit>, DatabaseError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {HABIT_COLUMNS} FROM habits WHERE user_id = ?1
             ORDER BY date_created ASC, id ASC"
        ))?;
        let habits = stmt
            .query_map(params![user_id], row_to_habit)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(habits)
    }

    /// Soft-delete: completions are kept so streak history stays rebuildable.
    pub fn archive_habit(&self, id: &str) -> Result<bool, DatabaseError> {
        let n = self
            .conn
            .execute("UPDATE habits SET is_archived = 1 WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn set_habit_schedule(&self, id: &str, schedule: &Schedule) -> Result<bool, DatabaseError> {
        let (kind, days) = format_schedule(schedule);
        let n = self.conn.execute(
            "UPDATE habits SET schedule_kind = ?2, custom_days = ?3 WHERE id = ?1",
            params![id, kind, days],
        )?;
        Ok(n > 0)
    }

    /// Persist the recomputed streak cache for a habit.
    pub fn update_habit_streak(
        &self,
        id: &str,
        current: u32,
        longest: u32,
        total_completions: u32,
    ) -> Result<(), DatabaseError> {
        self.conn.execute(
            "UPDATE habits SET current_streak = ?2, longest_streak = ?3, total_completions = ?4
             WHERE id = ?1",
            params![id, current as i64, longest as i64, total_completions as i64],
        )?;
        Ok(())
    }

    // === Completions ===

    /// Insert a completion for (habit, date); a duplicate is a no-op.
    ///
    /// Returns whether a row was actually inserted.
    pub fn insert_completion(
        &self,
        habit_id: &str,
        user_id: &str,
        date: NaiveDate,
        frozen: bool,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "INSERT INTO habit_completions (id, habit_id, user_id, completed_date, is_frozen, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(habit_id, completed_date) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                habit_id,
                user_id,
                date.to_string(),
                frozen,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(n > 0)
    }

    /// Delete the completion for (habit, date), returning whether one existed.
    pub fn delete_completion(&self, habit_id: &str, date: NaiveDate) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "DELETE FROM habit_completions WHERE habit_id = ?1 AND completed_date = ?2",
            params![habit_id, date.to_string()],
        )?;
        Ok(n > 0)
    }

    pub fn has_completion(&self, habit_id: &str, date: NaiveDate) -> Result<bool, DatabaseError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM habit_completions WHERE habit_id = ?1 AND completed_date = ?2",
            params![habit_id, date.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every completion date for a habit, frozen included.
    pub fn completion_dates(&self, habit_id: &str) -> Result<BTreeSet<NaiveDate>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT completed_date FROM habit_completions WHERE habit_id = ?1",
        )?;
        let mut rows = stmt.query(params![habit_id])?;
        let mut dates = BTreeSet::new();
        while let Some(row) = rows.next()? {
            dates.insert(parse_date_column(0, row.get(0)?)?);
        }
        Ok(dates)
    }

    /// Completion rows in `[from, to]`, ordered by date.
    pub fn completions_in_range(
        &self,
        habit_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Completion>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, habit_id, user_id, completed_date, is_frozen, created_at
             FROM habit_completions
             WHERE habit_id = ?1 AND completed_date >= ?2 AND completed_date <= ?3
             ORDER BY completed_date ASC",
        )?;
        let completions = stmt
            .query_map(params![habit_id, from.to_string(), to.to_string()], row_to_completion)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(completions)
    }

    // === Freeze state ===

    /// Atomically consume one freeze quota unit for `user_id`.
    ///
    /// The `WHERE` guard makes only the first writer per local day win; a
    /// concurrent or repeated tick affects zero rows and the caller must
    /// not insert frozen completions. Rolling into a new month resets the
    /// counter to 1 in the same statement.
    ///
    /// Returns whether the update took effect.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_freeze_guarded(
        &self,
        user_id: &str,
        today: NaiveDate,
        month_start: NaiveDate,
        frozen_date: NaiveDate,
        habit_id: &str,
        streak: u32,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE users SET
                 habit_freezes_used = CASE
                     WHEN habit_freezes_reset_month IS NULL OR habit_freezes_reset_month < ?3
                     THEN 1
                     ELSE habit_freezes_used + 1
                 END,
                 habit_freezes_reset_month = ?3,
                 last_freeze_applied_date = ?2,
                 last_freeze_notification_date = ?4,
                 last_freeze_habit_id = ?5,
                 last_freeze_streak = ?6
             WHERE id = ?1
               AND (last_freeze_applied_date IS NULL OR last_freeze_applied_date < ?2)",
            params![
                user_id,
                today.to_string(),
                month_start.to_string(),
                frozen_date.to_string(),
                habit_id,
                streak as i64,
            ],
        )?;
        Ok(n > 0)
    }

    /// Zero the freeze counter if the stored reset month is stale.
    ///
    /// The guard ensures the reset fires exactly once per month even under
    /// concurrent callers.
    pub fn reset_freezes_if_stale(
        &self,
        user_id: &str,
        month_start: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE users SET habit_freezes_used = 0, habit_freezes_reset_month = ?2
             WHERE id = ?1
               AND (habit_freezes_reset_month IS NULL OR habit_freezes_reset_month < ?2)",
            params![user_id, month_start.to_string()],
        )?;
        Ok(n > 0)
    }

    /// Clear the pending freeze notification marker, conditionally on it
    /// still holding `marker` so delivery fires exactly once.
    pub fn clear_freeze_notification(
        &self,
        user_id: &str,
        marker: NaiveDate,
    ) -> Result<bool, DatabaseError> {
        let n = self.conn.execute(
            "UPDATE users SET last_freeze_notification_date = NULL
             WHERE id = ?1 AND last_freeze_notification_date = ?2",
            params![user_id, marker.to_string()],
        )?;
        Ok(n > 0)
    }
}
