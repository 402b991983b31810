//! Database schema migrations for habitloop.
//!
//! Migrations are versioned and applied automatically when opening the
//! database. The `schema_version` table tracks the current version.

use rusqlite::{Connection, Result as SqliteResult};

/// Apply all pending migrations.
///
/// # Errors
/// Returns an error if a migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);

    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Create the schema_version table if it doesn't exist.
fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT version FROM schema_version", [], |row| row.get::<_, i32>(0))
        .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// v1: base tables -- users, habits, completions.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id            TEXT PRIMARY KEY,
            telegram_id   INTEGER,
            timezone      TEXT NOT NULL DEFAULT 'UTC',
            subscription_tier TEXT,
            status        TEXT NOT NULL DEFAULT 'active',
            created_at    TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS habits (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            name              TEXT NOT NULL,
            icon              TEXT,
            color             TEXT,
            schedule_kind     TEXT NOT NULL DEFAULT 'daily',
            custom_days       TEXT NOT NULL DEFAULT '[]',
            current_streak    INTEGER NOT NULL DEFAULT 0,
            longest_streak    INTEGER NOT NULL DEFAULT 0,
            total_completions INTEGER NOT NULL DEFAULT 0,
            date_created      TEXT NOT NULL,
            is_active         INTEGER NOT NULL DEFAULT 1,
            is_archived       INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS habit_completions (
            id             TEXT PRIMARY KEY,
            habit_id       TEXT NOT NULL,
            user_id        TEXT NOT NULL,
            completed_date TEXT NOT NULL,
            is_frozen      INTEGER NOT NULL DEFAULT 0,
            created_at     TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_completions_habit_date
            ON habit_completions(habit_id, completed_date);

        CREATE INDEX IF NOT EXISTS idx_habits_user
            ON habits(user_id);",
    )?;
    set_schema_version(conn, 1)
}

/// v2: freeze state columns on users.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "ALTER TABLE users ADD COLUMN habit_freezes_used INTEGER NOT NULL DEFAULT 0;
         ALTER TABLE users ADD COLUMN habit_freezes_reset_month TEXT;
         ALTER TABLE users ADD COLUMN last_freeze_applied_date TEXT;
         ALTER TABLE users ADD COLUMN last_freeze_notification_date TEXT;
         ALTER TABLE users ADD COLUMN last_freeze_habit_id TEXT;
         ALTER TABLE users ADD COLUMN last_freeze_streak INTEGER;",
    )?;
    set_schema_version(conn, 2)
}
