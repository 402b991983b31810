//! Request-driven completion toggling.
//!
//! Flips a single (habit, date) completion and synchronously recomputes the
//! streak cache. Freezing is exclusively the sweep's job: a manual toggle
//! always inserts `is_frozen = false` and never applies freezes
//! retroactively.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::{CoreError, Result, ValidationError};
use crate::storage::HabitDb;
use crate::streak;
use crate::tz::{local_today, resolve, weekday_ordinal};

/// Result of a toggle request.
#[derive(Debug, Clone, Serialize)]
pub struct ToggleOutcome {
    pub completed: bool,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u32,
    /// Whether every habit scheduled for the target date now has a
    /// completion. Derived for celebratory UI signaling, not stored.
    pub all_scheduled_completed: bool,
}

/// Toggle the completion for `habit_id` on `date` (defaults to the user's
/// local today).
///
/// # Errors
/// Returns `ValidationError::FutureDate` if `date` is after the user's
/// local today; storage errors surface to the caller, who is expected to
/// revert any optimistic UI state.
pub fn toggle_completion(
    db: &HabitDb,
    now: DateTime<Utc>,
    habit_id: &str,
    date: Option<NaiveDate>,
) -> Result<ToggleOutcome> {
    let habit = db.get_habit(habit_id)?.ok_or_else(|| CoreError::NotFound {
        entity: "habit",
        id: habit_id.to_string(),
    })?;
    let user = db.get_user(&habit.user_id)?.ok_or_else(|| CoreError::NotFound {
        entity: "user",
        id: habit.user_id.clone(),
    })?;

    let tz = resolve(&user.timezone);
    let today = local_today(tz, now);
    let target = date.unwrap_or(today);
    if target > today {
        return Err(ValidationError::FutureDate { date: target, today }.into());
    }

    let completed = if db.has_completion(&habit.id, target)? {
        db.delete_completion(&habit.id, target)?;
        false
    } else {
        db.insert_completion(&habit.id, &user.id, target, false)?;
        true
    };

    let dates = db.completion_dates(&habit.id)?;
    let summary = streak::compute(&dates, &habit.schedule, habit.date_created, today);
    let total_completions = dates.len() as u32;
    db.update_habit_streak(&habit.id, summary.current, summary.longest, total_completions)?;

    Ok(ToggleOutcome {
        completed,
        current_streak: summary.current,
        longest_streak: summary.longest,
        total_completions,
        all_scheduled_completed: all_scheduled_completed(db, &user.id, target)?,
    })
}

/// True when at least one habit is scheduled for `date` and every one of
/// them has a completion row.
fn all_scheduled_completed(db: &HabitDb, user_id: &str, date: NaiveDate) -> Result<bool> {
    let weekday = weekday_ordinal(date);
    let due: Vec<_> = db
        .list_active_habits(user_id)?
        .into_iter()
        .filter(|h| h.schedule.is_due(weekday) && h.date_created <= date)
        .collect();

    if due.is_empty() {
        return Ok(false);
    }
    for habit in &due {
        if !db.has_completion(&habit.id, date)? {
            return Ok(false);
        }
    }
    Ok(true)
}
