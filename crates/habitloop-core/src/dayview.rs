//! Day view query: which habits are due on a date and how they stand.
//!
//! This is the typed form of the `GET /habits?date=` contract: due habits
//! with their completion status, a trailing 7-day completion window, and
//! the user's freeze info.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::error::Result;
use crate::freeze::{freeze_info, FreezeInfo};
use crate::habit::User;
use crate::schedule::Schedule;
use crate::storage::HabitDb;
use crate::tz::weekday_ordinal;

/// One due habit in the day view.
#[derive(Debug, Clone, Serialize)]
pub struct HabitDayView {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub schedule: Schedule,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u32,
    pub completed: bool,
    /// Set when the completion for the day was sweep-inserted.
    pub completed_frozen: bool,
    /// Completion dates in the 7-day window ending at the requested date.
    pub completed_dates: Vec<NaiveDate>,
}

/// The full day view payload.
#[derive(Debug, Clone, Serialize)]
pub struct DayView {
    pub date: NaiveDate,
    pub habits: Vec<HabitDayView>,
    pub freeze: FreezeInfo,
}

/// Habits due on `date` for a user, with completion state and freeze info.
///
/// `today` is the user's current local date; it drives the freeze-quota
/// month, while `date` may be any past day being browsed.
pub fn habits_for_date(
    db: &HabitDb,
    user: &User,
    date: NaiveDate,
    today: NaiveDate,
) -> Result<DayView> {
    let weekday = weekday_ordinal(date);
    let window_start = date - Duration::days(6);

    let mut habits = Vec::new();
    for habit in db.list_active_habits(&user.id)? {
        if !habit.schedule.is_due(weekday) || habit.date_created > date {
            continue;
        }

        let window = db.completions_in_range(&habit.id, window_start, date)?;
        let on_date = window.iter().find(|c| c.completed_date == date);

        habits.push(HabitDayView {
            id: habit.id.clone(),
            name: habit.name,
            icon: habit.icon,
            color: habit.color,
            schedule: habit.schedule,
            current_streak: habit.current_streak,
            longest_streak: habit.longest_streak,
            total_completions: habit.total_completions,
            completed: on_date.is_some(),
            completed_frozen: on_date.is_some_and(|c| c.is_frozen),
            completed_dates: window.iter().map(|c| c.completed_date).collect(),
        });
    }

    Ok(DayView {
        date,
        habits,
        freeze: freeze_info(db, user, today)?,
    })
}
