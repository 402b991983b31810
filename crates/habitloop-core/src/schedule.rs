//! Habit schedules and the due-day predicate.
//!
//! Four schedule kinds exist: daily, weekdays, weekends, and a custom set
//! of weekdays. The predicate is pure and total; it is used both to filter
//! which habits appear on a given day and to decide, inside the streak and
//! freeze logic, which past days count as missed versus not applicable.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// When a habit is due.
///
/// Weekday ordinals use the fixed convention 0=Mon .. 6=Sun.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum Schedule {
    /// Due every day
    Daily,
    /// Due Monday through Friday
    Weekdays,
    /// Due Saturday and Sunday
    Weekends,
    /// Due on an explicit set of weekdays
    Custom(BTreeSet<u8>),
}

impl Schedule {
    /// Whether a habit with this schedule is due on the given weekday.
    pub fn is_due(&self, weekday: u8) -> bool {
        match self {
            Schedule::Daily => true,
            Schedule::Weekdays => weekday <= 4,
            Schedule::Weekends => weekday == 5 || weekday == 6,
            Schedule::Custom(days) => days.contains(&weekday),
        }
    }

    /// Whether any weekday is due at all.
    ///
    /// A custom schedule with an empty day set is legal but never due; the
    /// streak walk short-circuits on it instead of searching for a
    /// scheduled day that does not exist.
    pub fn has_due_day(&self) -> bool {
        (0..7u8).any(|d| self.is_due(d))
    }

    /// Build a custom schedule, rejecting out-of-range ordinals.
    pub fn custom(days: impl IntoIterator<Item = u8>) -> Result<Self, ValidationError> {
        let days: BTreeSet<u8> = days.into_iter().collect();
        if let Some(bad) = days.iter().find(|d| **d > 6) {
            return Err(ValidationError::InvalidSchedule(format!(
                "weekday ordinal {bad} out of range 0..=6"
            )));
        }
        Ok(Schedule::Custom(days))
    }
}

/// Parse a schedule from its database representation.
///
/// `kind` is one of `daily | weekdays | weekends | custom`; `days_json` is
/// a JSON array of weekday ordinals, meaningful only for `custom`.
pub fn parse_schedule(kind: &str, days_json: &str) -> Result<Schedule, ValidationError> {
    match kind {
        "daily" => Ok(Schedule::Daily),
        "weekdays" => Ok(Schedule::Weekdays),
        "weekends" => Ok(Schedule::Weekends),
        "custom" => {
            let days: Vec<u8> = serde_json::from_str(days_json).map_err(|e| {
                ValidationError::InvalidSchedule(format!("bad custom days '{days_json}': {e}"))
            })?;
            Schedule::custom(days)
        }
        other => Err(ValidationError::InvalidSchedule(format!(
            "unknown schedule kind '{other}'"
        ))),
    }
}

/// Format a schedule for database storage as `(kind, days_json)`.
pub fn format_schedule(schedule: &Schedule) -> (&'static str, String) {
    match schedule {
        Schedule::Daily => ("daily", "[]".to_string()),
        Schedule::Weekdays => ("weekdays", "[]".to_string()),
        Schedule::Weekends => ("weekends", "[]".to_string()),
        Schedule::Custom(days) => {
            let days: Vec<u8> = days.iter().copied().collect();
            ("custom", serde_json::to_string(&days).unwrap_or_else(|_| "[]".to_string()))
        }
    }
}
