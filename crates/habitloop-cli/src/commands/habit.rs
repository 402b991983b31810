//! Habit management commands for CLI.

use chrono::{NaiveDate, Utc};
use clap::Subcommand;
use habitloop_core::dayview::habits_for_date;
use habitloop_core::habit::Habit;
use habitloop_core::schedule::Schedule;
use habitloop_core::storage::HabitDb;
use habitloop_core::toggle::toggle_completion;
use habitloop_core::tz::{local_today, resolve};

#[derive(Subcommand)]
pub enum HabitAction {
    /// Create a new habit
    Create {
        /// Owning user ID
        user_id: String,
        /// Habit name
        name: String,
        /// Schedule: daily, weekdays, weekends, or custom:0,2,4 (0 = Monday)
        #[arg(long, default_value = "daily")]
        schedule: String,
        /// Display icon
        #[arg(long)]
        icon: Option<String>,
        /// Display color
        #[arg(long)]
        color: Option<String>,
    },
    /// List a user's habits
    List {
        /// User ID
        user_id: String,
        /// Include archived habits
        #[arg(long)]
        all: bool,
    },
    /// Get habit details
    Get {
        /// Habit ID
        id: String,
    },
    /// Toggle a completion on or off
    Toggle {
        /// Habit ID
        id: String,
        /// Date (YYYY-MM-DD, default: user's local today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Show the day view: due habits with completion state and freeze info
    Day {
        /// User ID
        user_id: String,
        /// Date (YYYY-MM-DD, default: user's local today)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Replace a habit's schedule
    SetSchedule {
        /// Habit ID
        id: String,
        /// Schedule: daily, weekdays, weekends, or custom:0,2,4
        schedule: String,
    },
    /// Archive a habit (soft delete)
    Archive {
        /// Habit ID
        id: String,
    },
}

pub fn run(action: HabitAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = HabitDb::open()?;

    match action {
        HabitAction::Create { user_id, name, schedule, icon, color } => {
            let user = db
                .get_user(&user_id)?
                .ok_or(format!("User not found: {user_id}"))?;

            let limit = user.tier.daily_habit_limit() as usize;
            if db.list_active_habits(&user.id)?.len() >= limit {
                return Err(format!(
                    "Habit limit reached: {} tier allows {limit} active habits",
                    habitloop_core::habit::format_tier(user.tier)
                )
                .into());
            }

            let today = local_today(resolve(&user.timezone), Utc::now());
            let mut habit = Habit::new(user.id, name, parse_schedule_arg(&schedule)?, today);
            habit.icon = icon;
            habit.color = color;
            db.insert_habit(&habit)?;
            println!("Habit created: {}", habit.id);
            println!("{}", serde_json::to_string_pretty(&habit)?);
        }
        HabitAction::List { user_id, all } => {
            let habits = if all {
                db.list_habits(&user_id)?
            } else {
                db.list_active_habits(&user_id)?
            };
            println!("{}", serde_json::to_string_pretty(&habits)?);
        }
        HabitAction::Get { id } => match db.get_habit(&id)? {
            Some(habit) => println!("{}", serde_json::to_string_pretty(&habit)?),
            None => println!("Habit not found: {id}"),
        },
        HabitAction::Toggle { id, date } => {
            let outcome = toggle_completion(&db, Utc::now(), &id, date)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        HabitAction::Day { user_id, date } => {
            let user = db
                .get_user(&user_id)?
                .ok_or(format!("User not found: {user_id}"))?;
            let today = local_today(resolve(&user.timezone), Utc::now());
            let view = habits_for_date(&db, &user, date.unwrap_or(today), today)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }
        HabitAction::SetSchedule { id, schedule } => {
            let schedule = parse_schedule_arg(&schedule)?;
            let habit = db.get_habit(&id)?.ok_or(format!("Habit not found: {id}"))?;
            db.set_habit_schedule(&habit.id, &schedule)?;

            // Forward-only recompute: the cached streak is refreshed against
            // the new schedule, history is not rewritten.
            let user = db
                .get_user(&habit.user_id)?
                .ok_or(format!("User not found: {}", habit.user_id))?;
            let today = local_today(resolve(&user.timezone), Utc::now());
            let dates = db.completion_dates(&habit.id)?;
            let summary =
                habitloop_core::streak::compute(&dates, &schedule, habit.date_created, today);
            db.update_habit_streak(&habit.id, summary.current, summary.longest, dates.len() as u32)?;
            println!("Schedule updated: {id}");
        }
        HabitAction::Archive { id } => {
            if db.archive_habit(&id)? {
                println!("Habit archived: {id}");
            } else {
                println!("Habit not found: {id}");
            }
        }
    }
    Ok(())
}

fn parse_schedule_arg(s: &str) -> Result<Schedule, Box<dyn std::error::Error>> {
    match s {
        "daily" => Ok(Schedule::Daily),
        "weekdays" => Ok(Schedule::Weekdays),
        "weekends" => Ok(Schedule::Weekends),
        other => {
            let days = other
                .strip_prefix("custom:")
                .ok_or(format!("Unknown schedule: {other}"))?;
            let days = days
                .split(',')
                .map(|d| d.trim().parse::<u8>())
                .collect::<Result<Vec<u8>, _>>()
                .map_err(|_| format!("Invalid custom days: {days}"))?;
            Ok(Schedule::custom(days)?)
        }
    }
}
