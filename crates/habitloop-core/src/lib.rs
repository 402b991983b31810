//! # Habitloop Core Library
//!
//! This library provides the core business logic for the Habitloop habit
//! tracker. It implements a CLI-first philosophy where all operations are
//! available via a standalone CLI binary, with any chat or web front end
//! being a thin layer over the same core library.
//!
//! ## Architecture
//!
//! - **Streak Engine**: Pure calendar arithmetic over completion dates,
//!   evaluated in each user's IANA timezone
//! - **Freeze Sweep**: A minute-beat background pass that spends monthly
//!   freeze quota to preserve streaks across missed days
//! - **Storage**: SQLite-based habit/completion storage and TOML-based
//!   configuration
//! - **Notifications**: Pluggable delivery, with a Telegram Bot API sender
//!
//! ## Key Components
//!
//! - [`streak::compute`]: Streak calculation over a completion set
//! - [`FreezeSweeper`] / [`FreezeScheduler`]: The background sweep
//! - [`HabitDb`]: Habit, user, and completion persistence
//! - [`Notifier`]: Trait for outbound notification channels

pub mod clock;
pub mod dayview;
pub mod error;
pub mod freeze;
pub mod habit;
pub mod notify;
pub mod schedule;
pub mod storage;
pub mod streak;
pub mod sweep;
pub mod toggle;
pub mod tz;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dayview::{habits_for_date, DayView, HabitDayView};
pub use error::{ConfigError, CoreError, DatabaseError, NotifyError, Result, ValidationError};
pub use freeze::{freeze_info, freezes_remaining, FreezeInfo};
pub use habit::{Completion, Habit, SubscriptionTier, User};
pub use notify::{LogNotifier, Notifier, TelegramNotifier};
pub use schedule::Schedule;
pub use storage::{Config, HabitDb};
pub use streak::StreakSummary;
pub use sweep::{FreezeScheduler, FreezeSweeper, SweepReport, UserSweepOutcome};
pub use toggle::{toggle_completion, ToggleOutcome};
