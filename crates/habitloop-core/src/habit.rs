//! Domain model: users, habits, completions, subscription tiers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::Schedule;

/// Subscription tier, as stored on the user row.
///
/// The engine only consumes the tier through [`SubscriptionTier::freeze_limit`];
/// `daily_habit_limit` exists for the CRUD layer, which shares the tier concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
}

impl SubscriptionTier {
    /// Streak freezes available per calendar month.
    pub fn freeze_limit(&self) -> u32 {
        match self {
            SubscriptionTier::Free => 1,
            SubscriptionTier::Basic => 3,
            SubscriptionTier::Premium => 6,
        }
    }

    /// Maximum number of active habits (enforced by the CRUD layer).
    pub fn daily_habit_limit(&self) -> u32 {
        match self {
            SubscriptionTier::Free => 3,
            SubscriptionTier::Basic => 10,
            SubscriptionTier::Premium => 25,
        }
    }
}

/// Parse subscription tier from database string
pub fn parse_tier(tier_str: Option<&str>) -> SubscriptionTier {
    match tier_str {
        Some("premium") => SubscriptionTier::Premium,
        Some("basic") => SubscriptionTier::Basic,
        _ => SubscriptionTier::Free,
    }
}

/// Format subscription tier for database storage
pub fn format_tier(tier: SubscriptionTier) -> &'static str {
    match tier {
        SubscriptionTier::Free => "free",
        SubscriptionTier::Basic => "basic",
        SubscriptionTier::Premium => "premium",
    }
}

/// A user of the habit engine.
///
/// The `habit_freezes_*` and `last_freeze_*` columns are mutated only by
/// the freeze sweep and the monthly reset; everything else is read-only to
/// this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Telegram chat id for notifications, if linked.
    pub telegram_id: Option<i64>,
    /// IANA timezone identifier; unrecognized values fall back to UTC.
    pub timezone: String,
    pub tier: SubscriptionTier,
    /// Only `active` users are swept.
    pub status: String,
    pub freezes_used: u32,
    /// First-of-month marker; a stale value means `freezes_used` is due a reset.
    pub freezes_reset_month: Option<NaiveDate>,
    pub last_freeze_applied_date: Option<NaiveDate>,
    /// The frozen date, pending 09:00 notification delivery.
    pub last_freeze_notification_date: Option<NaiveDate>,
    pub last_freeze_habit_id: Option<String>,
    pub last_freeze_streak: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, timezone: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            telegram_id: None,
            timezone: timezone.into(),
            tier: SubscriptionTier::Free,
            status: "active".to_string(),
            freezes_used: 0,
            freezes_reset_month: None,
            last_freeze_applied_date: None,
            last_freeze_notification_date: None,
            last_freeze_habit_id: None,
            last_freeze_streak: None,
            created_at: Utc::now(),
        }
    }
}

/// A habit with its cached streak counters.
///
/// `current_streak`, `longest_streak` and `total_completions` are a
/// materialized cache over the completion rows; they are recomputed on
/// every completion change and must never be patched independently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub icon: Option<String>,
    pub color: Option<String>,
    pub schedule: Schedule,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub total_completions: u32,
    /// Calendar date in the user's timezone at creation time. Days before
    /// this are never counted as misses.
    pub date_created: NaiveDate,
    pub is_active: bool,
    pub is_archived: bool,
}

impl Habit {
    pub fn new(
        user_id: impl Into<String>,
        name: impl Into<String>,
        schedule: Schedule,
        date_created: NaiveDate,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            name: name.into(),
            icon: None,
            color: None,
            schedule,
            current_streak: 0,
            longest_streak: 0,
            total_completions: 0,
            date_created,
            is_active: true,
            is_archived: false,
        }
    }
}

/// A completion row: one per (habit, calendar day) at most.
///
/// A frozen completion was inserted by the freeze sweep rather than the
/// user; it counts identically for streak math and differs only for
/// display.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub id: String,
    pub habit_id: String,
    pub user_id: String,
    pub completed_date: NaiveDate,
    pub is_frozen: bool,
    pub created_at: DateTime<Utc>,
}
