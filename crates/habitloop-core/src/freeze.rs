//! Freeze quota accounting.
//!
//! A freeze is a system-inserted synthetic completion that preserves a
//! streak across one missed scheduled day. The quota is monthly and
//! tier-derived; the stored counter lazily resets when the stored
//! first-of-month marker goes stale.

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::Result;
use crate::habit::{SubscriptionTier, User};
use crate::storage::HabitDb;
use crate::tz::first_of_month;

/// The `GET /habits/freeze` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FreezeInfo {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub tier: SubscriptionTier,
}

/// Whether the stored reset marker predates the current month.
pub fn month_is_stale(reset_month: Option<NaiveDate>, today: NaiveDate) -> bool {
    match reset_month {
        Some(marker) => marker < first_of_month(today),
        None => true,
    }
}

/// The freeze count actually consumed this month, treating a stale marker
/// as zero without touching storage.
pub fn effective_freezes_used(user: &User, today: NaiveDate) -> u32 {
    if month_is_stale(user.freezes_reset_month, today) {
        0
    } else {
        user.freezes_used
    }
}

/// Quota units still available to `user` as of `today`.
pub fn freezes_remaining(user: &User, today: NaiveDate) -> u32 {
    user.tier
        .freeze_limit()
        .saturating_sub(effective_freezes_used(user, today))
}

/// Freeze-info query: applies the lazy monthly reset, then reports the
/// counters.
pub fn freeze_info(db: &HabitDb, user: &User, today: NaiveDate) -> Result<FreezeInfo> {
    if month_is_stale(user.freezes_reset_month, today) {
        db.reset_freezes_if_stale(&user.id, first_of_month(today))?;
    }
    let used = effective_freezes_used(user, today);
    let limit = user.tier.freeze_limit();
    Ok(FreezeInfo {
        used,
        limit,
        remaining: limit.saturating_sub(used),
        tier: user.tier,
    })
}
