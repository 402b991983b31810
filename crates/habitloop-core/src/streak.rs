//! Streak computation over a habit's completion history.
//!
//! Both counters walk *scheduled* days only, never raw calendar days: a
//! weekdays-only habit is not penalized for Saturdays, and custom day-set
//! schedules stay correct. Frozen completions are indistinguishable from
//! real ones here; the `is_frozen` flag only matters for display.
//!
//! When a habit's schedule is edited, streaks are re-derived from scratch
//! against the new schedule. History of which schedule was active on which
//! past day is not kept; the resulting values are an accepted approximation.

use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::schedule::Schedule;
use crate::tz::{prev_day, weekday_ordinal};

/// Current and longest streak as of a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct StreakSummary {
    pub current: u32,
    pub longest: u32,
}

impl StreakSummary {
    pub const ZERO: StreakSummary = StreakSummary { current: 0, longest: 0 };
}

/// The most recent scheduled day on or before `date`, if any exists within
/// one week (a schedule with at least one due weekday always has one).
fn latest_scheduled_on_or_before(schedule: &Schedule, date: NaiveDate) -> Option<NaiveDate> {
    let mut cursor = date;
    for _ in 0..7 {
        if schedule.is_due(weekday_ordinal(cursor)) {
            return Some(cursor);
        }
        cursor = prev_day(cursor);
    }
    None
}

/// The nearest scheduled day strictly before `date`, if any.
fn prev_scheduled_before(schedule: &Schedule, date: NaiveDate) -> Option<NaiveDate> {
    latest_scheduled_on_or_before(schedule, prev_day(date))
}

/// Compute `{current, longest}` for a habit.
///
/// * `completions` — every completion date, ordinary and frozen.
/// * `created` — the habit's creation date in the user's timezone; earlier
///   days are never treated as misses.
/// * `today` — the user's local calendar date.
pub fn compute(
    completions: &BTreeSet<NaiveDate>,
    schedule: &Schedule,
    created: NaiveDate,
    today: NaiveDate,
) -> StreakSummary {
    if !schedule.has_due_day() || completions.is_empty() {
        return StreakSummary::ZERO;
    }

    let current = current_streak(completions, schedule, created, today);
    let longest = longest_streak(completions, schedule).max(current);

    StreakSummary { current, longest }
}

/// Walk backward from the most recent scheduled day, counting consecutive
/// scheduled completions.
fn current_streak(
    completions: &BTreeSet<NaiveDate>,
    schedule: &Schedule,
    created: NaiveDate,
    today: NaiveDate,
) -> u32 {
    let Some(mut cursor) = latest_scheduled_on_or_before(schedule, today) else {
        return 0;
    };

    let mut current = 0u32;
    if completions.contains(&cursor) {
        current = 1;
    } else if cursor == today {
        // Today is scheduled but not done yet. The streak is still alive
        // if the previous scheduled day was completed; today just hasn't
        // been missed.
        match prev_scheduled_before(schedule, cursor) {
            Some(prev) if prev >= created && completions.contains(&prev) => {
                current = 1;
                cursor = prev;
            }
            _ => return 0,
        }
    } else {
        // The most recent scheduled day is in the past and was missed.
        return 0;
    }

    while let Some(prev) = prev_scheduled_before(schedule, cursor) {
        if prev < created || !completions.contains(&prev) {
            break;
        }
        current += 1;
        cursor = prev;
    }

    current
}

/// Single forward pass over the sorted, schedule-filtered completion dates:
/// a run continues while each date's preceding scheduled day was itself
/// completed.
fn longest_streak(completions: &BTreeSet<NaiveDate>, schedule: &Schedule) -> u32 {
    let mut longest = 0u32;
    let mut run = 0u32;

    for &date in completions {
        if !schedule.is_due(weekday_ordinal(date)) {
            continue;
        }
        run = match prev_scheduled_before(schedule, date) {
            Some(prev) if completions.contains(&prev) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
    }

    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn dates(items: &[NaiveDate]) -> BTreeSet<NaiveDate> {
        items.iter().copied().collect()
    }

    #[test]
    fn empty_history_is_zero() {
        let today = d(2025, 6, 10);
        assert_eq!(
            compute(&BTreeSet::new(), &Schedule::Daily, d(2025, 6, 10), today),
            StreakSummary::ZERO
        );
    }

    #[test]
    fn daily_run_ending_today() {
        let today = d(2025, 6, 10);
        let history = dates(&[d(2025, 6, 8), d(2025, 6, 9), d(2025, 6, 10)]);
        let summary = compute(&history, &Schedule::Daily, d(2025, 6, 1), today);
        assert_eq!(summary.current, 3);
        assert_eq!(summary.longest, 3);
    }

    #[test]
    fn today_not_done_keeps_streak_alive() {
        // Yesterday completed, today scheduled but not yet done.
        let today = d(2025, 6, 10);
        let history = dates(&[d(2025, 6, 8), d(2025, 6, 9)]);
        let summary = compute(&history, &Schedule::Daily, d(2025, 6, 1), today);
        assert_eq!(summary.current, 2);
    }

    #[test]
    fn missed_yesterday_resets_current() {
        let today = d(2025, 6, 10);
        let history = dates(&[d(2025, 6, 7), d(2025, 6, 8)]);
        let summary = compute(&history, &Schedule::Daily, d(2025, 6, 1), today);
        assert_eq!(summary.current, 0);
        assert_eq!(summary.longest, 2);
    }

    #[test]
    fn weekdays_streak_skips_weekends() {
        // Mon 2025-06-02 .. Fri 2025-06-20: three full Mon-Fri weeks,
        // nothing on weekends. Current must be 15 on the third Friday.
        let mut history = BTreeSet::new();
        for week in 0..3i64 {
            for day in 0..5i64 {
                history.insert(d(2025, 6, 2) + chrono::Duration::days(week * 7 + day));
            }
        }
        let today = d(2025, 6, 20);
        let summary = compute(&history, &Schedule::Weekdays, d(2025, 6, 2), today);
        assert_eq!(summary.current, 15);
        assert_eq!(summary.longest, 15);
    }

    #[test]
    fn weekday_streak_survives_monday_lookback() {
        // Completed Fri, today is Monday not yet done: streak alive across
        // the weekend because Sat/Sun are not scheduled.
        let history = dates(&[d(2025, 6, 5), d(2025, 6, 6)]); // Thu, Fri
        let today = d(2025, 6, 9); // Monday
        let summary = compute(&history, &Schedule::Weekdays, d(2025, 6, 1), today);
        assert_eq!(summary.current, 2);
    }

    #[test]
    fn creation_day_boundary_is_not_a_miss() {
        // Habit created today with no completions: yesterday looks like a
        // scheduled miss but predates creation.
        let today = d(2025, 6, 10);
        let history = dates(&[d(2025, 6, 10)]);
        let summary = compute(&history, &Schedule::Daily, today, today);
        assert_eq!(summary.current, 1);

        let summary = compute(&BTreeSet::new(), &Schedule::Daily, today, today);
        assert_eq!(summary, StreakSummary::ZERO);
    }

    #[test]
    fn walk_stops_at_creation_date() {
        // Completions exist from creation onward; the walk must not extend
        // past the creation date looking for more.
        let created = d(2025, 6, 9);
        let history = dates(&[d(2025, 6, 9), d(2025, 6, 10)]);
        let summary = compute(&history, &Schedule::Daily, created, d(2025, 6, 10));
        assert_eq!(summary.current, 2);
    }

    #[test]
    fn custom_schedule_mon_wed_fri() {
        let schedule = Schedule::custom([0, 2, 4]).unwrap();
        // Mon 2, Wed 4, Fri 6, Mon 9 completed; today Wed 11 not yet done.
        let history = dates(&[d(2025, 6, 2), d(2025, 6, 4), d(2025, 6, 6), d(2025, 6, 9)]);
        let summary = compute(&history, &schedule, d(2025, 6, 1), d(2025, 6, 11));
        assert_eq!(summary.current, 4);
        assert_eq!(summary.longest, 4);
    }

    #[test]
    fn unscheduled_completions_are_ignored() {
        // A Saturday completion on a weekdays habit neither extends nor
        // breaks anything.
        let history = dates(&[d(2025, 6, 5), d(2025, 6, 6), d(2025, 6, 7)]); // Thu, Fri, Sat
        let summary = compute(&history, &Schedule::Weekdays, d(2025, 6, 1), d(2025, 6, 9));
        assert_eq!(summary.current, 2);
        assert_eq!(summary.longest, 2);
    }

    #[test]
    fn longest_survives_in_history_after_gap() {
        // A long run, a gap, then a short current run.
        let history = dates(&[
            d(2025, 6, 1),
            d(2025, 6, 2),
            d(2025, 6, 3),
            d(2025, 6, 4),
            // 5th missed
            d(2025, 6, 6),
            d(2025, 6, 7),
        ]);
        let summary = compute(&history, &Schedule::Daily, d(2025, 5, 1), d(2025, 6, 7));
        assert_eq!(summary.current, 2);
        assert_eq!(summary.longest, 4);
    }

    #[test]
    fn empty_custom_schedule_is_zero() {
        let schedule = Schedule::custom([]).unwrap();
        let history = dates(&[d(2025, 6, 9), d(2025, 6, 10)]);
        assert_eq!(
            compute(&history, &schedule, d(2025, 6, 1), d(2025, 6, 10)),
            StreakSummary::ZERO
        );
    }

    #[test]
    fn frozen_dates_count_like_real_ones() {
        // The calculator sees only dates; a frozen day in the set behaves
        // exactly like a manual completion.
        let history = dates(&[d(2025, 6, 8), d(2025, 6, 9) /* frozen */, d(2025, 6, 10)]);
        let summary = compute(&history, &Schedule::Daily, d(2025, 6, 1), d(2025, 6, 10));
        assert_eq!(summary.current, 3);
    }

    proptest! {
        #[test]
        fn longest_is_at_least_current(
            offsets in proptest::collection::btree_set(0i64..60, 0..40),
            kind in 0u8..4,
            day_bits in 0u8..128,
        ) {
            let base = d(2025, 1, 1);
            let today = d(2025, 3, 1);
            let schedule = match kind {
                0 => Schedule::Daily,
                1 => Schedule::Weekdays,
                2 => Schedule::Weekends,
                _ => Schedule::custom((0..7u8).filter(|b| day_bits & (1 << b) != 0)).unwrap(),
            };
            let history: BTreeSet<NaiveDate> = offsets
                .iter()
                .map(|o| base + chrono::Duration::days(*o))
                .collect();
            let summary = compute(&history, &schedule, base, today);
            prop_assert!(summary.longest >= summary.current);
        }
    }
}
