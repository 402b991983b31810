//! Freeze scheduler: the minute-granularity background sweep.
//!
//! One tick evaluates the whole user population. Per user, the sweep fires
//! at two local times: 00:05 (apply a streak freeze for yesterday's missed
//! habits, quota permitting) and 09:00 (deliver the pending freeze
//! notification). Ticks tolerate overlap; the guarded conditional update
//! in storage, not a lock, is what makes freeze application exactly-once
//! per user per local day.

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::clock::Clock;
use crate::error::Result;
use crate::freeze::freezes_remaining;
use crate::habit::{Habit, User};
use crate::notify::Notifier;
use crate::storage::HabitDb;
use crate::streak;
use crate::tz::{first_of_month, prev_day, resolve, weekday_ordinal};

/// Local (hour, minute) at which freezes are applied for the prior day.
const FREEZE_APPLY_AT: (u32, u32) = (0, 5);
/// Local (hour, minute) at which the freeze notification is delivered.
const NOTIFY_AT: (u32, u32) = (9, 0);

/// What one tick did for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSweepOutcome {
    NoAction,
    FreezeApplied { frozen_habits: usize },
    Notified,
}

/// Aggregate counters for one tick.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SweepReport {
    pub users: usize,
    pub freezes_applied: usize,
    pub notifications_sent: usize,
    pub errors: usize,
}

/// Evaluates sweep ticks against storage.
pub struct FreezeSweeper<C: Clock, N: Notifier> {
    db: HabitDb,
    clock: C,
    notifier: N,
}

impl<C: Clock, N: Notifier> FreezeSweeper<C, N> {
    pub fn new(db: HabitDb, clock: C, notifier: N) -> Self {
        Self { db, clock, notifier }
    }

    pub fn db(&self) -> &HabitDb {
        &self.db
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    /// Run one tick at the clock's current instant.
    pub fn tick(&self) -> SweepReport {
        self.tick_at(self.clock.now_utc())
    }

    /// Run one tick at an explicit instant.
    ///
    /// Any per-user failure is logged and skipped; it never aborts the
    /// sweep for other users.
    pub fn tick_at(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let users = match self.db.list_users_with_active_habits() {
            Ok(users) => users,
            Err(e) => {
                tracing::error!(error = %e, "sweep could not list users");
                report.errors += 1;
                return report;
            }
        };
        report.users = users.len();

        for user in users {
            match self.sweep_user(&user, now) {
                Ok(UserSweepOutcome::FreezeApplied { frozen_habits }) => {
                    report.freezes_applied += 1;
                    tracing::info!(user = %user.id, frozen_habits, "streak freeze applied");
                }
                Ok(UserSweepOutcome::Notified) => report.notifications_sent += 1,
                Ok(UserSweepOutcome::NoAction) => {}
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(user = %user.id, error = %e, "sweep skipped user");
                }
            }
        }

        report
    }

    fn sweep_user(&self, user: &User, now: DateTime<Utc>) -> Result<UserSweepOutcome> {
        let tz = resolve(&user.timezone);
        let local = now.with_timezone(&tz);
        let hm = (local.hour(), local.minute());
        let today = local.date_naive();

        if hm == FREEZE_APPLY_AT {
            self.evaluate_freeze(user, today)
        } else if hm == NOTIFY_AT {
            self.deliver_notification(user, today)
        } else {
            Ok(UserSweepOutcome::NoAction)
        }
    }

    /// Guards: not already applied today, quota remaining, and at least
    /// one streak-bearing habit that was scheduled yesterday and missed.
    fn evaluate_freeze(&self, user: &User, today: NaiveDate) -> Result<UserSweepOutcome> {
        if user.last_freeze_applied_date.is_some_and(|d| d >= today) {
            return Ok(UserSweepOutcome::NoAction);
        }
        if freezes_remaining(user, today) == 0 {
            return Ok(UserSweepOutcome::NoAction);
        }

        let yesterday = prev_day(today);
        let weekday = weekday_ordinal(yesterday);

        let mut qualifying: Vec<Habit> = Vec::new();
        for habit in self.db.list_active_habits(&user.id)? {
            if habit.current_streak > 0
                && habit.date_created <= yesterday
                && habit.schedule.is_due(weekday)
                && !self.db.has_completion(&habit.id, yesterday)?
            {
                qualifying.push(habit);
            }
        }
        if qualifying.is_empty() {
            return Ok(UserSweepOutcome::NoAction);
        }

        // Highest pre-freeze streak names the notification; ties go to the
        // smallest id so re-evaluation picks the same habit.
        let trigger = qualifying
            .iter()
            .max_by(|a, b| {
                a.current_streak
                    .cmp(&b.current_streak)
                    .then_with(|| b.id.cmp(&a.id))
            })
            .expect("qualifying is non-empty");

        // Only the first writer per local day gets past this; a lost race
        // means another tick already applied today's freeze.
        let won = self.db.apply_freeze_guarded(
            &user.id,
            today,
            first_of_month(today),
            yesterday,
            &trigger.id,
            trigger.current_streak,
        )?;
        if !won {
            return Ok(UserSweepOutcome::NoAction);
        }

        let frozen_habits = qualifying.len();
        for habit in &qualifying {
            self.db.insert_completion(&habit.id, &user.id, yesterday, true)?;
            let dates = self.db.completion_dates(&habit.id)?;
            let summary = streak::compute(&dates, &habit.schedule, habit.date_created, today);
            self.db
                .update_habit_streak(&habit.id, summary.current, summary.longest, dates.len() as u32)?;
        }

        Ok(UserSweepOutcome::FreezeApplied { frozen_habits })
    }

    /// Deliver the pending freeze notification exactly once: the marker is
    /// claimed with a conditional clear before sending, so an overlapping
    /// tick observes zero affected rows and stands down.
    fn deliver_notification(&self, user: &User, today: NaiveDate) -> Result<UserSweepOutcome> {
        let yesterday = prev_day(today);
        if user.last_freeze_notification_date != Some(yesterday) {
            return Ok(UserSweepOutcome::NoAction);
        }
        if !self.db.clear_freeze_notification(&user.id, yesterday)? {
            return Ok(UserSweepOutcome::NoAction);
        }

        let habit_name = user
            .last_freeze_habit_id
            .as_deref()
            .and_then(|id| self.db.get_habit(id).ok().flatten())
            .map(|h| h.name)
            .unwrap_or_else(|| "a habit".to_string());
        let streak = user.last_freeze_streak.unwrap_or(0);
        let remaining = freezes_remaining(user, today);
        let limit = user.tier.freeze_limit();

        let message = format!(
            "🧊 Streak freeze used! Your <b>{habit_name}</b> streak of {streak} was saved on {yesterday}. \
             {remaining} of {limit} freezes left this month."
        );

        if let Err(e) = self.notifier.notify(user, &message) {
            tracing::warn!(user = %user.id, error = %e, "freeze notification failed");
        }

        Ok(UserSweepOutcome::Notified)
    }
}

/// Owned background task running the sweep once per minute.
///
/// The loop aligns to wall-clock minute boundaries and runs each tick in a
/// blocking section (storage is synchronous). Overlap with a slow previous
/// tick is tolerated by design.
pub struct FreezeScheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl FreezeScheduler {
    /// Spawn the sweep loop onto the current tokio runtime.
    pub fn start<C, N>(sweeper: FreezeSweeper<C, N>) -> Self
    where
        C: Clock + 'static,
        N: Notifier + 'static,
    {
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut sweeper = sweeper;
            loop {
                let delay = delay_to_next_minute(sweeper.now());
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                match tokio::task::spawn_blocking(move || {
                    let report = sweeper.tick();
                    (sweeper, report)
                })
                .await
                {
                    Ok((returned, report)) => {
                        sweeper = returned;
                        tracing::debug!(?report, "sweep tick finished");
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "sweep tick panicked, stopping scheduler");
                        break;
                    }
                }
            }
        });

        Self { shutdown, handle }
    }

    /// Signal shutdown and wait for the loop to finish.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.handle.await;
    }
}

/// Time until the next wall-clock minute boundary.
fn delay_to_next_minute(now: DateTime<Utc>) -> std::time::Duration {
    let next = (now + chrono::Duration::minutes(1))
        .with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);
    (next - now).to_std().unwrap_or(std::time::Duration::from_secs(60))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use crate::clock::SystemClock;
    use crate::error::NotifyError;
    use crate::notify::LogNotifier;
    use crate::schedule::Schedule;

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<String>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, _user: &User, message: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push(message.to_string());
            Ok(())
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap()
    }

    /// User "u1" (UTC, free tier) with a daily habit completed June 5-8
    /// and a cached streak of 4. June 9 is the missed day.
    fn seed_missed_yesterday(db: &HabitDb) -> Habit {
        db.insert_user(&User::new("u1", "UTC")).unwrap();
        let habit = Habit::new("u1", "Read", Schedule::Daily, d(2025, 6, 1));
        db.insert_habit(&habit).unwrap();
        for day in 5..=8 {
            db.insert_completion(&habit.id, "u1", d(2025, 6, day), false).unwrap();
        }
        db.update_habit_streak(&habit.id, 4, 4, 4).unwrap();
        habit
    }

    fn sweeper(db: HabitDb) -> FreezeSweeper<SystemClock, RecordingNotifier> {
        FreezeSweeper::new(db, SystemClock, RecordingNotifier::default())
    }

    #[test]
    fn freeze_applied_once_at_00_05() {
        let db = HabitDb::open_memory().unwrap();
        let habit = seed_missed_yesterday(&db);
        let sweeper = sweeper(db);

        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 1);
        assert_eq!(report.errors, 0);

        let db = sweeper.db();
        let rows = db.completions_in_range(&habit.id, d(2025, 6, 9), d(2025, 6, 9)).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].is_frozen);

        let user = db.get_user("u1").unwrap().unwrap();
        assert_eq!(user.freezes_used, 1);
        assert_eq!(user.last_freeze_applied_date, Some(d(2025, 6, 10)));
        assert_eq!(user.last_freeze_notification_date, Some(d(2025, 6, 9)));
        assert_eq!(user.last_freeze_habit_id.as_deref(), Some(habit.id.as_str()));
        assert_eq!(user.last_freeze_streak, Some(4));

        // Streak cache recomputed over the frozen day: 5 days through
        // June 9, still alive on June 10.
        let stored = db.get_habit(&habit.id).unwrap().unwrap();
        assert_eq!(stored.current_streak, 5);
        assert_eq!(stored.longest_streak, 5);
        assert_eq!(stored.total_completions, 5);

        // Re-running the same day's tick is a no-op.
        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 0);
        assert_eq!(sweeper.db().get_user("u1").unwrap().unwrap().freezes_used, 1);
    }

    #[test]
    fn tick_reads_the_injected_clock() {
        let db = HabitDb::open_memory().unwrap();
        seed_missed_yesterday(&db);
        let clock = Arc::new(crate::clock::FixedClock::new(at(2025, 6, 10, 0, 5)));
        let notifier = RecordingNotifier::default();
        let sent = notifier.sent.clone();
        let sweeper = FreezeSweeper::new(db, clock.clone(), notifier);

        let report = sweeper.tick();
        assert_eq!(report.freezes_applied, 1);

        // Advance the shared clock to 09:00; the next tick delivers.
        clock.set(at(2025, 6, 10, 9, 0));
        let report = sweeper.tick();
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn nothing_happens_off_the_minute() {
        let db = HabitDb::open_memory().unwrap();
        seed_missed_yesterday(&db);
        let sweeper = sweeper(db);

        for (h, m) in [(0, 4), (0, 6), (12, 5), (23, 59)] {
            let report = sweeper.tick_at(at(2025, 6, 10, h, m));
            assert_eq!(report.freezes_applied, 0, "fired at {h:02}:{m:02}");
        }
    }

    #[test]
    fn sweep_fires_at_user_local_midnight() {
        let db = HabitDb::open_memory().unwrap();
        db.insert_user(&User::new("u1", "Asia/Tokyo")).unwrap();
        let habit = Habit::new("u1", "Read", Schedule::Daily, d(2025, 6, 1));
        db.insert_habit(&habit).unwrap();
        for day in 5..=8 {
            db.insert_completion(&habit.id, "u1", d(2025, 6, day), false).unwrap();
        }
        db.update_habit_streak(&habit.id, 4, 4, 4).unwrap();
        let sweeper = sweeper(db);

        // 15:05 UTC on June 9 is 00:05 June 10 in Tokyo.
        let report = sweeper.tick_at(at(2025, 6, 9, 15, 5));
        assert_eq!(report.freezes_applied, 1);
        assert!(sweeper.db().has_completion(&habit.id, d(2025, 6, 9)).unwrap());

        // The same instant is 01:05 June 10 UTC later; no double fire.
        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 0);
    }

    #[test]
    fn exhausted_quota_blocks_freeze() {
        let db = HabitDb::open_memory().unwrap();
        seed_missed_yesterday(&db);
        // Free tier limit is 1 and it was spent earlier this month.
        db.apply_freeze_guarded("u1", d(2025, 6, 5), d(2025, 6, 1), d(2025, 6, 4), "other", 1)
            .unwrap();
        let sweeper = sweeper(db);

        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 0);
    }

    #[test]
    fn stale_month_resets_before_quota_check() {
        let db = HabitDb::open_memory().unwrap();
        let habit = seed_missed_yesterday(&db);
        // Quota fully spent, but two months ago.
        db.apply_freeze_guarded("u1", d(2025, 4, 20), d(2025, 4, 1), d(2025, 4, 19), "other", 1)
            .unwrap();
        let sweeper = sweeper(db);

        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 1);

        let user = sweeper.db().get_user("u1").unwrap().unwrap();
        assert_eq!(user.freezes_used, 1);
        assert_eq!(user.freezes_reset_month, Some(d(2025, 6, 1)));
        assert!(sweeper.db().has_completion(&habit.id, d(2025, 6, 9)).unwrap());
    }

    #[test]
    fn zero_streak_and_unscheduled_habits_do_not_qualify() {
        let db = HabitDb::open_memory().unwrap();
        db.insert_user(&User::new("u1", "UTC")).unwrap();

        // Streak is zero: nothing worth freezing.
        let cold = Habit::new("u1", "Cold", Schedule::Daily, d(2025, 6, 1));
        db.insert_habit(&cold).unwrap();

        // Weekday habit, and yesterday (June 8) was a Sunday.
        let weekday = Habit::new("u1", "Work", Schedule::Weekdays, d(2025, 6, 1));
        db.insert_habit(&weekday).unwrap();
        db.update_habit_streak(&weekday.id, 5, 5, 5).unwrap();

        // Created today: yesterday predates creation.
        let fresh = Habit::new("u1", "Fresh", Schedule::Daily, d(2025, 6, 9));
        db.insert_habit(&fresh).unwrap();
        db.update_habit_streak(&fresh.id, 1, 1, 1).unwrap();

        let sweeper = sweeper(db);
        let report = sweeper.tick_at(at(2025, 6, 9, 0, 5));
        assert_eq!(report.freezes_applied, 0);
    }

    #[test]
    fn multiple_missed_habits_share_one_quota_unit() {
        let db = HabitDb::open_memory().unwrap();
        db.insert_user(&User::new("u1", "UTC")).unwrap();

        let small = Habit::new("u1", "Small", Schedule::Daily, d(2025, 6, 1));
        db.insert_habit(&small).unwrap();
        db.update_habit_streak(&small.id, 2, 2, 2).unwrap();

        let big = Habit::new("u1", "Big", Schedule::Daily, d(2025, 6, 1));
        db.insert_habit(&big).unwrap();
        db.update_habit_streak(&big.id, 9, 9, 9).unwrap();

        let sweeper = sweeper(db);
        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.freezes_applied, 1);

        let db = sweeper.db();
        assert!(db.has_completion(&small.id, d(2025, 6, 9)).unwrap());
        assert!(db.has_completion(&big.id, d(2025, 6, 9)).unwrap());

        let user = db.get_user("u1").unwrap().unwrap();
        assert_eq!(user.freezes_used, 1);
        // The higher streak names the notification.
        assert_eq!(user.last_freeze_habit_id.as_deref(), Some(big.id.as_str()));
        assert_eq!(user.last_freeze_streak, Some(9));
    }

    #[test]
    fn one_bad_user_does_not_abort_the_sweep() {
        let db = HabitDb::open_memory().unwrap();
        // "u0" sorts before "u1" and carries a habit row with an
        // undecodable schedule, so its sweep fails first.
        db.insert_user(&User::new("u0", "UTC")).unwrap();
        db.execute_raw(
            "INSERT INTO habits (id, user_id, name, schedule_kind, custom_days, date_created)
             VALUES ('h-bad', 'u0', 'Bad', 'hourly', '[]', '2025-06-01')",
        )
        .unwrap();
        let habit = seed_missed_yesterday(&db);
        let sweeper = sweeper(db);

        let report = sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert_eq!(report.users, 2);
        assert_eq!(report.errors, 1);
        // The healthy user's freeze still went through.
        assert_eq!(report.freezes_applied, 1);
        assert!(sweeper.db().has_completion(&habit.id, d(2025, 6, 9)).unwrap());
    }

    #[test]
    fn notification_delivered_once_at_09_00() {
        let db = HabitDb::open_memory().unwrap();
        seed_missed_yesterday(&db);
        let sweeper_inner = sweeper(db);
        let sent = sweeper_inner.notifier.sent.clone();
        let sweeper = sweeper_inner;

        sweeper.tick_at(at(2025, 6, 10, 0, 5));
        assert!(sent.lock().unwrap().is_empty());

        let report = sweeper.tick_at(at(2025, 6, 10, 9, 0));
        assert_eq!(report.notifications_sent, 1);
        {
            let messages = sent.lock().unwrap();
            assert_eq!(messages.len(), 1);
            assert!(messages[0].contains("Read"));
            assert!(messages[0].contains("streak of 4"));
        }

        // Marker cleared: a second 09:00 tick delivers nothing.
        let report = sweeper.tick_at(at(2025, 6, 10, 9, 0));
        assert_eq!(report.notifications_sent, 0);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn next_minute_delay_is_bounded() {
        let now = at(2025, 6, 10, 0, 4) + chrono::Duration::seconds(30);
        let delay = delay_to_next_minute(now);
        assert_eq!(delay, std::time::Duration::from_secs(30));
        assert!(delay_to_next_minute(at(2025, 6, 10, 0, 4)) <= std::time::Duration::from_secs(60));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn scheduler_starts_and_stops() {
        let db = HabitDb::open_memory().unwrap();
        let sweeper = FreezeSweeper::new(db, SystemClock, LogNotifier);
        let scheduler = FreezeScheduler::start(sweeper);
        scheduler.stop().await;
    }
}
