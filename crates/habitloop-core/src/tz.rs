//! Timezone boundary resolution.
//!
//! Every "today" / "yesterday" / due-date computation in the engine runs in
//! the user's stored IANA timezone. Calendar-day arithmetic is done on
//! `NaiveDate` values, never on instants, so DST transitions and offset
//! changes cannot drift a streak; instants only appear at the storage
//! boundary via [`day_bounds`].

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone identifier, falling back to UTC.
///
/// An unrecognized identifier is a data problem on the user row, not a
/// reason to fail a request or a sweep.
pub fn resolve(name: &str) -> Tz {
    match name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            tracing::warn!(timezone = name, "unrecognized timezone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// The user's current local calendar date for a given instant.
pub fn local_today(tz: Tz, now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&tz).date_naive()
}

/// UTC instants bounding a local calendar day: `[start, end)`.
///
/// A DST gap at local midnight resolves to the earliest valid instant of
/// that day, so a 23-hour day still gets well-formed bounds. The end bound
/// is the start of the following local day.
pub fn day_bounds(date: NaiveDate, tz: Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    (local_day_start(date, tz), local_day_start(next_day(date), tz))
}

fn local_day_start(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    let local = tz.from_local_datetime(&midnight).earliest().unwrap_or_else(|| {
        // Midnight fell in a DST gap; the first valid instant of the day
        // is at most one hour later.
        tz.from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .unwrap_or_else(|| tz.from_utc_datetime(&midnight))
    });
    local.with_timezone(&Utc)
}

/// Weekday ordinal with a fixed convention: 0=Mon .. 6=Sun.
pub fn weekday_ordinal(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// The calendar day before `date`.
///
/// `NaiveDate::MIN` has no predecessor; clamp rather than panic since the
/// walk-backward streak logic always stops at a habit's creation date long
/// before that.
pub fn prev_day(date: NaiveDate) -> NaiveDate {
    date.pred_opt().unwrap_or(date)
}

/// The calendar day after `date`.
pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

/// First day of the month containing `date`.
pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}
