//! Local wall-clock to instant resolution across DST transitions.
//!
//! Every generated occurrence is a local date-time in the series' timezone. Turning
//! it into an instant uses the offset valid at that local date, with an explicit
//! policy for the two cases where the local time does not map to exactly one instant:
//!
//! - **Gap** (spring forward, e.g. 02:30 on 2023-03-12 in `America/New_York`): the
//!   wall clock is pushed forward by the length of the gap, so the instant carries the
//!   post-transition offset (02:30 becomes 03:30 EDT, `07:30Z`).
//! - **Ambiguous** (fall back, e.g. 01:30 on 2023-11-05 in `America/New_York`): the
//!   earlier of the two instants is used (01:30 EDT, `05:30Z`).

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{RecurrenceError, Result};

/// How a local date-time mapped onto the timezone's offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DstResolution {
    /// Exactly one instant has this wall-clock time.
    Exact,
    /// The wall-clock time was skipped by a forward transition.
    Gap,
    /// The wall-clock time occurs twice because of a backward transition.
    Ambiguous,
}

/// Parse an IANA timezone name.
///
/// # Errors
/// Returns `RecurrenceError::InvalidTimezone` if the name is not in the tz database.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|_| RecurrenceError::InvalidTimezone(name.to_string()))
}

/// Classify a local date-time without resolving it.
pub fn classify_local(tz: &Tz, local: NaiveDateTime) -> DstResolution {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(_) => DstResolution::Exact,
        LocalResult::Ambiguous(_, _) => DstResolution::Ambiguous,
        LocalResult::None => DstResolution::Gap,
    }
}

/// Resolve a local date-time in `tz` to an instant using the offset valid at that
/// local date. See the module docs for the gap and ambiguity policy.
pub fn resolve_local(tz: &Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earlier, _) => earlier.with_timezone(&Utc),
        LocalResult::None => {
            // Interpreting the skipped time with the pre-transition offset lands past
            // the transition, i.e. wall clock + gap length.
            let before = tz
                .offset_from_utc_datetime(&(local - Duration::days(1)))
                .fix();
            let utc = local - Duration::seconds(i64::from(before.local_minus_utc()));
            Utc.from_utc_datetime(&utc)
        }
    }
}

/// The wall-clock date-time of `instant` in `tz`.
pub fn to_local(tz: &Tz, instant: DateTime<Utc>) -> NaiveDateTime {
    instant.with_timezone(tz).naive_local()
}
