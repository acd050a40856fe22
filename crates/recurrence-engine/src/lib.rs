//! # recurrence-engine
//!
//! Deterministic, DST-safe expansion of recurring event rules.
//!
//! A rule (`DAILY|WEEKLY|MONTHLY|YEARLY`, interval, count/until, weekday filter) is
//! anchored at a local date-time in an IANA timezone. Expansion steps through the
//! local calendar and converts each local date-time to an instant with the offset in
//! force on that date, so a 10:00 series stays at 10:00 local time on both sides of a
//! DST transition.
//!
//! ## Modules
//!
//! - [`rule`]: `RecurrenceRule` wire model and RRULE text parsing
//! - [`expander`]: rule → bounded, ordered list of instants
//! - [`dst`]: local wall-clock → instant resolution (gap/ambiguity policy)
//! - [`error`]: Error types

pub mod dst;
pub mod error;
pub mod expander;
pub mod rule;

pub use chrono_tz::Tz;
pub use dst::{parse_timezone, resolve_local, to_local, DstResolution};
pub use error::RecurrenceError;
pub use expander::{
    generate_occurrences, instant_on_date, is_occurrence, parse_local, Expansion,
    ExpansionLimits, ExpansionOptions, OccurrenceIter,
};
pub use rule::{DayCode, Frequency, RecurrenceRule};
