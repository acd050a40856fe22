//! Recurrence expansion -- turns a rule anchored at a local date-time into instants.
//!
//! Calendar stepping is delegated to [`rrule`]: the anchor's wall-clock date-time is
//! handed to an [`RRuleSet`] as a floating (UTC) DTSTART, so the set yields local
//! dates at the anchor's time of day with no offsets involved. Each of those local
//! date-times is then converted to an instant with the offset valid on that date
//! (see [`crate::dst`]). Adding a fixed duration to the previous instant would drift
//! by an hour across every DST change.
//!
//! Open-ended rules are bounded by [`ExpansionLimits`]: a maximum number of returned
//! instants and a maximum local-calendar span from the anchor.

use chrono::{DateTime, Months, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use rrule::{NWeekday, RRule, RRuleSet, RRuleSetIter};
use serde::{Deserialize, Serialize};

use crate::dst::resolve_local;
use crate::error::{RecurrenceError, Result};
use crate::rule::{Frequency, RecurrenceRule};

pub const DEFAULT_MAX_OCCURRENCES: usize = 1000;
pub const DEFAULT_MAX_SPAN_YEARS: u32 = 100;

/// Safety horizon applied to every expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionLimits {
    /// Maximum number of instants a single expansion returns.
    pub max_occurrences: usize,
    /// Maximum distance, in years of local calendar, from the anchor date.
    pub max_span_years: u32,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            max_span_years: DEFAULT_MAX_SPAN_YEARS,
        }
    }
}

/// Caller-side bounds layered on top of the rule.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpansionOptions {
    /// Maximum number of instants to return, counted after exclusions.
    pub count: Option<usize>,
    /// Inclusive upper bound, intersected with the rule's own `until`.
    pub until: Option<DateTime<Utc>>,
    /// Instants removed from the result (EXDATE-style).
    pub exclude: Vec<DateTime<Utc>>,
    /// Instants before this are skipped without consuming `count`.
    pub after: Option<DateTime<Utc>>,
}

/// Result of a bounded expansion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Expansion {
    pub instants: Vec<DateTime<Utc>>,
    /// True when the safety horizon cut the sequence short.
    pub truncated: bool,
}

/// Lazy iterator over the instants of a rule, in strictly increasing order.
///
/// The iterator is `Clone`: cloning it captures the current position, and building a
/// new one from the same inputs restarts the identical sequence.
#[derive(Debug, Clone)]
pub struct OccurrenceIter {
    tz: Tz,
    wall_clock: RRuleSetIter,
    until: Option<DateTime<Utc>>,
    horizon: NaiveDate,
    finished: bool,
    hit_horizon: bool,
}

impl OccurrenceIter {
    /// Build an iterator for `rule` anchored at `anchor` (local wall-clock in `tz`).
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if the rule fails validation.
    pub fn new(
        rule: &RecurrenceRule,
        tz: Tz,
        anchor: NaiveDateTime,
        limits: &ExpansionLimits,
    ) -> Result<Self> {
        rule.validate()?;

        let horizon = anchor
            .date()
            .checked_add_months(Months::new(limits.max_span_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MAX);
        let set = wall_clock_set(rule, anchor)?;

        Ok(Self {
            tz,
            wall_clock: (&set).into_iter(),
            until: rule.until,
            horizon,
            finished: false,
            hit_horizon: false,
        })
    }

    /// True once the span limit stopped iteration before the rule ran out.
    pub fn reached_horizon(&self) -> bool {
        self.hit_horizon
    }
}

/// The rule as an `RRuleSet` over floating wall-clock time.
///
/// `until` is deliberately left out: it is an instant, so it is compared after each
/// local date-time has been resolved in the series timezone.
fn wall_clock_set(rule: &RecurrenceRule, anchor: NaiveDateTime) -> Result<RRuleSet> {
    let frequency = match rule.frequency {
        Frequency::Daily => rrule::Frequency::Daily,
        Frequency::Weekly => rrule::Frequency::Weekly,
        Frequency::Monthly => rrule::Frequency::Monthly,
        Frequency::Yearly => rrule::Frequency::Yearly,
    };
    let interval = u16::try_from(rule.interval).map_err(|_| {
        RecurrenceError::InvalidRule(format!("interval {} is too large", rule.interval))
    })?;

    let mut builder = RRule::new(frequency)
        .interval(interval)
        .week_start(chrono::Weekday::Mon);
    let weekdays = rule.weekday_filter();
    if !weekdays.is_empty() {
        builder = builder.by_weekday(weekdays.into_iter().map(NWeekday::Every).collect());
    }
    if let Some(count) = rule.count {
        builder = builder.count(count);
    }

    let dt_start = rrule::Tz::UTC.from_utc_datetime(&anchor);
    builder
        .build(dt_start)
        .map_err(|e| RecurrenceError::InvalidRule(e.to_string()))
}

impl Iterator for OccurrenceIter {
    type Item = DateTime<Utc>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let Some(local) = self.wall_clock.next().map(|dt| dt.naive_utc()) else {
            self.finished = true;
            return None;
        };
        if local.date() > self.horizon {
            self.finished = true;
            self.hit_horizon = true;
            return None;
        }

        let instant = resolve_local(&self.tz, local);
        if self.until.is_some_and(|until| instant > until) {
            self.finished = true;
            return None;
        }
        Some(instant)
    }
}

/// Expand a recurrence rule into an ordered list of instants.
///
/// # Arguments
/// - `rule` -- the recurrence rule (validated here)
/// - `tz` -- the series timezone
/// - `anchor` -- the first occurrence as a local wall-clock date-time in `tz`
/// - `options` -- caller-side count/until/exclusions/start bound
/// - `limits` -- the safety horizon
///
/// The result is finite: it stops at the rule's `count`/`until`, the caller's
/// `count`/`until`, or the safety horizon, whichever comes first. When the horizon is
/// what stopped it, `truncated` is set.
///
/// # Errors
/// Returns `RecurrenceError::InvalidRule` if the rule fails validation.
pub fn generate_occurrences(
    rule: &RecurrenceRule,
    tz: Tz,
    anchor: NaiveDateTime,
    options: &ExpansionOptions,
    limits: &ExpansionLimits,
) -> Result<Expansion> {
    let mut iter = OccurrenceIter::new(rule, tz, anchor, limits)?;

    let cap = limits.max_occurrences;
    let limit = options.count.map_or(cap, |c| c.min(cap));
    let mut instants = Vec::new();
    let mut more_beyond_cap = false;

    {
        let mut accepted = iter
            .by_ref()
            .filter(|i| options.after.is_none_or(|after| *i >= after))
            .filter(|i| !options.exclude.contains(i))
            .take_while(|i| options.until.is_none_or(|until| *i <= until));

        while instants.len() < limit {
            match accepted.next() {
                Some(instant) => instants.push(instant),
                None => break,
            }
        }

        // The caller asked for more than the cap allows: report whether anything was
        // actually left behind.
        if instants.len() == cap && options.count.is_none_or(|c| c > cap) {
            more_beyond_cap = accepted.next().is_some();
        }
    }

    Ok(Expansion {
        instants,
        truncated: more_beyond_cap || iter.reached_horizon(),
    })
}

/// Whether `instant` is one of the rule's occurrences.
///
/// # Errors
/// Returns `RecurrenceError::InvalidRule` if the rule fails validation.
pub fn is_occurrence(
    rule: &RecurrenceRule,
    tz: Tz,
    anchor: NaiveDateTime,
    instant: DateTime<Utc>,
    limits: &ExpansionLimits,
) -> Result<bool> {
    let iter = OccurrenceIter::new(rule, tz, anchor, limits)?;
    Ok(iter.take_while(|i| *i <= instant).any(|i| i == instant))
}

/// The instant on local `date` at the anchor's wall-clock time.
pub fn instant_on_date(tz: Tz, anchor: NaiveDateTime, date: NaiveDate) -> DateTime<Utc> {
    resolve_local(&tz, date.and_time(anchor.time()))
}

/// Parse a local date-time such as `2026-02-17T14:00:00` (seconds optional).
///
/// # Errors
/// Returns `RecurrenceError::InvalidDateTime` if the string matches neither format.
pub fn parse_local(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|_| RecurrenceError::InvalidDateTime(value.to_string()))
}
