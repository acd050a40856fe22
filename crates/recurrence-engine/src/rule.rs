//! Recurrence rule model and its RFC 5545 text form.
//!
//! The wire/storage shape is the JSON object
//! `{frequency, interval, count?, until?, byweekday?}`. Rules can also be read from
//! RRULE text (`FREQ=WEEKLY;BYDAY=MO,WE`) via the `rrule` crate's parser, restricted
//! to the subset this engine expands.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc, Weekday};
use rrule::{NWeekday, RRule, Unvalidated};
use serde::{Deserialize, Serialize};

use crate::error::{RecurrenceError, Result};

/// How far the local calendar advances per recurrence step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-letter weekday code as used by `BYDAY` (`MO` .. `SU`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DayCode {
    #[serde(rename = "MO")]
    Mo,
    #[serde(rename = "TU")]
    Tu,
    #[serde(rename = "WE")]
    We,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "SA")]
    Sa,
    #[serde(rename = "SU")]
    Su,
}

impl DayCode {
    pub fn to_weekday(self) -> Weekday {
        match self {
            DayCode::Mo => Weekday::Mon,
            DayCode::Tu => Weekday::Tue,
            DayCode::We => Weekday::Wed,
            DayCode::Th => Weekday::Thu,
            DayCode::Fr => Weekday::Fri,
            DayCode::Sa => Weekday::Sat,
            DayCode::Su => Weekday::Sun,
        }
    }

    pub fn from_weekday(day: Weekday) -> Self {
        match day {
            Weekday::Mon => DayCode::Mo,
            Weekday::Tue => DayCode::Tu,
            Weekday::Wed => DayCode::We,
            Weekday::Thu => DayCode::Th,
            Weekday::Fri => DayCode::Fr,
            Weekday::Sat => DayCode::Sa,
            Weekday::Sun => DayCode::Su,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayCode::Mo => "MO",
            DayCode::Tu => "TU",
            DayCode::We => "WE",
            DayCode::Th => "TH",
            DayCode::Fr => "FR",
            DayCode::Sa => "SA",
            DayCode::Su => "SU",
        }
    }
}

impl FromStr for DayCode {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MO" => Ok(DayCode::Mo),
            "TU" => Ok(DayCode::Tu),
            "WE" => Ok(DayCode::We),
            "TH" => Ok(DayCode::Th),
            "FR" => Ok(DayCode::Fr),
            "SA" => Ok(DayCode::Sa),
            "SU" => Ok(DayCode::Su),
            other => Err(RecurrenceError::InvalidRule(format!(
                "unknown weekday code '{}'",
                other
            ))),
        }
    }
}

fn default_interval() -> u32 {
    1
}

/// A recurrence rule in its wire/storage form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub byweekday: Vec<DayCode>,
}

impl RecurrenceRule {
    /// An open-ended rule: every `interval` units of `frequency`.
    pub fn new(frequency: Frequency, interval: u32) -> Self {
        Self {
            frequency,
            interval,
            count: None,
            until: None,
            byweekday: Vec::new(),
        }
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_byweekday(mut self, days: impl IntoIterator<Item = DayCode>) -> Self {
        self.byweekday = days.into_iter().collect();
        self
    }

    /// True when neither `count` nor `until` bounds the rule.
    pub fn is_open_ended(&self) -> bool {
        self.count.is_none() && self.until.is_none()
    }

    /// Check the structural constraints that serde cannot express.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if `interval` or `count` is zero, if
    /// `interval` exceeds 65535, or if both `count` and `until` are set (RFC 5545
    /// allows at most one of them).
    pub fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(RecurrenceError::InvalidRule(
                "interval must be a positive integer".to_string(),
            ));
        }
        if self.interval > u32::from(u16::MAX) {
            return Err(RecurrenceError::InvalidRule(format!(
                "interval must not exceed {}",
                u16::MAX
            )));
        }
        if self.count == Some(0) {
            return Err(RecurrenceError::InvalidRule(
                "count must be a positive integer".to_string(),
            ));
        }
        if self.count.is_some() && self.until.is_some() {
            return Err(RecurrenceError::InvalidRule(
                "count and until are mutually exclusive".to_string(),
            ));
        }
        Ok(())
    }

    /// Sorted, deduplicated weekday filter as chrono weekdays.
    pub(crate) fn weekday_filter(&self) -> Vec<Weekday> {
        let mut codes = self.byweekday.clone();
        codes.sort();
        codes.dedup();
        codes.into_iter().map(DayCode::to_weekday).collect()
    }

    /// Parse RFC 5545 RRULE text (with or without the `RRULE:` prefix).
    ///
    /// Only `FREQ`, `INTERVAL`, `COUNT`, `UNTIL` and plain `BYDAY` codes are accepted.
    /// Any other `BY*` part, or a `WKST` other than `MO`, is rejected rather than
    /// silently ignored.
    ///
    /// # Errors
    /// Returns `RecurrenceError::InvalidRule` if the text is empty, unparseable, uses a
    /// sub-daily frequency, or carries parts this engine does not expand.
    pub fn from_rrule_str(text: &str) -> Result<Self> {
        let body = text.trim();
        let body = body.strip_prefix("RRULE:").unwrap_or(body);
        if body.is_empty() {
            return Err(RecurrenceError::InvalidRule("empty RRULE string".to_string()));
        }

        let parsed: RRule<Unvalidated> = body
            .parse()
            .map_err(|e| RecurrenceError::InvalidRule(format!("{}", e)))?;

        let frequency = match parsed.get_freq() {
            rrule::Frequency::Daily => Frequency::Daily,
            rrule::Frequency::Weekly => Frequency::Weekly,
            rrule::Frequency::Monthly => Frequency::Monthly,
            rrule::Frequency::Yearly => Frequency::Yearly,
            other => {
                return Err(RecurrenceError::InvalidRule(format!(
                    "unsupported frequency {:?}",
                    other
                )))
            }
        };

        let unsupported = [
            ("BYSETPOS", parsed.get_by_set_pos().is_empty()),
            ("BYMONTHDAY", parsed.get_by_month_day().is_empty()),
            ("BYMONTH", parsed.get_by_month().is_empty()),
            ("BYYEARDAY", parsed.get_by_year_day().is_empty()),
            ("BYWEEKNO", parsed.get_by_week_no().is_empty()),
            ("BYHOUR", parsed.get_by_hour().is_empty()),
            ("BYMINUTE", parsed.get_by_minute().is_empty()),
            ("BYSECOND", parsed.get_by_second().is_empty()),
        ];
        if let Some((part, _)) = unsupported.iter().find(|(_, empty)| !empty) {
            return Err(RecurrenceError::InvalidRule(format!(
                "{} is not supported; only FREQ, INTERVAL, COUNT, UNTIL and BYDAY are",
                part
            )));
        }
        // Weeks always start on Monday here.
        if parsed.get_week_start() != Weekday::Mon {
            return Err(RecurrenceError::InvalidRule(format!(
                "WKST={} is not supported; weeks start on MO",
                DayCode::from_weekday(parsed.get_week_start()).as_str()
            )));
        }

        let mut byweekday = Vec::new();
        for day in parsed.get_by_weekday() {
            match day {
                NWeekday::Every(weekday) => byweekday.push(DayCode::from_weekday(*weekday)),
                NWeekday::Nth(n, weekday) => {
                    return Err(RecurrenceError::InvalidRule(format!(
                        "numbered BYDAY ({}{:?}) is not supported",
                        n, weekday
                    )))
                }
            }
        }

        let rule = RecurrenceRule {
            frequency,
            interval: u32::from(parsed.get_interval()),
            count: parsed.get_count(),
            until: parsed.get_until().map(|until| until.with_timezone(&Utc)),
            byweekday,
        };
        rule.validate()?;
        Ok(rule)
    }

    /// Render the rule as RFC 5545 RRULE text (without the `RRULE:` prefix).
    pub fn to_rrule_string(&self) -> String {
        let mut parts = vec![format!("FREQ={}", self.frequency)];
        if self.interval != 1 {
            parts.push(format!("INTERVAL={}", self.interval));
        }
        if let Some(count) = self.count {
            parts.push(format!("COUNT={}", count));
        }
        if let Some(until) = self.until {
            parts.push(format!("UNTIL={}", until.format("%Y%m%dT%H%M%SZ")));
        }
        if !self.byweekday.is_empty() {
            let days: Vec<&str> = self.byweekday.iter().map(|d| d.as_str()).collect();
            parts.push(format!("BYDAY={}", days.join(",")));
        }
        parts.join(";")
    }
}

impl FromStr for RecurrenceRule {
    type Err = RecurrenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_rrule_str(s)
    }
}

impl fmt::Display for RecurrenceRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rrule_string())
    }
}
