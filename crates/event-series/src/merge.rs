//! Two-pointer merge of generated instants with materialized events.
//!
//! Both inputs are ordered by instant. Matching is by instant equality at
//! whole-second precision, never by slug: events attached out-of-band still land on
//! the generated occurrence they coincide with.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::model::{Event, Occurrence};

fn instant_key(instant: DateTime<Utc>) -> i64 {
    instant.timestamp()
}

/// Merge `generated` (strictly increasing) with `materialized` into one ordered,
/// deduplicated occurrence list. Materialized events that match no generated instant
/// are kept as occurrences of their own.
pub fn merge_occurrences(generated: &[DateTime<Utc>], mut materialized: Vec<Event>) -> Vec<Occurrence> {
    materialized.sort_by_key(|e| e.start_date);

    let mut merged = Vec::with_capacity(generated.len() + materialized.len());
    let mut instants = generated.iter().copied().peekable();
    let mut events = materialized.into_iter().peekable();

    loop {
        let next_instant = instants.peek().copied();
        let next_event = events.peek().map(|e| e.start_date);

        match (next_instant, next_event) {
            (None, None) => break,
            (Some(instant), None) => {
                instants.next();
                merged.push(Occurrence::generated(instant));
            }
            (None, Some(_)) => {
                if let Some(event) = events.next() {
                    merged.push(Occurrence::materialized(event));
                }
            }
            (Some(instant), Some(start)) => match instant_key(instant).cmp(&instant_key(start)) {
                Ordering::Less => {
                    instants.next();
                    merged.push(Occurrence::generated(instant));
                }
                Ordering::Greater => {
                    if let Some(event) = events.next() {
                        merged.push(Occurrence::materialized(event));
                    }
                }
                Ordering::Equal => {
                    instants.next();
                    if let Some(event) = events.next() {
                        merged.push(Occurrence::materialized(event));
                    }
                }
            },
        }
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EventFields;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
    }

    fn event(slug: &str, start: DateTime<Utc>) -> Event {
        Event {
            id: 1,
            slug: slug.to_string(),
            series_slug: Some("series".to_string()),
            start_date: start,
            end_date: start + Duration::hours(1),
            time_zone: "UTC".to_string(),
            fields: EventFields::named(slug),
            updated_by: None,
            created_at: start,
            updated_at: start,
        }
    }

    #[test]
    fn matching_instant_becomes_single_materialized_entry() {
        let generated = vec![at(1, 10), at(2, 10), at(3, 10)];
        let merged = merge_occurrences(&generated, vec![event("b", at(2, 10))]);

        assert_eq!(merged.len(), 3);
        assert!(!merged[0].materialized);
        assert!(merged[1].materialized);
        assert_eq!(merged[1].event.as_ref().map(|e| e.slug.as_str()), Some("b"));
        assert!(!merged[2].materialized);
    }

    #[test]
    fn sub_second_difference_still_matches() {
        let generated = vec![at(1, 10)];
        let merged = merge_occurrences(
            &generated,
            vec![event("a", at(1, 10) + Duration::milliseconds(250))],
        );
        assert_eq!(merged.len(), 1);
        assert!(merged[0].materialized);
    }

    #[test]
    fn unmatched_events_are_interleaved_in_order() {
        let generated = vec![at(1, 10), at(3, 10)];
        let merged = merge_occurrences(
            &generated,
            vec![event("late", at(4, 9)), event("extra", at(2, 15))],
        );

        let dates: Vec<_> = merged.iter().map(|o| o.date).collect();
        assert_eq!(dates, vec![at(1, 10), at(2, 15), at(3, 10), at(4, 9)]);
        assert_eq!(merged.iter().filter(|o| o.materialized).count(), 2);
    }
}
