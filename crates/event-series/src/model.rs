//! Typed records for series, events, and the requests that operate on them.
//!
//! All records serialize as camelCase JSON, matching the wire shapes consumed by
//! the surrounding application.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use recurrence_engine::RecurrenceRule;
use serde::{Deserialize, Serialize};

/// Explicit tenant/actor handle passed into every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantContext {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: None,
        }
    }

    pub fn with_actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventVisibility {
    #[default]
    Public,
    Private,
}

/// Business fields copied from the template onto each materialized occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFields {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub status: EventStatus,
    #[serde(default)]
    pub visibility: EventVisibility,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl EventFields {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Partial update of [`EventFields`]; `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<EventStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<EventVisibility>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attendees: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub categories: Option<Vec<String>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self == &EventPatch::default()
    }

    pub fn apply(&self, fields: &mut EventFields) {
        if let Some(name) = &self.name {
            fields.name = name.clone();
        }
        if let Some(description) = &self.description {
            fields.description = Some(description.clone());
        }
        if let Some(location) = &self.location {
            fields.location = Some(location.clone());
        }
        if let Some(status) = self.status {
            fields.status = status;
        }
        if let Some(visibility) = self.visibility {
            fields.visibility = visibility;
        }
        if let Some(max_attendees) = self.max_attendees {
            fields.max_attendees = Some(max_attendees);
        }
        if let Some(categories) = &self.categories {
            fields.categories = categories.clone();
        }
    }
}

/// What a newly materialized occurrence is built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTemplate {
    pub fields: EventFields,
    pub duration_minutes: i64,
}

impl EventTemplate {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes)
    }
}

/// A template snapshot that applies to occurrences at or after `effective_from`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateRevision {
    pub effective_from: DateTime<Utc>,
    pub template: EventTemplate,
}

/// An event record owned by the event collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: u64,
    pub slug: String,
    /// Back-reference to the owning series, if any.
    pub series_slug: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub time_zone: String,
    #[serde(flatten)]
    pub fields: EventFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn duration(&self) -> Duration {
        self.end_date - self.start_date
    }

    pub fn template(&self) -> EventTemplate {
        EventTemplate {
            fields: self.fields.clone(),
            duration_minutes: self.duration().num_minutes(),
        }
    }
}

/// Insert payload for a standalone event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub series_slug: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub time_zone: String,
    pub fields: EventFields,
}

/// A recurring-event definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Series {
    pub id: u64,
    /// Immutable once assigned.
    pub slug: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub recurrence_rule: RecurrenceRule,
    /// IANA timezone name.
    pub time_zone: String,
    /// Local wall-clock date-time of the first occurrence.
    pub anchor: NaiveDateTime,
    pub template_event_slug: Option<String>,
    pub template: EventTemplate,
    /// Sorted by `effective_from`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub template_revisions: Vec<TemplateRevision>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every write; a stale copy is rejected with `Conflict`.
    #[serde(default)]
    pub version: u64,
}

impl Series {
    /// The template that applies to an occurrence at `instant`.
    pub fn template_for(&self, instant: DateTime<Utc>) -> &EventTemplate {
        self.template_revisions
            .iter()
            .rev()
            .find(|rev| rev.effective_from <= instant)
            .map_or(&self.template, |rev| &rev.template)
    }

    /// Apply `patch` to the template of every occurrence at or after `from`, leaving
    /// the template for earlier instants as it was.
    pub fn patch_template_from(&mut self, from: DateTime<Utc>, patch: &EventPatch) {
        let mut patched = self.template_for(from).clone();
        patch.apply(&mut patched.fields);

        for rev in self
            .template_revisions
            .iter_mut()
            .filter(|rev| rev.effective_from > from)
        {
            patch.apply(&mut rev.template.fields);
        }

        match self
            .template_revisions
            .iter_mut()
            .find(|rev| rev.effective_from == from)
        {
            Some(rev) => rev.template = patched,
            None => {
                self.template_revisions.push(TemplateRevision {
                    effective_from: from,
                    template: patched,
                });
                self.template_revisions.sort_by_key(|rev| rev.effective_from);
            }
        }
    }
}

/// Insert payload for a series; the store assigns id, slug, and timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeries {
    pub name: String,
    pub description: Option<String>,
    pub recurrence_rule: RecurrenceRule,
    pub time_zone: String,
    pub anchor: NaiveDateTime,
    pub template: EventTemplate,
    pub created_by: Option<String>,
}

/// One entry of an occurrence listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    pub date: DateTime<Utc>,
    pub materialized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<Event>,
}

impl Occurrence {
    pub fn generated(date: DateTime<Utc>) -> Self {
        Self {
            date,
            materialized: false,
            event: None,
        }
    }

    pub fn materialized(event: Event) -> Self {
        Self {
            date: event.start_date,
            materialized: true,
            event: Some(event),
        }
    }
}

/// Inline template supplied when a series is created without an existing event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineTemplate {
    /// Local wall-clock start in the series timezone.
    pub start: NaiveDateTime,
    pub duration_minutes: i64,
    #[serde(flatten)]
    pub fields: EventFields,
}

/// Series creation request. Exactly one of `template_event_slug` and `template`
/// must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSeries {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub recurrence_rule: RecurrenceRule,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub template_event_slug: Option<String>,
    #[serde(default)]
    pub template: Option<InlineTemplate>,
}

/// Optional overrides when promoting an existing event.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDetails {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the template event's timezone.
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSeries {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub recurrence_rule: Option<RecurrenceRule>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OccurrenceQuery {
    #[serde(default)]
    pub count: Option<usize>,
    #[serde(default)]
    pub include_past: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    pub count: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default)]
    pub delete_events: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteSummary {
    pub series_slug: String,
    pub events_deleted: usize,
    pub events_detached: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use recurrence_engine::Frequency;

    fn series_with_template(name: &str) -> Series {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        Series {
            id: 1,
            slug: "standup".to_string(),
            name: name.to_string(),
            description: None,
            recurrence_rule: RecurrenceRule::new(Frequency::Daily, 1),
            time_zone: "UTC".to_string(),
            anchor: now.naive_utc(),
            template_event_slug: None,
            template: EventTemplate {
                fields: EventFields::named(name),
                duration_minutes: 30,
            },
            template_revisions: Vec::new(),
            created_by: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    fn rename(name: &str) -> EventPatch {
        EventPatch {
            name: Some(name.to_string()),
            ..EventPatch::default()
        }
    }

    #[test]
    fn template_revisions_are_effective_dated() {
        let mut series = series_with_template("v1");
        let march = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        series.patch_template_from(june, &rename("v3"));
        series.patch_template_from(march, &rename("v2"));

        let name_at = |s: &Series, m: u32| {
            s.template_for(Utc.with_ymd_and_hms(2026, m, 15, 0, 0, 0).unwrap())
                .fields
                .name
                .clone()
        };
        assert_eq!(name_at(&series, 2), "v1");
        assert_eq!(name_at(&series, 4), "v2");
        // The later patch covers June onwards too.
        assert_eq!(name_at(&series, 7), "v2");
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut fields = EventFields {
            name: "Standup".to_string(),
            location: Some("Room 1".to_string()),
            ..EventFields::default()
        };
        let patch = EventPatch {
            status: Some(EventStatus::Published),
            ..EventPatch::default()
        };
        patch.apply(&mut fields);
        assert_eq!(fields.name, "Standup");
        assert_eq!(fields.location.as_deref(), Some("Room 1"));
        assert_eq!(fields.status, EventStatus::Published);
        assert!(EventPatch::default().is_empty());
    }
}
