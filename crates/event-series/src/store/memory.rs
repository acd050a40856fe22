//! In-memory storage backend.
//!
//! All tenants live behind one mutex. Promote-and-link, future-dated patches, and
//! series deletion each run under a single lock, and every write that links an
//! event to a series checks the series row and the (series slug, start date)
//! uniqueness in the same critical section as the insert.
//! The whole state can be written to and read back from a JSON snapshot.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    same_instant, EventManagement, EventQuery, SeriesRepository, StoreError, StoreResult,
};
use crate::model::{Event, EventPatch, EventTemplate, NewEvent, NewSeries, Series, TenantContext};

const SLUG_BASE_MAX: usize = 48;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TenantTables {
    series: BTreeMap<String, Series>,
    events: BTreeMap<String, Event>,
}

impl TenantTables {
    /// The event holding the (series, start) slot, if any.
    fn occupant(&self, series_slug: &str, start: DateTime<Utc>) -> Option<&Event> {
        self.events.values().find(|e| {
            e.series_slug.as_deref() == Some(series_slug) && same_instant(e.start_date, start)
        })
    }

    fn insert_event(&mut self, id: u64, new: NewEvent, now: DateTime<Utc>) -> Event {
        let slug = make_slug(&new.fields.name);
        let event = Event {
            id,
            slug: slug.clone(),
            series_slug: new.series_slug,
            start_date: new.start_date,
            end_date: new.end_date,
            time_zone: new.time_zone,
            fields: new.fields,
            updated_by: None,
            created_at: now,
            updated_at: now,
        };
        self.events.insert(slug, event.clone());
        event
    }

    fn require_series(&self, slug: &str) -> StoreResult<()> {
        if self.series.contains_key(slug) {
            Ok(())
        } else {
            Err(StoreError::NotFound(format!("series {}", slug)))
        }
    }

    fn event_mut(&mut self, slug: &str) -> StoreResult<&mut Event> {
        self.events
            .get_mut(slug)
            .ok_or_else(|| StoreError::NotFound(format!("event {}", slug)))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct State {
    next_id: u64,
    tenants: BTreeMap<String, TenantTables>,
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Mutex-guarded store implementing every storage trait.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a snapshot written by [`InMemoryStore::save`]; a missing file yields an
    /// empty store.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Backend(format!("read {}: {}", path.display(), e)))?;
        let state: State = serde_json::from_str(&raw)
            .map_err(|e| StoreError::Backend(format!("parse {}: {}", path.display(), e)))?;
        Ok(Self {
            state: Mutex::new(state),
        })
    }

    pub fn save(&self, path: &Path) -> StoreResult<()> {
        let raw = {
            let state = self.state.lock();
            serde_json::to_string_pretty(&*state)
                .map_err(|e| StoreError::Backend(format!("serialize snapshot: {}", e)))?
        };
        std::fs::write(path, raw)
            .map_err(|e| StoreError::Backend(format!("write {}: {}", path.display(), e)))
    }

    /// Every event of the tenant, ordered by start date.
    pub fn events(&self, ctx: &TenantContext) -> Vec<Event> {
        let mut events: Vec<Event> = self.read(ctx, |t| t.events.values().cloned().collect());
        events.sort_by_key(|e| e.start_date);
        events
    }

    pub fn series(&self, ctx: &TenantContext) -> Vec<Series> {
        self.read(ctx, |t| t.series.values().cloned().collect())
    }

    fn read<R>(&self, ctx: &TenantContext, f: impl FnOnce(&TenantTables) -> R) -> R {
        let state = self.state.lock();
        match state.tenants.get(&ctx.tenant_id) {
            Some(tables) => f(tables),
            None => f(&TenantTables::default()),
        }
    }

    fn write<R>(&self, ctx: &TenantContext, f: impl FnOnce(&mut TenantTables, u64) -> R) -> R {
        let mut state = self.state.lock();
        let id = state.allocate_id();
        let tables = state.tenants.entry(ctx.tenant_id.clone()).or_default();
        f(tables, id)
    }
}

/// `"Weekly Sync!"` → `"weekly-sync-1a2b3c4d"`.
fn make_slug(name: &str) -> String {
    let mut base = String::new();
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            base.push(c.to_ascii_lowercase());
        } else if !base.is_empty() && !base.ends_with('-') {
            base.push('-');
        }
    }
    base.truncate(SLUG_BASE_MAX);
    let base = base.trim_end_matches('-');
    let base = if base.is_empty() { "event" } else { base };
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", base, &suffix[..8])
}

impl SeriesRepository for InMemoryStore {
    fn find_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Series>> {
        Ok(self.read(ctx, |t| t.series.get(slug).cloned()))
    }

    fn insert_series_linked(
        &self,
        ctx: &TenantContext,
        new: NewSeries,
        template_event_slug: &str,
    ) -> StoreResult<(Series, Event)> {
        self.write(ctx, |t, id| {
            let slug = make_slug(&new.name);
            if t.series.contains_key(&slug) {
                return Err(StoreError::UniqueViolation(format!("series slug {}", slug)));
            }

            let event = t.event_mut(template_event_slug)?;
            if let Some(existing) = &event.series_slug {
                return Err(StoreError::Conflict(format!(
                    "event {} already belongs to series {}",
                    template_event_slug, existing
                )));
            }

            let now = Utc::now();
            event.series_slug = Some(slug.clone());
            event.updated_at = now;
            let event = event.clone();

            let series = Series {
                id,
                slug: slug.clone(),
                name: new.name,
                description: new.description,
                recurrence_rule: new.recurrence_rule,
                time_zone: new.time_zone,
                anchor: new.anchor,
                template_event_slug: Some(template_event_slug.to_string()),
                template: new.template,
                template_revisions: Vec::new(),
                created_by: new.created_by,
                created_at: now,
                updated_at: now,
                version: 0,
            };
            t.series.insert(slug, series.clone());
            Ok((series, event))
        })
    }

    fn update_series(&self, ctx: &TenantContext, series: &Series) -> StoreResult<Series> {
        self.write(ctx, |t, _| {
            let stored = t
                .series
                .get_mut(&series.slug)
                .ok_or_else(|| StoreError::NotFound(format!("series {}", series.slug)))?;
            if stored.version != series.version {
                return Err(StoreError::Conflict(format!(
                    "series {} changed concurrently (version {} != {})",
                    series.slug, series.version, stored.version
                )));
            }
            let created_at = stored.created_at;
            let id = stored.id;
            *stored = series.clone();
            stored.id = id;
            stored.created_at = created_at;
            stored.updated_at = Utc::now();
            stored.version += 1;
            Ok(stored.clone())
        })
    }

    fn apply_future_patch(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        from: DateTime<Utc>,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<usize> {
        self.write(ctx, |t, _| {
            let series = t
                .series
                .get_mut(series_slug)
                .ok_or_else(|| StoreError::NotFound(format!("series {}", series_slug)))?;
            let now = Utc::now();
            series.patch_template_from(from, patch);
            series.updated_at = now;
            series.version += 1;

            let mut count = 0;
            for event in t.events.values_mut().filter(|e| {
                e.series_slug.as_deref() == Some(series_slug) && e.start_date >= from
            }) {
                patch.apply(&mut event.fields);
                event.updated_by = actor_id.map(str::to_string);
                event.updated_at = now;
                count += 1;
            }
            Ok(count)
        })
    }

    fn delete_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        delete_events: bool,
    ) -> StoreResult<usize> {
        self.write(ctx, |t, _| {
            if t.series.remove(slug).is_none() {
                return Err(StoreError::NotFound(format!("series {}", slug)));
            }
            let linked: Vec<String> = t
                .events
                .values()
                .filter(|e| e.series_slug.as_deref() == Some(slug))
                .map(|e| e.slug.clone())
                .collect();
            let now = Utc::now();
            for event_slug in &linked {
                if delete_events {
                    t.events.remove(event_slug);
                } else if let Some(event) = t.events.get_mut(event_slug) {
                    event.series_slug = None;
                    event.updated_at = now;
                }
            }
            Ok(linked.len())
        })
    }
}

impl EventQuery for InMemoryStore {
    fn find_by_slug(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Event>> {
        Ok(self.read(ctx, |t| t.events.get(slug).cloned()))
    }

    fn find_by_series(&self, ctx: &TenantContext, series_slug: &str) -> StoreResult<Vec<Event>> {
        let mut events: Vec<Event> = self.read(ctx, |t| {
            t.events
                .values()
                .filter(|e| e.series_slug.as_deref() == Some(series_slug))
                .cloned()
                .collect()
        });
        events.sort_by_key(|e| e.start_date);
        Ok(events)
    }

    fn find_by_series_and_start(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        Ok(self.read(ctx, |t| t.occupant(series_slug, start).cloned()))
    }
}

impl EventManagement for InMemoryStore {
    fn create(&self, ctx: &TenantContext, event: NewEvent) -> StoreResult<Event> {
        self.write(ctx, |t, id| {
            if let Some(series_slug) = event.series_slug.as_deref() {
                t.require_series(series_slug)?;
                if let Some(taken) = t.occupant(series_slug, event.start_date) {
                    return Err(StoreError::UniqueViolation(format!(
                        "series {} already has event {} at {}",
                        series_slug, taken.slug, event.start_date
                    )));
                }
            }
            Ok(t.insert_event(id, event, Utc::now()))
        })
    }

    fn create_occurrence_event(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        template: &EventTemplate,
        time_zone: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event> {
        self.write(ctx, |t, id| {
            t.require_series(series_slug)?;
            if let Some(taken) = t.occupant(series_slug, start) {
                return Err(StoreError::UniqueViolation(format!(
                    "series {} already has event {} at {}",
                    series_slug, taken.slug, start
                )));
            }
            let new = NewEvent {
                series_slug: Some(series_slug.to_string()),
                start_date: start,
                end_date: start + template.duration(),
                time_zone: time_zone.to_string(),
                fields: template.fields.clone(),
            };
            Ok(t.insert_event(id, new, Utc::now()))
        })
    }

    fn update(
        &self,
        ctx: &TenantContext,
        slug: &str,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<Event> {
        self.write(ctx, |t, _| {
            let event = t.event_mut(slug)?;
            patch.apply(&mut event.fields);
            event.updated_by = actor_id.map(str::to_string);
            event.updated_at = Utc::now();
            Ok(event.clone())
        })
    }

    fn attach_to_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event> {
        self.write(ctx, |t, _| {
            t.require_series(series_slug)?;
            if let Some(taken) = t.occupant(series_slug, start) {
                if taken.slug != slug {
                    return Err(StoreError::UniqueViolation(format!(
                        "series {} already has event {} at {}",
                        series_slug, taken.slug, start
                    )));
                }
            }
            let event = t.event_mut(slug)?;
            let duration = event.duration();
            event.series_slug = Some(series_slug.to_string());
            event.start_date = start;
            event.end_date = start + duration;
            event.updated_at = Utc::now();
            Ok(event.clone())
        })
    }

    fn detach_from_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Event> {
        self.write(ctx, |t, _| {
            let event = t.event_mut(slug)?;
            event.series_slug = None;
            event.updated_at = Utc::now();
            Ok(event.clone())
        })
    }

    fn delete(&self, ctx: &TenantContext, slug: &str) -> StoreResult<()> {
        self.write(ctx, |t, _| {
            t.events
                .remove(slug)
                .map(|_| ())
                .ok_or_else(|| StoreError::NotFound(format!("event {}", slug)))
        })
    }
}
