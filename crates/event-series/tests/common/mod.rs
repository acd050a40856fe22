//! Shared fixtures for event-series integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use event_series::model::{NewEvent, NewSeries};
use event_series::store::StoreResult;
use event_series::{
    CreateSeries, Event, EventFields, EventManagement, EventPatch, EventQuery, EventSeriesService,
    EventTemplate, FixedClock, InMemoryStore, Series, SeriesConfig, SeriesRepository, StoreError,
    TenantContext,
};
use recurrence_engine::{parse_local, Frequency, RecurrenceRule};

pub fn ctx() -> TenantContext {
    TenantContext::new("tenant-a").with_actor("user-1")
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn local(value: &str) -> NaiveDateTime {
    parse_local(value).unwrap()
}

pub fn service_at<S>(store: Arc<S>, now: DateTime<Utc>) -> EventSeriesService<S, FixedClock>
where
    S: event_series::SeriesStore,
{
    EventSeriesService::with_clock(store, SeriesConfig::default(), FixedClock(now))
}

/// Insert a standalone event directly through the event collaborator.
pub fn seed_event<S: EventManagement>(
    store: &S,
    ctx: &TenantContext,
    name: &str,
    start: DateTime<Utc>,
    minutes: i64,
    time_zone: &str,
) -> Event {
    store
        .create(
            ctx,
            NewEvent {
                series_slug: None,
                start_date: start,
                end_date: start + Duration::minutes(minutes),
                time_zone: time_zone.to_string(),
                fields: EventFields {
                    location: Some("Room 4".to_string()),
                    ..EventFields::named(name)
                },
            },
        )
        .unwrap()
}

pub fn weekly() -> RecurrenceRule {
    RecurrenceRule::new(Frequency::Weekly, 1)
}

/// A weekly "Team Sync" series promoted from an event on Monday 2025-06-02,
/// 10:00 America/New_York (14:00 UTC).
pub fn team_sync<S>(
    service: &EventSeriesService<S, FixedClock>,
    store: &S,
    rule: RecurrenceRule,
) -> (Series, Event)
where
    S: event_series::SeriesStore,
{
    let template = seed_event(
        store,
        &ctx(),
        "Team Sync",
        utc(2025, 6, 2, 14, 0),
        60,
        "America/New_York",
    );
    let series = service
        .create(
            &ctx(),
            CreateSeries {
                name: None,
                description: None,
                recurrence_rule: rule,
                time_zone: None,
                template_event_slug: Some(template.slug.clone()),
                template: None,
            },
        )
        .unwrap();
    (series, template)
}

/// Wraps the in-memory store to inject the failures a shared database produces.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: InMemoryStore,
    race_next_create: AtomicBool,
    failing: Mutex<HashSet<String>>,
    materialize_during_delete: Mutex<Option<DateTime<Utc>>>,
    patch_during_update: Mutex<Option<(DateTime<Utc>, EventPatch)>>,
}

impl FaultyStore {
    /// The next occurrence insert finds its slot taken by a competing caller that
    /// committed between the service's read and its write.
    pub fn race_next_create(&self) {
        self.race_next_create.store(true, Ordering::SeqCst);
    }

    /// A competing caller materializes the occurrence at `start` after the service
    /// has swept the series' events but before the series row goes away.
    pub fn materialize_during_delete(&self, start: DateTime<Utc>) {
        *self.materialize_during_delete.lock().unwrap() = Some(start);
    }

    /// A competing future-dated edit commits between the service's read of the
    /// series and its next `update_series` write.
    pub fn patch_during_update(&self, from: DateTime<Utc>, patch: EventPatch) {
        *self.patch_during_update.lock().unwrap() = Some((from, patch));
    }

    /// Updating, deleting, or detaching this event fails until cleared.
    pub fn fail_event(&self, slug: &str) {
        self.failing.lock().unwrap().insert(slug.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing.lock().unwrap().clear();
    }

    fn check(&self, slug: &str) -> StoreResult<()> {
        if self.failing.lock().unwrap().contains(slug) {
            return Err(StoreError::Backend(format!("simulated outage for {}", slug)));
        }
        Ok(())
    }
}

impl SeriesRepository for FaultyStore {
    fn find_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Series>> {
        self.inner.find_series(ctx, slug)
    }

    fn insert_series_linked(
        &self,
        ctx: &TenantContext,
        series: NewSeries,
        template_event_slug: &str,
    ) -> StoreResult<(Series, Event)> {
        self.inner.insert_series_linked(ctx, series, template_event_slug)
    }

    fn update_series(&self, ctx: &TenantContext, series: &Series) -> StoreResult<Series> {
        let competing = self.patch_during_update.lock().unwrap().take();
        if let Some((from, patch)) = competing {
            self.inner
                .apply_future_patch(ctx, &series.slug, from, &patch, Some("user-2"))?;
        }
        self.inner.update_series(ctx, series)
    }

    fn apply_future_patch(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        from: DateTime<Utc>,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<usize> {
        // A transactional backend rolls the whole step back when one row fails.
        for event in self.inner.find_by_series(ctx, series_slug)? {
            if event.start_date >= from {
                self.check(&event.slug)?;
            }
        }
        self.inner
            .apply_future_patch(ctx, series_slug, from, patch, actor_id)
    }

    fn delete_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        delete_events: bool,
    ) -> StoreResult<usize> {
        let competing = self.materialize_during_delete.lock().unwrap().take();
        if let Some(start) = competing {
            if let Some(series) = self.inner.find_series(ctx, slug)? {
                self.inner.create_occurrence_event(
                    ctx,
                    slug,
                    series.template_for(start),
                    &series.time_zone,
                    start,
                )?;
            }
        }
        self.inner.delete_series(ctx, slug, delete_events)
    }
}

impl EventQuery for FaultyStore {
    fn find_by_slug(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Event>> {
        self.inner.find_by_slug(ctx, slug)
    }

    fn find_by_series(&self, ctx: &TenantContext, series_slug: &str) -> StoreResult<Vec<Event>> {
        self.inner.find_by_series(ctx, series_slug)
    }

    fn find_by_series_and_start(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Option<Event>> {
        self.inner.find_by_series_and_start(ctx, series_slug, start)
    }
}

impl EventManagement for FaultyStore {
    fn create(&self, ctx: &TenantContext, event: NewEvent) -> StoreResult<Event> {
        self.inner.create(ctx, event)
    }

    fn create_occurrence_event(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        template: &EventTemplate,
        time_zone: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event> {
        if self.race_next_create.swap(false, Ordering::SeqCst) {
            self.inner
                .create_occurrence_event(ctx, series_slug, template, time_zone, start)?;
        }
        self.inner
            .create_occurrence_event(ctx, series_slug, template, time_zone, start)
    }

    fn update(
        &self,
        ctx: &TenantContext,
        slug: &str,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<Event> {
        self.check(slug)?;
        self.inner.update(ctx, slug, patch, actor_id)
    }

    fn attach_to_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event> {
        self.inner.attach_to_series(ctx, slug, series_slug, start)
    }

    fn detach_from_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Event> {
        self.check(slug)?;
        self.inner.detach_from_series(ctx, slug)
    }

    fn delete(&self, ctx: &TenantContext, slug: &str) -> StoreResult<()> {
        self.check(slug)?;
        self.inner.delete(ctx, slug)
    }
}
