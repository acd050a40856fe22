//! Narrow storage interfaces consumed by the series service.
//!
//! Each trait takes an explicit [`TenantContext`]; implementations scope every read
//! and write to that tenant. One backend implements all three, so operations that
//! span a series and an event (promotion) can be made atomic inside the backend.

pub mod memory;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Event, EventPatch, EventTemplate, NewEvent, NewSeries, Series, TenantContext};

pub use memory::InMemoryStore;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A unique constraint (series slug, or series slug + start date) was violated.
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Two instants name the same occurrence when they agree to the second.
pub fn same_instant(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.timestamp() == b.timestamp()
}

pub trait SeriesRepository: Send + Sync {
    fn find_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Series>>;

    /// Insert a series and point `template_event_slug` back at it as one atomic step.
    ///
    /// Fails with `Conflict` if the event already belongs to a series and with
    /// `NotFound` if the event does not exist; in both cases nothing is written.
    fn insert_series_linked(
        &self,
        ctx: &TenantContext,
        series: NewSeries,
        template_event_slug: &str,
    ) -> StoreResult<(Series, Event)>;

    /// Replace the stored row with `series`.
    ///
    /// `series.version` must match the stored version, otherwise `Conflict` is
    /// returned and nothing is written. The returned row carries the next version.
    fn update_series(&self, ctx: &TenantContext, series: &Series) -> StoreResult<Series>;

    /// Patch every event of the series starting at or after `from`, and record the
    /// patched template for later materializations, as one atomic step.
    ///
    /// Returns the number of events patched. On error nothing is written.
    fn apply_future_patch(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        from: DateTime<Utc>,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<usize>;

    /// Remove the series row and, in the same step, delete (or detach, when
    /// `delete_events` is false) any event still referencing it.
    ///
    /// Returns the number of events swept along with the row.
    fn delete_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        delete_events: bool,
    ) -> StoreResult<usize>;
}

pub trait EventQuery: Send + Sync {
    fn find_by_slug(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Option<Event>>;

    /// All events linked to the series, ordered by start date.
    fn find_by_series(&self, ctx: &TenantContext, series_slug: &str) -> StoreResult<Vec<Event>>;

    fn find_by_series_and_start(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Option<Event>>;
}

pub trait EventManagement: Send + Sync {
    /// Insert an event. When `event.series_slug` is set the series must exist.
    fn create(&self, ctx: &TenantContext, event: NewEvent) -> StoreResult<Event>;

    /// Create the event for one occurrence. Enforces uniqueness of
    /// (series slug, start date) and returns `UniqueViolation` when it is taken, or
    /// `NotFound` when the series row is gone.
    fn create_occurrence_event(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        template: &EventTemplate,
        time_zone: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event>;

    fn update(
        &self,
        ctx: &TenantContext,
        slug: &str,
        patch: &EventPatch,
        actor_id: Option<&str>,
    ) -> StoreResult<Event>;

    /// Link an event to a series at `start`, moving it there with its duration kept.
    /// Fails with `NotFound` when the series row is gone.
    fn attach_to_series(
        &self,
        ctx: &TenantContext,
        slug: &str,
        series_slug: &str,
        start: DateTime<Utc>,
    ) -> StoreResult<Event>;

    /// Clear the event's series back-reference.
    fn detach_from_series(&self, ctx: &TenantContext, slug: &str) -> StoreResult<Event>;

    fn delete(&self, ctx: &TenantContext, slug: &str) -> StoreResult<()>;
}

/// Everything the series service needs from storage.
pub trait SeriesStore: SeriesRepository + EventQuery + EventManagement {}

impl<T: SeriesRepository + EventQuery + EventManagement> SeriesStore for T {}
