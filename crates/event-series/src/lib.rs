//! # event-series
//!
//! Recurring event series on top of [`recurrence_engine`].
//!
//! A series is a recurrence rule, a timezone, and a template of shared event
//! fields. Occurrences are generated lazily when listed and turned into concrete,
//! independently editable events only on demand. Materialization is idempotent
//! under concurrency: the store's uniqueness constraint on (series slug, start
//! date) decides the winner and losers re-read the winner's row.
//!
//! ## Modules
//!
//! - [`service`]: `EventSeriesService`, the orchestrator
//! - [`store`]: storage traits and the in-memory backend
//! - [`merge`]: generated/materialized occurrence merge
//! - [`model`]: typed records and request/response shapes
//! - [`config`]: `SeriesConfig`
//! - [`clock`]: wall-clock abstraction
//! - [`error`]: Error types

pub mod clock;
pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod service;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::SeriesConfig;
pub use error::{EventFailure, SeriesError, SeriesResult};
pub use merge::merge_occurrences;
pub use model::{
    CreateSeries, DeleteOptions, DeleteSummary, Event, EventFields, EventPatch, EventStatus,
    EventTemplate, EventVisibility, InlineTemplate, NewEvent, Occurrence, OccurrenceQuery, Series,
    SeriesDetails, TenantContext, UpdateSeries, UpdateSummary,
};
pub use service::EventSeriesService;
pub use store::{
    EventManagement, EventQuery, InMemoryStore, SeriesRepository, SeriesStore, StoreError,
};
