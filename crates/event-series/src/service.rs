//! Series lifecycle: creation/promotion, occurrence listing, on-demand
//! materialization, future-dated edits, and deletion.
//!
//! The service is stateless between calls. Every operation is a function of the
//! tenant context and its arguments; storage is reached only through the traits in
//! [`crate::store`].

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use recurrence_engine::{
    generate_occurrences, instant_on_date, is_occurrence, parse_timezone, resolve_local,
    to_local, ExpansionOptions, RecurrenceRule,
};
use tracing::{debug, info, instrument, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::SeriesConfig;
use crate::error::{EventFailure, SeriesError, SeriesResult};
use crate::merge::merge_occurrences;
use crate::model::{
    CreateSeries, DeleteOptions, DeleteSummary, Event, EventPatch, InlineTemplate, NewEvent,
    NewSeries, Occurrence, OccurrenceQuery, Series, SeriesDetails, TenantContext, UpdateSeries,
    UpdateSummary,
};
use crate::store::{same_instant, SeriesStore, StoreError};

/// Re-reads allowed when a series row changes between read and write.
const UPDATE_ATTEMPTS: u32 = 3;

pub struct EventSeriesService<S, C = SystemClock> {
    store: Arc<S>,
    clock: C,
    config: SeriesConfig,
}

impl<S: SeriesStore> EventSeriesService<S, SystemClock> {
    pub fn new(store: Arc<S>, config: SeriesConfig) -> Self {
        Self::with_clock(store, config, SystemClock)
    }
}

impl<S: SeriesStore, C: Clock> EventSeriesService<S, C> {
    pub fn with_clock(store: Arc<S>, config: SeriesConfig, clock: C) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    /// Create a series from either an existing event or an inline template.
    ///
    /// Only the template occurrence is persisted; the rest of the rule is
    /// materialized lazily.
    ///
    /// # Errors
    /// `Validation` unless exactly one template source is given or if the rule or
    /// timezone is invalid; otherwise the errors of
    /// [`create_from_existing_event`](Self::create_from_existing_event).
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id))]
    pub fn create(&self, ctx: &TenantContext, request: CreateSeries) -> SeriesResult<Series> {
        let CreateSeries {
            name,
            description,
            recurrence_rule,
            time_zone,
            template_event_slug,
            template,
        } = request;
        recurrence_rule.validate()?;

        match (template_event_slug, template) {
            (Some(event_slug), None) => self.create_from_existing_event(
                ctx,
                &event_slug,
                recurrence_rule,
                SeriesDetails {
                    name,
                    description,
                    time_zone,
                },
            ),
            (None, Some(inline)) => {
                let time_zone = time_zone.ok_or_else(|| {
                    SeriesError::Validation(
                        "timeZone is required with an inline template".to_string(),
                    )
                })?;
                self.create_with_inline_template(
                    ctx,
                    name,
                    description,
                    recurrence_rule,
                    time_zone,
                    inline,
                )
            }
            (Some(_), Some(_)) => Err(SeriesError::Validation(
                "give either templateEventSlug or template, not both".to_string(),
            )),
            (None, None) => Err(SeriesError::Validation(
                "a templateEventSlug or an inline template is required".to_string(),
            )),
        }
    }

    /// Promote a standalone event to the template of a new series.
    ///
    /// The series row and the event's back-reference are written in one atomic
    /// store operation.
    ///
    /// # Errors
    /// `NotFound` if the event does not exist, `Conflict` if it already belongs to a
    /// series, `Validation` for a bad rule or timezone.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, event = %event_slug))]
    pub fn create_from_existing_event(
        &self,
        ctx: &TenantContext,
        event_slug: &str,
        rule: RecurrenceRule,
        details: SeriesDetails,
    ) -> SeriesResult<Series> {
        rule.validate()?;

        let event = self
            .store
            .find_by_slug(ctx, event_slug)?
            .ok_or_else(|| SeriesError::NotFound(format!("event {}", event_slug)))?;
        if let Some(existing) = &event.series_slug {
            return Err(SeriesError::Conflict(format!(
                "event {} already belongs to series {}",
                event_slug, existing
            )));
        }

        let time_zone = details.time_zone.unwrap_or_else(|| event.time_zone.clone());
        let tz = parse_timezone(&time_zone)?;

        let new = NewSeries {
            name: details.name.unwrap_or_else(|| event.fields.name.clone()),
            description: details.description.or_else(|| event.fields.description.clone()),
            recurrence_rule: rule,
            time_zone,
            anchor: to_local(&tz, event.start_date),
            template: event.template(),
            created_by: ctx.actor_id.clone(),
        };

        let (series, _) = self.store.insert_series_linked(ctx, new, &event.slug)?;
        info!(series = %series.slug, "promoted event to series template");
        Ok(series)
    }

    fn create_with_inline_template(
        &self,
        ctx: &TenantContext,
        name: Option<String>,
        description: Option<String>,
        rule: RecurrenceRule,
        time_zone: String,
        inline: InlineTemplate,
    ) -> SeriesResult<Series> {
        let tz = parse_timezone(&time_zone)?;
        if inline.duration_minutes < 0 {
            return Err(SeriesError::Validation(
                "durationMinutes must not be negative".to_string(),
            ));
        }

        let start = resolve_local(&tz, inline.start);
        let template_event = self.store.create(
            ctx,
            NewEvent {
                series_slug: None,
                start_date: start,
                end_date: start + chrono::Duration::minutes(inline.duration_minutes),
                time_zone: time_zone.clone(),
                fields: inline.fields,
            },
        )?;

        let new = NewSeries {
            name: name.unwrap_or_else(|| template_event.fields.name.clone()),
            description: description.or_else(|| template_event.fields.description.clone()),
            recurrence_rule: rule,
            time_zone,
            anchor: inline.start,
            template: template_event.template(),
            created_by: ctx.actor_id.clone(),
        };

        match self.store.insert_series_linked(ctx, new, &template_event.slug) {
            Ok((series, _)) => {
                info!(series = %series.slug, "created series with inline template");
                Ok(series)
            }
            Err(err) => {
                // Compensate: the template event must not outlive a failed series insert.
                if let Err(cleanup) = self.store.delete(ctx, &template_event.slug) {
                    warn!(event = %template_event.slug, error = %cleanup, "orphaned template event");
                }
                Err(err.into())
            }
        }
    }

    /// Read-only lookup for external consumers.
    pub fn find_series_by_slug(
        &self,
        ctx: &TenantContext,
        slug: &str,
    ) -> SeriesResult<Option<Series>> {
        Ok(self.store.find_series(ctx, slug)?)
    }

    fn require_series(&self, ctx: &TenantContext, slug: &str) -> SeriesResult<Series> {
        self.store
            .find_series(ctx, slug)?
            .ok_or_else(|| SeriesError::NotFound(format!("series {}", slug)))
    }

    /// Change the series' name, description, rule, or timezone.
    ///
    /// Materialized events are left alone; the anchor keeps its local wall-clock time.
    /// The change is applied to a fresh read of the row and written with a version
    /// check, so a concurrent write (such as a future-dated edit) is never
    /// overwritten. After `UPDATE_ATTEMPTS` lost races the `Conflict` is returned.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %slug))]
    pub fn update(
        &self,
        ctx: &TenantContext,
        slug: &str,
        update: UpdateSeries,
    ) -> SeriesResult<Series> {
        if let Some(rule) = &update.recurrence_rule {
            rule.validate()?;
        }
        if let Some(time_zone) = &update.time_zone {
            parse_timezone(time_zone)?;
        }

        let mut attempt = 1;
        loop {
            let mut series = self.require_series(ctx, slug)?;
            if let Some(rule) = &update.recurrence_rule {
                series.recurrence_rule = rule.clone();
            }
            if let Some(time_zone) = &update.time_zone {
                series.time_zone = time_zone.clone();
            }
            if let Some(name) = &update.name {
                series.name = name.clone();
            }
            if let Some(description) = &update.description {
                series.description = Some(description.clone());
            }

            match self.store.update_series(ctx, &series) {
                Ok(series) => {
                    info!(version = series.version, "updated series");
                    return Ok(series);
                }
                Err(StoreError::Conflict(detail)) if attempt < UPDATE_ATTEMPTS => {
                    debug!(%detail, attempt, "series changed underneath, retrying");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// List occurrences: generated instants merged with materialized events.
    ///
    /// Without `include_past` only occurrences at or after "now" are listed.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %series_slug))]
    pub fn get_occurrences(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        query: OccurrenceQuery,
    ) -> SeriesResult<Vec<Occurrence>> {
        let series = self.require_series(ctx, series_slug)?;
        let tz = parse_timezone(&series.time_zone)?;

        let count = query
            .count
            .unwrap_or(self.config.default_occurrence_count)
            .min(self.config.max_occurrence_count);
        let after = (!query.include_past).then(|| self.clock.now());

        let expansion = generate_occurrences(
            &series.recurrence_rule,
            tz,
            series.anchor,
            &ExpansionOptions {
                count: Some(count),
                after,
                ..ExpansionOptions::default()
            },
            &self.config.limits,
        )?;
        if expansion.truncated {
            warn!(
                returned = expansion.instants.len(),
                "occurrence generation stopped at the safety horizon"
            );
        }

        let mut events = self.store.find_by_series(ctx, series_slug)?;
        if let Some(after) = after {
            events.retain(|e| e.start_date >= after);
        }

        let mut occurrences = merge_occurrences(&expansion.instants, events);
        occurrences.truncate(count);
        debug!(count = occurrences.len(), "listed occurrences");
        Ok(occurrences)
    }

    /// Return the event for the occurrence at `date`, creating it from the template
    /// if it does not exist yet. Concurrent callers converge on a single event.
    ///
    /// # Errors
    /// `NotFound` for an unknown series, `Validation` if `date` is not an occurrence.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %series_slug, date = %date))]
    pub fn get_or_materialize_occurrence(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        date: DateTime<Utc>,
    ) -> SeriesResult<Event> {
        let series = self.require_series(ctx, series_slug)?;

        if let Some(existing) = self.store.find_by_series_and_start(ctx, series_slug, date)? {
            debug!(event = %existing.slug, "occurrence already materialized");
            return Ok(existing);
        }

        let tz = parse_timezone(&series.time_zone)?;
        if !is_occurrence(
            &series.recurrence_rule,
            tz,
            series.anchor,
            date,
            &self.config.limits,
        )? {
            return Err(SeriesError::Validation(format!(
                "{} is not an occurrence of series {}",
                date.to_rfc3339(),
                series_slug
            )));
        }

        let template = series.template_for(date);
        match self
            .store
            .create_occurrence_event(ctx, series_slug, template, &series.time_zone, date)
        {
            Ok(event) => {
                info!(event = %event.slug, "materialized occurrence");
                Ok(event)
            }
            Err(StoreError::UniqueViolation(detail)) => {
                warn!(%detail, "concurrent materialization won, re-reading");
                self.store
                    .find_by_series_and_start(ctx, series_slug, date)?
                    .ok_or_else(|| {
                        SeriesError::Store(StoreError::Backend(format!(
                            "occurrence at {} vanished after unique violation",
                            date.to_rfc3339()
                        )))
                    })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// [`get_or_materialize_occurrence`](Self::get_or_materialize_occurrence) for a
    /// calendar date, resolved against the series timezone at the anchor's
    /// wall-clock time.
    pub fn materialize_on_date(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        date: NaiveDate,
    ) -> SeriesResult<Event> {
        let series = self.require_series(ctx, series_slug)?;
        let tz = parse_timezone(&series.time_zone)?;
        let instant = instant_on_date(tz, series.anchor, date);
        self.get_or_materialize_occurrence(ctx, series_slug, instant)
    }

    /// Apply `patch` to every materialized occurrence starting at or after `from`
    /// and to the template used for later materializations at or after `from`.
    /// Earlier occurrences are not touched.
    ///
    /// Events and template change in one store step: if it fails, nothing changed
    /// and the call can simply be repeated.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %series_slug, from = %from))]
    pub fn update_future_occurrences_from(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        from: DateTime<Utc>,
        patch: &EventPatch,
    ) -> SeriesResult<UpdateSummary> {
        if patch.is_empty() {
            return Err(SeriesError::Validation("patch has no fields".to_string()));
        }

        let count = self.store.apply_future_patch(
            ctx,
            series_slug,
            from,
            patch,
            ctx.actor_id.as_deref(),
        )?;
        info!(count, "updated future occurrences");
        Ok(UpdateSummary {
            count,
            message: format!(
                "Updated {} occurrence(s) of series {} from {}",
                count,
                series_slug,
                from.to_rfc3339()
            ),
        })
    }

    /// Attach a standalone event to the series at `date`. Repeating the call is a
    /// no-op.
    ///
    /// # Errors
    /// `NotFound` for an unknown series or event, `Conflict` if the event belongs to
    /// another series or another event already holds that occurrence.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %series_slug, event = %event_slug))]
    pub fn add_event(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        event_slug: &str,
        date: DateTime<Utc>,
    ) -> SeriesResult<Event> {
        self.require_series(ctx, series_slug)?;
        let event = self
            .store
            .find_by_slug(ctx, event_slug)?
            .ok_or_else(|| SeriesError::NotFound(format!("event {}", event_slug)))?;

        match event.series_slug.as_deref() {
            Some(other) if other != series_slug => {
                return Err(SeriesError::Conflict(format!(
                    "event {} already belongs to series {}",
                    event_slug, other
                )));
            }
            Some(_) if same_instant(event.start_date, date) => {
                debug!("event already attached");
                return Ok(event);
            }
            _ => {}
        }

        let attached = self
            .store
            .attach_to_series(ctx, event_slug, series_slug, date)
            .map_err(|err| match err {
                StoreError::UniqueViolation(detail) => SeriesError::Conflict(detail),
                other => other.into(),
            })?;
        info!(%date, "attached event to series");
        Ok(attached)
    }

    /// Delete the series, cascading to its events or detaching them.
    ///
    /// Every event is attempted; if any fails the series row is kept and the
    /// failures are reported together so the call can be retried. Once all of them
    /// succeed, the row is removed together with any event materialized or attached
    /// in the meantime, so no event is left pointing at a deleted series.
    ///
    /// # Errors
    /// `NotFound` for an unknown series, `PartialFailure` when some events could not
    /// be deleted or detached.
    #[instrument(skip_all, fields(tenant = %ctx.tenant_id, series = %series_slug, delete_events = options.delete_events))]
    pub fn delete_series(
        &self,
        ctx: &TenantContext,
        series_slug: &str,
        options: DeleteOptions,
    ) -> SeriesResult<DeleteSummary> {
        self.require_series(ctx, series_slug)?;
        let events = self.store.find_by_series(ctx, series_slug)?;

        let mut succeeded = 0;
        let mut failures = Vec::new();
        for event in events {
            let result = if options.delete_events {
                self.store.delete(ctx, &event.slug)
            } else {
                self.store.detach_from_series(ctx, &event.slug).map(|_| ())
            };
            match result {
                Ok(()) => succeeded += 1,
                Err(err) => {
                    warn!(event = %event.slug, error = %err, "series event step failed");
                    failures.push(EventFailure {
                        event_slug: event.slug,
                        reason: err.to_string(),
                    });
                }
            }
        }

        if !failures.is_empty() {
            return Err(SeriesError::PartialFailure {
                series_slug: series_slug.to_string(),
                succeeded,
                failures,
            });
        }

        let swept = self
            .store
            .delete_series(ctx, series_slug, options.delete_events)?;
        if swept > 0 {
            debug!(swept, "swept events linked during deletion");
        }
        let succeeded = succeeded + swept;
        info!(events = succeeded, "deleted series");

        let (events_deleted, events_detached) = if options.delete_events {
            (succeeded, 0)
        } else {
            (0, succeeded)
        };
        Ok(DeleteSummary {
            series_slug: series_slug.to_string(),
            events_deleted,
            events_detached,
        })
    }
}
