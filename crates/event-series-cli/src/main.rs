//! `series` CLI: expand recurrence rules and manage event series stored in a
//! JSON snapshot file.
//!
//! ## Usage
//!
//! ```sh
//! # Expand an RRULE (or a JSON rule) in a timezone
//! series expand --rule "FREQ=DAILY;COUNT=5" --tz America/New_York --start 2023-03-10T10:00
//!
//! # Seed a standalone event, then promote it to a weekly series
//! series --store cal.json event-create --name "Team Sync" --tz America/New_York --start 2025-06-02T10:00
//! series --store cal.json create --rule "FREQ=WEEKLY" --event team-sync-1a2b3c4d
//!
//! # Create a series from an inline template
//! series --store cal.json create --rule "FREQ=WEEKLY;BYDAY=MO,WE" --tz Europe/London \
//!     --start 2025-06-02T07:30 --duration 45 --name "Morning Run"
//!
//! # List, materialize, edit forward, delete
//! series --store cal.json occurrences morning-run-5e6f7a8b --count 5
//! series --store cal.json materialize morning-run-5e6f7a8b 2025-06-04
//! series --store cal.json update-future morning-run-5e6f7a8b --from 2025-07-01T00:00:00Z --patch '{"location":"Park"}'
//! series --store cal.json delete morning-run-5e6f7a8b --delete-events
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`).

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use event_series::{
    CreateSeries, DeleteOptions, EventFields, EventManagement, EventPatch, EventSeriesService,
    InMemoryStore, InlineTemplate, NewEvent, OccurrenceQuery, SeriesConfig, TenantContext,
};
use recurrence_engine::{
    generate_occurrences, parse_local, parse_timezone, resolve_local, ExpansionOptions,
    RecurrenceRule,
};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "series",
    version,
    about = "DST-safe recurrence expansion and event series management"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Snapshot file holding series and events (created on first write)
    #[arg(long, global = true, default_value = "series-store.json")]
    store: PathBuf,

    /// Tenant the operation runs as
    #[arg(long, global = true, default_value = "default")]
    tenant: String,

    /// Actor recorded on created series and edited events
    #[arg(long, global = true)]
    actor: Option<String>,

    /// TOML file with service settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a recurrence rule into UTC instants (no store involved)
    Expand {
        /// RRULE text ("FREQ=WEEKLY;BYDAY=MO") or a JSON rule object
        #[arg(long)]
        rule: String,
        /// IANA timezone of the anchor
        #[arg(long)]
        tz: String,
        /// Local anchor date-time, e.g. 2025-06-02T10:00
        #[arg(long)]
        start: String,
        /// Maximum number of instants to return
        #[arg(long)]
        count: Option<usize>,
        /// Inclusive upper bound (RFC 3339)
        #[arg(long)]
        until: Option<String>,
        /// Skip instants before this one (RFC 3339)
        #[arg(long)]
        after: Option<String>,
        /// Instants to leave out (RFC 3339, repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Create a standalone event
    EventCreate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        tz: String,
        /// Local start date-time
        #[arg(long)]
        start: String,
        /// Length in minutes
        #[arg(long, default_value_t = 60)]
        duration: i64,
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Create a series from an existing event (--event) or an inline template (--start)
    Create {
        /// RRULE text or JSON rule object
        #[arg(long)]
        rule: String,
        /// Slug of the event to promote to template
        #[arg(long, conflicts_with = "start")]
        event: Option<String>,
        /// Local start of the inline template
        #[arg(long)]
        start: Option<String>,
        /// Inline template length in minutes
        #[arg(long, default_value_t = 60)]
        duration: i64,
        /// Series timezone (required with --start)
        #[arg(long)]
        tz: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Print a series
    Show { slug: String },
    /// List occurrences, merging generated dates with materialized events
    Occurrences {
        slug: String,
        #[arg(long)]
        count: Option<usize>,
        /// Include occurrences before now
        #[arg(long)]
        include_past: bool,
    },
    /// Get or create the event for one occurrence (YYYY-MM-DD or RFC 3339 instant)
    Materialize { slug: String, date: String },
    /// Patch every occurrence at or after --from, including later materializations
    UpdateFuture {
        slug: String,
        /// RFC 3339 instant
        #[arg(long)]
        from: String,
        /// JSON object of fields to change, e.g. '{"name":"Renamed"}'
        #[arg(long)]
        patch: String,
    },
    /// Attach a standalone event to the series at an instant
    AddEvent {
        slug: String,
        #[arg(long)]
        event: String,
        /// RFC 3339 instant
        #[arg(long)]
        date: String,
    },
    /// Delete a series, detaching its events unless --delete-events
    Delete {
        slug: String,
        #[arg(long)]
        delete_events: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    if let Commands::Expand {
        rule,
        tz,
        start,
        count,
        until,
        after,
        exclude,
    } = &cli.command
    {
        let rule = parse_rule(rule)?;
        let tz = parse_timezone(tz)?;
        let anchor = parse_local(start)?;
        let options = ExpansionOptions {
            count: *count,
            until: until.as_deref().map(parse_instant).transpose()?,
            after: after.as_deref().map(parse_instant).transpose()?,
            exclude: exclude
                .iter()
                .map(|s| parse_instant(s))
                .collect::<Result<_>>()?,
        };
        let expansion = generate_occurrences(&rule, tz, anchor, &options, &config.limits)
            .context("Failed to expand rule")?;
        if expansion.truncated {
            warn!(
                returned = expansion.instants.len(),
                max_occurrences = config.limits.max_occurrences,
                "expansion stopped at the safety horizon"
            );
        }
        return print_json(&expansion);
    }

    let store = Arc::new(
        InMemoryStore::load(&cli.store)
            .with_context(|| format!("Failed to load store: {}", cli.store.display()))?,
    );
    debug!(path = %cli.store.display(), tenant = %cli.tenant, "loaded store");
    let service = EventSeriesService::new(store.clone(), config);
    let mut ctx = TenantContext::new(cli.tenant);
    ctx.actor_id = cli.actor;

    let mutated = match cli.command {
        Commands::Expand { .. } => false,
        Commands::EventCreate {
            name,
            tz,
            start,
            duration,
            location,
            description,
        } => {
            let zone = parse_timezone(&tz)?;
            let start = resolve_local(&zone, parse_local(&start)?);
            let event = store.create(
                &ctx,
                NewEvent {
                    series_slug: None,
                    start_date: start,
                    end_date: start + Duration::minutes(duration),
                    time_zone: tz,
                    fields: EventFields {
                        location,
                        description,
                        ..EventFields::named(name)
                    },
                },
            )?;
            print_json(&event)?;
            true
        }
        Commands::Create {
            rule,
            event,
            start,
            duration,
            tz,
            name,
            description,
        } => {
            let template = match start {
                Some(start) => Some(InlineTemplate {
                    start: parse_local(&start)?,
                    duration_minutes: duration,
                    fields: EventFields::named(name.clone().unwrap_or_else(|| "Event".to_string())),
                }),
                None => None,
            };
            let series = service.create(
                &ctx,
                CreateSeries {
                    name,
                    description,
                    recurrence_rule: parse_rule(&rule)?,
                    time_zone: tz,
                    template_event_slug: event,
                    template,
                },
            )?;
            print_json(&series)?;
            true
        }
        Commands::Show { slug } => {
            match service.find_series_by_slug(&ctx, &slug)? {
                Some(series) => print_json(&series)?,
                None => bail!("Series not found: {}", slug),
            }
            false
        }
        Commands::Occurrences {
            slug,
            count,
            include_past,
        } => {
            let occurrences =
                service.get_occurrences(&ctx, &slug, OccurrenceQuery { count, include_past })?;
            print_json(&occurrences)?;
            false
        }
        Commands::Materialize { slug, date } => {
            let event = match NaiveDate::parse_from_str(&date, "%Y-%m-%d") {
                Ok(day) => service.materialize_on_date(&ctx, &slug, day)?,
                Err(_) => service.get_or_materialize_occurrence(&ctx, &slug, parse_instant(&date)?)?,
            };
            print_json(&event)?;
            true
        }
        Commands::UpdateFuture { slug, from, patch } => {
            let patch: EventPatch =
                serde_json::from_str(&patch).context("Failed to parse --patch as JSON")?;
            let summary =
                service.update_future_occurrences_from(&ctx, &slug, parse_instant(&from)?, &patch)?;
            print_json(&summary)?;
            true
        }
        Commands::AddEvent { slug, event, date } => {
            let event = service.add_event(&ctx, &slug, &event, parse_instant(&date)?)?;
            print_json(&event)?;
            true
        }
        Commands::Delete {
            slug,
            delete_events,
        } => {
            let result = service.delete_series(&ctx, &slug, DeleteOptions { delete_events });
            // Events processed before a partial failure are already gone; persist them.
            save_store(&store, &cli.store)?;
            print_json(&result?)?;
            false
        }
    };

    if mutated {
        save_store(&store, &cli.store)?;
    }
    Ok(())
}

fn save_store(store: &InMemoryStore, path: &Path) -> Result<()> {
    store
        .save(path)
        .with_context(|| format!("Failed to save store: {}", path.display()))?;
    info!(path = %path.display(), "saved store");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SeriesConfig> {
    let Some(path) = path else {
        return Ok(SeriesConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: SeriesConfig = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    debug!(path = %path.display(), ?config, "loaded config");
    Ok(config)
}

/// A rule given either as RRULE text or as its JSON object form.
fn parse_rule(raw: &str) -> Result<RecurrenceRule> {
    let raw = raw.trim();
    if raw.starts_with('{') {
        let rule: RecurrenceRule =
            serde_json::from_str(raw).context("Failed to parse rule JSON")?;
        rule.validate()?;
        Ok(rule)
    } else {
        Ok(RecurrenceRule::from_rrule_str(raw)?)
    }
}

fn parse_instant(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid RFC 3339 instant: {}", raw))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
