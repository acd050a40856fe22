//! Service configuration.

use recurrence_engine::ExpansionLimits;
use serde::{Deserialize, Serialize};

/// Tunables for [`crate::EventSeriesService`]. Every field has a default, so a
/// partial TOML table is enough:
///
/// ```toml
/// default_occurrence_count = 20
///
/// [limits]
/// max_occurrences = 2000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeriesConfig {
    /// Listing size when the caller gives no `count`.
    pub default_occurrence_count: usize,
    /// Upper bound on a caller-supplied `count`.
    pub max_occurrence_count: usize,
    pub limits: ExpansionLimits,
}

impl Default for SeriesConfig {
    fn default() -> Self {
        Self {
            default_occurrence_count: 10,
            max_occurrence_count: 500,
            limits: ExpansionLimits::default(),
        }
    }
}
