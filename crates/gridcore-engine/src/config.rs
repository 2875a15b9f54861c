//! Engine-wide configuration.

use chrono::{DateTime, Utc};

/// Tunables for the recompute engine and action pipeline.
///
/// A single `Default`-able struct threaded through the engine rather than ambient globals
/// (spec 9, "Global state -> explicit engine context").
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// If true, "engine not making progress" (spec 4.4 step 5) panics, treating an engine-bug
    /// condition as a hard failure. If false, it is returned as `GridError::EngineProgress` for
    /// the host to handle.
    pub progress_guard_panics: bool,

    /// Prefix used to namespace lookup index nodes so the scheduler's canonical sort order
    /// (spec 4.4 step 4: "lookup nodes first") can recognize them. Configurable only so tests
    /// can use a distinct namespace; production code should leave this at the default.
    pub lookup_node_prefix: &'static str,

    /// Case sensitivity for table id comparisons during schema lookups.
    pub case_sensitive_table_ids: bool,

    /// When set, trigger formulas and any formula reading "now" see this fixed instant instead
    /// of the system clock, for reproducible tests of time-dependent trigger formulas.
    pub deterministic_clock: Option<DateTime<Utc>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            progress_guard_panics: true,
            lookup_node_prefix: "#lookup",
            case_sensitive_table_ids: true,
            deterministic_clock: None,
        }
    }
}

impl EngineConfig {
    pub fn now(&self) -> DateTime<Utc> {
        self.deterministic_clock.unwrap_or_else(Utc::now)
    }
}
