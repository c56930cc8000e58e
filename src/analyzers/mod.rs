//! Analyzers. Each submodule exposes a pure `analyze(snapshot,
//! config) -> Result<AnalyzerResult>` function: no I/O, no shared
//! mutable state, deterministic for a given `(ReportSnapshot, Config)`
//! pair. Validation failures (an out-of-range window, a nonexistent
//! ability) surface as `BadRequest` rather than panicking.

pub mod add_damage;
pub mod combined;
pub mod deaths;
pub mod ghost_misses;
pub mod hits;
pub mod phase1_mechanics;
pub mod phase_damage;

use crate::models::{Event, ReportSnapshot, Role};
use serde::Serialize;
use std::collections::BTreeMap;

/// A single named measurement for one player: a total across every
/// retained pull and the derived per-pull average.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MetricValue {
    pub total: f64,
    pub per_pull: f64,
}

impl MetricValue {
    pub fn from_total(total: f64, pull_count: u32) -> Self {
        let per_pull = if pull_count == 0 { 0.0 } else { total / pull_count as f64 };
        MetricValue { total, per_pull }
    }
}

/// One player's row in an analyzer's output table.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerResult {
    pub actor_id: i64,
    pub actor_name: String,
    pub role: Role,
    /// Metric name (e.g. `"hits"`, `"phase_1"`, `"fuckup_rate"`) to its
    /// total/per-pull value. Every analyzer publishes at least one
    /// metric under a name documented in its own module.
    pub metrics: BTreeMap<String, MetricValue>,
}

impl PlayerResult {
    pub fn metric(&self, name: &str) -> MetricValue {
        self.metrics.get(name).copied().unwrap_or_default()
    }
}

/// A diagnostic record of one ghost-miss grouping decision, attached
/// only to the ghost-miss analyzer's output.
#[derive(Debug, Clone, Serialize)]
pub struct GhostEvent {
    pub pull_index: u32,
    pub target_id: i64,
    pub timestamp_ms: i64,
    pub set_index: u32,
    pub counted: bool,
}

/// Shared output shape for every analyzer.
#[derive(Debug, Clone, Serialize, Default)]
pub struct AnalyzerResult {
    pub pull_count: u32,
    pub entries: Vec<PlayerResult>,
    /// Populated only by the ghost-miss analyzer; empty everywhere else.
    pub ghost_events: Vec<GhostEvent>,
}

impl AnalyzerResult {
    pub fn sorted_by_role(mut self) -> Self {
        self.entries
            .sort_by_key(|e| (e.role.priority(), e.actor_name.clone()));
        self
    }
}

/// Builds an empty row for `actor_id`/`actor_name`/`role`, to be filled
/// in by each analyzer's aggregation pass.
pub(crate) fn empty_row(actor_id: i64, actor_name: String, role: Role) -> PlayerResult {
    PlayerResult {
        actor_id,
        actor_name,
        role,
        metrics: BTreeMap::new(),
    }
}

/// Groups `snapshot.events` by fight id, the unique identifier of one
/// pull within a single snapshot. Each group's events stay in their
/// original (timestamp-ascending) order.
pub(crate) fn events_by_pull(snapshot: &ReportSnapshot) -> BTreeMap<u32, Vec<&Event>> {
    let mut groups: BTreeMap<u32, Vec<&Event>> = BTreeMap::new();
    for event in &snapshot.events {
        if let Some(fight_id) = event.fight_id {
            groups.entry(fight_id).or_default().push(event);
        }
    }
    groups
}
