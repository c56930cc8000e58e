//! Phase-1 mechanics: a domain-specific combined analyzer bundling
//! three independent detections behind one `fuckup_rate`:
//! simultaneous-debuff overlaps, "early mass" pre-stacking, and raw
//! hits from a named avoidable ability. Each detection is counted
//! independently; a single mistake instant can trip more than one
//! metric at once, and that double-counting is intentional — each
//! metric answers a different question about the same moment.

use super::{empty_row, events_by_pull, AnalyzerResult, MetricValue, PlayerResult};
use crate::error::{EngineError, Result};
use crate::models::{EventType, ReportSnapshot};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct Phase1MechanicsConfig {
    pub overlap_ability_a: String,
    pub overlap_ability_b: String,
    pub avoidable_ability: String,
    /// Window, in seconds, within which "Excess Mass" collected before
    /// "Reverse Gravity" on the same player counts as early mass. Must
    /// fall within `[1, 15]`.
    pub early_mass_window_seconds: f64,
    pub detect_overlap: bool,
    pub detect_early_mass: bool,
    pub detect_avoidable_hits: bool,
}

impl Default for Phase1MechanicsConfig {
    fn default() -> Self {
        Self {
            overlap_ability_a: "Reverse Gravity".to_string(),
            overlap_ability_b: "Excess Mass".to_string(),
            avoidable_ability: "Gravity Crush".to_string(),
            early_mass_window_seconds: 8.0,
            detect_overlap: true,
            detect_early_mass: true,
            detect_avoidable_hits: true,
        }
    }
}

struct Debuff<'a> {
    target_id: i64,
    applied_at: i64,
    removed_at: i64,
    ability_name: &'a str,
}

pub fn analyze(snapshot: &ReportSnapshot, config: &Phase1MechanicsConfig) -> Result<AnalyzerResult> {
    if !(1.0..=15.0).contains(&config.early_mass_window_seconds) {
        return Err(EngineError::BadRequest(
            "early_mass_window_seconds must fall within [1, 15]".to_string(),
        ));
    }

    let pull_count = snapshot.pull_count();
    let mut rows: BTreeMap<i64, PlayerResult> = BTreeMap::new();

    for (_, events) in events_by_pull(snapshot) {
        let debuffs = track_debuff_windows(&events);

        if config.detect_overlap {
            for overlap in find_overlaps(&debuffs, &config.overlap_ability_a, &config.overlap_ability_b) {
                increment(snapshot, &mut rows, overlap, "overlapping_debuffs");
            }
        }

        if config.detect_early_mass {
            for target in find_early_mass(
                &debuffs,
                &config.overlap_ability_a,
                &config.overlap_ability_b,
                (config.early_mass_window_seconds * 1000.0) as i64,
            ) {
                increment(snapshot, &mut rows, target, "early_mass");
            }
        }

        if config.detect_avoidable_hits {
            for event in &events {
                if event.event_type == EventType::Damage
                    && event.ability_name.as_deref() == Some(config.avoidable_ability.as_str())
                {
                    increment(snapshot, &mut rows, event.target_id, "avoidable_hits");
                }
            }
        }
    }

    for row in rows.values_mut() {
        let mut enabled_total = 0.0;
        if config.detect_overlap {
            enabled_total += row.metric("overlapping_debuffs").total;
        }
        if config.detect_early_mass {
            enabled_total += row.metric("early_mass").total;
        }
        if config.detect_avoidable_hits {
            enabled_total += row.metric("avoidable_hits").total;
        }
        row.metrics.insert(
            "fuckup_rate".to_string(),
            MetricValue::from_total(enabled_total, pull_count),
        );
    }

    let mut entries: Vec<PlayerResult> = rows.into_values().collect();
    entries.sort_by_key(|e| e.actor_id);

    Ok(AnalyzerResult {
        pull_count,
        entries,
        ghost_events: vec![],
    }
    .sorted_by_role())
}

fn increment(snapshot: &ReportSnapshot, rows: &mut BTreeMap<i64, PlayerResult>, actor_id: i64, metric: &str) {
    let row = rows.entry(actor_id).or_insert_with(|| {
        let actor = snapshot.actor(actor_id);
        empty_row(actor.id, actor.name, actor.role)
    });
    let entry = row.metrics.entry(metric.to_string()).or_insert(MetricValue::default());
    entry.total += 1.0;
}

/// Builds `[applied, removed)` windows per target/ability pair from
/// apply/remove debuff events. A debuff applied but never explicitly
/// removed is treated as lasting until the end of the pull.
fn track_debuff_windows<'a>(events: &[&'a crate::models::Event]) -> Vec<Debuff<'a>> {
    let mut open: BTreeMap<(i64, &str), i64> = BTreeMap::new();
    let mut windows = Vec::new();

    for event in events {
        let Some(ability_name) = event.ability_name.as_deref() else {
            continue;
        };
        match event.event_type {
            EventType::Applydebuff => {
                open.insert((event.target_id, ability_name), event.timestamp_ms);
            }
            EventType::Removedebuff => {
                if let Some(applied_at) = open.remove(&(event.target_id, ability_name)) {
                    windows.push(Debuff {
                        target_id: event.target_id,
                        applied_at,
                        removed_at: event.timestamp_ms,
                        ability_name,
                    });
                }
            }
            _ => {}
        }
    }

    let pull_end = events.last().map(|e| e.timestamp_ms).unwrap_or(i64::MAX);
    for ((target_id, ability_name), applied_at) in open {
        windows.push(Debuff {
            target_id,
            applied_at,
            removed_at: pull_end,
            ability_name,
        });
    }

    windows
}

fn find_overlaps(debuffs: &[Debuff], ability_a: &str, ability_b: &str) -> Vec<i64> {
    let mut hits = Vec::new();
    for a in debuffs.iter().filter(|d| d.ability_name == ability_a) {
        for b in debuffs
            .iter()
            .filter(|d| d.ability_name == ability_b && d.target_id == a.target_id)
        {
            let overlaps = a.applied_at < b.removed_at && b.applied_at < a.removed_at;
            if overlaps {
                hits.push(a.target_id);
            }
        }
    }
    hits
}

/// Finds targets whose "Excess Mass" application started within
/// `window_ms` before a "Reverse Gravity" application landed on them.
fn find_early_mass(debuffs: &[Debuff], reverse_gravity: &str, excess_mass: &str, window_ms: i64) -> Vec<i64> {
    let mut hits = Vec::new();
    for gravity in debuffs.iter().filter(|d| d.ability_name == reverse_gravity) {
        let had_early_mass = debuffs.iter().any(|mass| {
            mass.ability_name == excess_mass
                && mass.target_id == gravity.target_id
                && mass.applied_at <= gravity.applied_at
                && gravity.applied_at - mass.applied_at <= window_ms
        });
        if had_early_mass {
            hits.push(gravity.target_id);
        }
    }
    hits
}
