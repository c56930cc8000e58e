//! Combined fuck-ups: runs the hit counter and ghost-miss analyzers
//! over the same snapshot and merges their per-player rows into one
//! table, adding a `fuckup_rate` metric.

use super::{hits, ghost_misses, AnalyzerResult, MetricValue, PlayerResult};
use crate::error::Result;
use crate::models::ReportSnapshot;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct CombinedConfig {
    pub hits: hits::HitCounterConfig,
    pub ghosts: ghost_misses::GhostMissConfig,
}

pub fn analyze(snapshot: &ReportSnapshot, config: &CombinedConfig) -> Result<AnalyzerResult> {
    let hit_result = hits::analyze(snapshot, &config.hits)?;
    let ghost_result = ghost_misses::analyze(snapshot, &config.ghosts)?;
    let pull_count = snapshot.pull_count();

    let mut rows: BTreeMap<i64, PlayerResult> = BTreeMap::new();
    for entry in hit_result.entries {
        rows.insert(entry.actor_id, entry);
    }
    for entry in ghost_result.entries {
        rows.entry(entry.actor_id)
            .and_modify(|row| row.metrics.extend(entry.metrics.clone()))
            .or_insert(entry);
    }

    for row in rows.values_mut() {
        let hits_total = row.metric("hits").total;
        let ghosts_total = row.metric("ghost_misses").total;
        let fuckup_rate = if pull_count == 0 {
            0.0
        } else {
            (hits_total + ghosts_total) / pull_count as f64
        };
        row.metrics.insert(
            "fuckup_rate".to_string(),
            MetricValue {
                total: hits_total + ghosts_total,
                per_pull: fuckup_rate,
            },
        );
    }

    let mut entries: Vec<PlayerResult> = rows.into_values().collect();
    entries.sort_by_key(|e| e.actor_id);

    Ok(AnalyzerResult {
        pull_count,
        entries,
        ghost_events: ghost_result.ghost_events,
    }
    .sorted_by_role())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::ghost_misses::GhostMode;
    use crate::models::{Actor, ActorType, Event, EventType, Fight, Role};
    use std::collections::BTreeMap as Map;

    #[test]
    fn fuckup_rate_sums_hits_and_ghost_misses_over_pulls() {
        let mut actors = Map::new();
        actors.insert(
            10,
            Actor {
                id: 10,
                name: "PlayerA".into(),
                actor_type: ActorType::Player,
                sub_type: "Warrior".into(),
                role: Role::Melee,
            },
        );

        let hit_event = Event {
            timestamp_ms: 110_000,
            event_type: EventType::Damage,
            source_id: 999,
            target_id: 10,
            ability_id: Some(1227472),
            ability_name: Some("Slash".into()),
            amount: 1,
            mitigated: 0,
            overkill: 0,
            hit_type: None,
            extra: Map::new(),
            fight_id: Some(1),
            pull_index: Some(1),
            phase_id: Some(1),
            offset_from_pull_start_ms: Some(10_000),
            sequence: 0,
        };
        let mut ghost_event = hit_event.clone();
        ghost_event.event_type = EventType::Applydebuff;
        ghost_event.ability_id = Some(1224737);
        ghost_event.timestamp_ms = 111_000;
        ghost_event.offset_from_pull_start_ms = Some(11_000);

        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![Fight {
                id: 1,
                name: "Nexus-King".into(),
                boss_id: Some(1),
                start_ms: 100_000,
                end_ms: 200_000,
                kill: false,
                phase_transitions: vec![],
            }],
            actors,
            events: vec![hit_event, ghost_event],
        };

        let config = CombinedConfig {
            hits: hits::HitCounterConfig {
                ability_id: 1227472,
                first_hit_only: false,
                ignore_after_deaths: None,
                ignore_final_seconds: None,
            },
            ghosts: ghost_misses::GhostMissConfig {
                ability_id: 1224737,
                mode: GhostMode::All,
                set_window_ms: None,
            },
        };

        let result = analyze(&snapshot, &config).unwrap();
        let row = &result.entries[0];
        assert_eq!(row.metric("hits").total, 1.0);
        assert_eq!(row.metric("ghost_misses").total, 1.0);
        assert_eq!(row.metric("fuckup_rate").total, 2.0);
        assert_eq!(row.metric("fuckup_rate").per_pull, 2.0);
    }
}
