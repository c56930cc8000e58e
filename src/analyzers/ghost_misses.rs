//! Ghost miss analyzer: counts applications of a debuff whose
//! precondition wasn't cleared in time, grouped into timing "sets" so a
//! flurry of re-applications within one mechanic window counts once
//! rather than once per tick.

use super::{empty_row, events_by_pull, AnalyzerResult, GhostEvent, MetricValue, PlayerResult};
use crate::error::{EngineError, Result};
use crate::models::{EventType, ReportSnapshot};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GhostMode {
    All,
    FirstPerPull,
    FirstPerSet,
}

#[derive(Debug, Clone)]
pub struct GhostMissConfig {
    pub ability_id: i64,
    pub mode: GhostMode,
    /// Gap, in milliseconds, that starts a new set. Defaults to 3000.
    pub set_window_ms: Option<u64>,
}

impl GhostMissConfig {
    fn window(&self) -> i64 {
        self.set_window_ms.unwrap_or(3000) as i64
    }
}

pub fn analyze(snapshot: &ReportSnapshot, config: &GhostMissConfig) -> Result<AnalyzerResult> {
    if config.ability_id <= 0 {
        return Err(EngineError::BadRequest("ability_id must be positive".into()));
    }

    let pull_count = snapshot.pull_count();
    let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
    let mut ghost_events = Vec::new();

    for (fight_id, events) in events_by_pull(snapshot) {
        let applications: Vec<_> = events
            .into_iter()
            .filter(|e| {
                matches!(e.event_type, EventType::Applydebuff) && e.ability_id == Some(config.ability_id)
            })
            .collect();

        // Group into per-target sets: a new set starts whenever the gap
        // from the previous event *for that target* exceeds the window.
        let mut last_seen: BTreeMap<i64, i64> = BTreeMap::new();
        let mut set_index: BTreeMap<i64, u32> = BTreeMap::new();

        for event in &applications {
            let gap_starts_new_set = match last_seen.get(&event.target_id) {
                Some(&previous) => event.timestamp_ms - previous > config.window(),
                None => true,
            };
            let current_set = if gap_starts_new_set {
                let next = set_index.get(&event.target_id).copied().unwrap_or(0) + 1;
                set_index.insert(event.target_id, next);
                next
            } else {
                *set_index.entry(event.target_id).or_insert(1)
            };
            last_seen.insert(event.target_id, event.timestamp_ms);

            let counted = match config.mode {
                GhostMode::All => true,
                GhostMode::FirstPerPull => current_set == 1 && gap_starts_new_set,
                GhostMode::FirstPerSet => gap_starts_new_set,
            };

            if counted {
                *totals.entry(event.target_id).or_insert(0) += 1;
            }

            ghost_events.push(GhostEvent {
                pull_index: event.pull_index.unwrap_or(0),
                target_id: event.target_id,
                timestamp_ms: event.timestamp_ms,
                set_index: current_set,
                counted,
            });
        }
        let _ = fight_id;
    }

    let mut entries: Vec<PlayerResult> = totals
        .into_iter()
        .map(|(actor_id, misses)| {
            let actor = snapshot.actor(actor_id);
            let mut row = empty_row(actor_id, actor.name, actor.role);
            row.metrics.insert(
                "ghost_misses".to_string(),
                MetricValue::from_total(misses as f64, pull_count),
            );
            row
        })
        .collect();
    entries.sort_by_key(|e| e.actor_id);

    Ok(AnalyzerResult {
        pull_count,
        entries,
        ghost_events,
    }
    .sorted_by_role())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, ActorType, Event, Fight, Role};
    use std::collections::BTreeMap as Map;

    fn actor(id: i64, name: &str) -> Actor {
        Actor {
            id,
            name: name.to_string(),
            actor_type: ActorType::Player,
            sub_type: "Priest".into(),
            role: Role::Healer,
        }
    }

    fn ghost_application(ts: i64, target: i64) -> Event {
        Event {
            timestamp_ms: 100_000 + ts,
            event_type: EventType::Applydebuff,
            source_id: 999,
            target_id: target,
            ability_id: Some(1224737),
            ability_name: Some("Ghost".into()),
            amount: 0,
            mitigated: 0,
            overkill: 0,
            hit_type: None,
            extra: Map::new(),
            fight_id: Some(1),
            pull_index: Some(1),
            phase_id: Some(1),
            offset_from_pull_start_ms: Some(ts),
            sequence: 0,
        }
    }

    fn snapshot_with(events: Vec<Event>) -> ReportSnapshot {
        let mut actors = Map::new();
        actors.insert(10, actor(10, "PlayerA"));
        ReportSnapshot {
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
            events,
        }
    }

    #[test]
    fn s2_first_per_set_counts_two_sets() {
        let events = vec![
            ghost_application(1000, 10),
            ghost_application(1200, 10),
            ghost_application(4500, 10),
        ];
        let snapshot = snapshot_with(events);
        let config = GhostMissConfig {
            ability_id: 1224737,
            mode: GhostMode::FirstPerSet,
            set_window_ms: Some(3000),
        };
        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("ghost_misses").total, 2.0);
    }

    #[test]
    fn all_mode_counts_every_application() {
        let events = vec![
            ghost_application(1000, 10),
            ghost_application(1200, 10),
            ghost_application(4500, 10),
        ];
        let snapshot = snapshot_with(events);
        let config = GhostMissConfig {
            ability_id: 1224737,
            mode: GhostMode::All,
            set_window_ms: Some(3000),
        };
        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("ghost_misses").total, 3.0);
    }

    #[test]
    fn first_per_pull_counts_exactly_one() {
        let events = vec![
            ghost_application(1000, 10),
            ghost_application(1200, 10),
            ghost_application(4500, 10),
        ];
        let snapshot = snapshot_with(events);
        let config = GhostMissConfig {
            ability_id: 1224737,
            mode: GhostMode::FirstPerPull,
            set_window_ms: Some(3000),
        };
        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("ghost_misses").total, 1.0);
    }
}
