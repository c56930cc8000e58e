//! Add damage: sums each player's damage done to a named adjunct
//! spawn (e.g. "Living Mass"), optionally discounting the very first
//! spawn cluster of the pull so a mechanic that dumps a predictable
//! opening batch of adds doesn't skew a player's average.

use super::{empty_row, events_by_pull, AnalyzerResult, MetricValue, PlayerResult};
use crate::error::{EngineError, Result};
use crate::models::{EventType, ReportSnapshot};
use std::collections::{BTreeMap, BTreeSet};

const FIRST_SET_WINDOW_MS: i64 = 5_000;
const FIRST_SET_TARGET_COUNT: usize = 6;

#[derive(Debug, Clone)]
pub struct AddDamageConfig {
    pub add_name: String,
    pub ignore_first_add_set: bool,
}

impl Default for AddDamageConfig {
    fn default() -> Self {
        Self {
            add_name: "Living Mass".to_string(),
            ignore_first_add_set: false,
        }
    }
}

pub fn analyze(snapshot: &ReportSnapshot, config: &AddDamageConfig) -> Result<AnalyzerResult> {
    if config.add_name.trim().is_empty() {
        return Err(EngineError::BadRequest("add_name must not be empty".into()));
    }

    let pull_count = snapshot.pull_count();
    let mut totals: BTreeMap<i64, f64> = BTreeMap::new();

    for (_, events) in events_by_pull(snapshot) {
        let fight_start = events
            .first()
            .and_then(|e| e.fight_id)
            .and_then(|id| snapshot.fight(id))
            .map(|f| f.start_ms)
            .unwrap_or(0);

        let ignored_targets: BTreeSet<i64> = if config.ignore_first_add_set {
            let mut ids = Vec::new();
            for event in &events {
                if event.timestamp_ms - fight_start > FIRST_SET_WINDOW_MS {
                    break;
                }
                if matches_add(snapshot, event.target_id, &config.add_name) && !ids.contains(&event.target_id) {
                    ids.push(event.target_id);
                    if ids.len() == FIRST_SET_TARGET_COUNT {
                        break;
                    }
                }
            }
            ids.into_iter().collect()
        } else {
            BTreeSet::new()
        };

        for event in events {
            if event.event_type != EventType::Damage {
                continue;
            }
            if !matches_add(snapshot, event.target_id, &config.add_name) {
                continue;
            }
            if ignored_targets.contains(&event.target_id) {
                continue;
            }
            *totals.entry(event.source_id).or_insert(0.0) += event.amount as f64;
        }
    }

    let mut entries: Vec<PlayerResult> = totals
        .into_iter()
        .map(|(actor_id, total)| {
            let actor = snapshot.actor(actor_id);
            let mut row = empty_row(actor_id, actor.name, actor.role);
            row.metrics.insert(
                "add_damage".to_string(),
                MetricValue::from_total(total, pull_count),
            );
            row
        })
        .collect();
    entries.sort_by_key(|e| e.actor_id);

    Ok(AnalyzerResult {
        pull_count,
        entries,
        ghost_events: vec![],
    }
    .sorted_by_role())
}

fn matches_add(snapshot: &ReportSnapshot, actor_id: i64, add_name: &str) -> bool {
    snapshot.actor(actor_id).name == add_name
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, ActorType, Event, Fight, Role};
    use std::collections::BTreeMap as Map;

    fn player(id: i64, name: &str) -> Actor {
        Actor {
            id,
            name: name.to_string(),
            actor_type: ActorType::Player,
            sub_type: "Mage".into(),
            role: Role::Ranged,
        }
    }

    fn add(id: i64) -> Actor {
        Actor {
            id,
            name: "Living Mass".to_string(),
            actor_type: ActorType::Npc,
            sub_type: "Add".into(),
            role: Role::Unknown,
        }
    }

    fn damage_event(ts: i64, target: i64) -> Event {
        Event {
            timestamp_ms: ts,
            event_type: EventType::Damage,
            source_id: 50,
            target_id: target,
            ability_id: Some(1),
            ability_name: None,
            amount: 100,
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

    #[test]
    fn ignores_first_spawn_cluster_when_configured() {
        let mut actors = Map::new();
        actors.insert(50, player(50, "PlayerA"));
        for i in 0..7 {
            actors.insert(100 + i, add(100 + i));
        }

        let mut events: Vec<Event> = (0..6).map(|i| damage_event(1_000, 100 + i)).collect();
        events.push(damage_event(20_000, 106));

        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![Fight {
                id: 1,
                name: "Nexus-King".into(),
                boss_id: Some(1),
                start_ms: 0,
                end_ms: 100_000,
                kill: true,
                phase_transitions: vec![],
            }],
            actors,
            events,
        };

        let config = AddDamageConfig {
            add_name: "Living Mass".into(),
            ignore_first_add_set: true,
        };

        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("add_damage").total, 100.0);
    }

    #[test]
    fn without_filter_all_add_damage_counts() {
        let mut actors = Map::new();
        actors.insert(50, player(50, "PlayerA"));
        actors.insert(100, add(100));

        let events = vec![damage_event(1_000, 100), damage_event(2_000, 100)];

        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![Fight {
                id: 1,
                name: "Nexus-King".into(),
                boss_id: Some(1),
                start_ms: 0,
                end_ms: 100_000,
                kill: true,
                phase_transitions: vec![],
            }],
            actors,
            events,
        };

        let config = AddDamageConfig::default();
        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("add_damage").total, 200.0);
    }
}
