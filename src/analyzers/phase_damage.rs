//! Phase damage/healing: per-player throughput broken down by fight
//! phase, picking damage or healing per player based on role so tanks
//! and DPS get a damage column while healers get a healing column.

use super::{empty_row, events_by_pull, AnalyzerResult, MetricValue, PlayerResult};
use crate::error::{EngineError, Result};
use crate::models::{EventType, ReportSnapshot, Role};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseProfile {
    Nexus,
    Dimensius,
}

impl PhaseProfile {
    fn label(self, phase_id: u32) -> String {
        match self {
            PhaseProfile::Nexus => match phase_id {
                1 => "P1".to_string(),
                2 => "P2".to_string(),
                other => format!("P{other}"),
            },
            PhaseProfile::Dimensius => match phase_id {
                1 => "Opening".to_string(),
                2 => "Transition".to_string(),
                3 => "Finale".to_string(),
                other => format!("P{other}"),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseSelector {
    Phase(u32),
    Full,
}

#[derive(Debug, Clone)]
pub struct PhaseDamageConfig {
    pub phase_profile: PhaseProfile,
    pub phases: Vec<PhaseSelector>,
}

fn metric_event_type(role: Role) -> EventType {
    match role {
        Role::Healer => EventType::Heal,
        _ => EventType::Damage,
    }
}

pub fn analyze(snapshot: &ReportSnapshot, config: &PhaseDamageConfig) -> Result<AnalyzerResult> {
    if config.phases.is_empty() {
        return Err(EngineError::BadRequest("phases must not be empty".into()));
    }

    let pull_count = snapshot.pull_count();
    let mut rows: BTreeMap<i64, PlayerResult> = BTreeMap::new();

    for (_, events) in events_by_pull(snapshot) {
        for event in events {
            if !matches!(event.event_type, EventType::Damage | EventType::Heal) {
                continue;
            }
            let actor = snapshot.actor(event.source_id);
            if metric_event_type(actor.role) != event.event_type {
                continue;
            }

            let row = rows
                .entry(event.source_id)
                .or_insert_with(|| empty_row(actor.id, actor.name.clone(), actor.role));

            for selector in &config.phases {
                let matches = match selector {
                    PhaseSelector::Full => true,
                    PhaseSelector::Phase(id) => event.phase_id == Some(*id),
                };
                if !matches {
                    continue;
                }
                let key = match selector {
                    PhaseSelector::Full => "full".to_string(),
                    PhaseSelector::Phase(id) => config.phase_profile.label(*id),
                };
                let entry = row.metrics.entry(key).or_insert(MetricValue::default());
                entry.total += event.amount as f64;
            }
        }
    }

    for row in rows.values_mut() {
        for value in row.metrics.values_mut() {
            *value = MetricValue::from_total(value.total, pull_count);
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, ActorType, Event, Fight, PhaseTransition};
    use std::collections::BTreeMap as Map;

    #[test]
    fn s3_healer_damage_split_by_phase() {
        let mut actors = Map::new();
        actors.insert(
            20,
            Actor {
                id: 20,
                name: "Heala".into(),
                actor_type: ActorType::Player,
                sub_type: "Priest".into(),
                role: Role::Healer,
            },
        );

        let heal_p1 = Event {
            timestamp_ms: 10_000,
            event_type: EventType::Heal,
            source_id: 20,
            target_id: 1,
            ability_id: Some(1),
            ability_name: None,
            amount: 1000,
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
        let mut heal_p2 = heal_p1.clone();
        heal_p2.timestamp_ms = 60_000;
        heal_p2.phase_id = Some(2);
        heal_p2.amount = 2000;
        heal_p2.offset_from_pull_start_ms = Some(60_000);

        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![Fight {
                id: 1,
                name: "Nexus-King".into(),
                boss_id: Some(1),
                start_ms: 0,
                end_ms: 100_000,
                kill: true,
                phase_transitions: vec![
                    PhaseTransition { id: 1, start_ms: 0 },
                    PhaseTransition { id: 2, start_ms: 45_000 },
                ],
            }],
            actors,
            events: vec![heal_p1, heal_p2],
        };

        let config = PhaseDamageConfig {
            phase_profile: PhaseProfile::Nexus,
            phases: vec![PhaseSelector::Phase(1), PhaseSelector::Phase(2)],
        };

        let result = analyze(&snapshot, &config).unwrap();
        let row = &result.entries[0];
        assert_eq!(row.metric("P1").total, 1000.0);
        assert_eq!(row.metric("P2").total, 2000.0);
        assert_eq!(result.pull_count, 1);
        assert_eq!(row.metric("P1").per_pull, 1000.0);
        assert_eq!(row.metric("P2").per_pull, 2000.0);
    }
}
