//! Deaths: counts per-player deaths per pull, with an optional filter
//! on a specific killing ability ("Oblivion") that only counts the
//! death if a flagged precursor debuff landed on the player recently
//! enough to call it avoidable.

use super::{empty_row, events_by_pull, AnalyzerResult, MetricValue, PlayerResult};
use crate::error::Result;
use crate::models::{EventType, ReportSnapshot};
use std::collections::BTreeMap;

const OBLIVION_ABILITY: &str = "Oblivion";
const DEFAULT_RECENT_WINDOW_MS: i64 = 8_000;
const DEFAULT_FLAGGED_ABILITIES: [&str; 3] = ["Airborne", "Fists of the Voidlord", "Devour"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObliviionFilter {
    IncludeAll,
    ExcludeWithoutRecent,
    ExcludeAll,
}

#[derive(Debug, Clone)]
pub struct DeathsConfig {
    pub oblivion_filter: ObliviionFilter,
    pub recent_window_ms: Option<i64>,
    pub flagged_abilities: Option<Vec<String>>,
}

impl Default for DeathsConfig {
    fn default() -> Self {
        Self {
            oblivion_filter: ObliviionFilter::IncludeAll,
            recent_window_ms: None,
            flagged_abilities: None,
        }
    }
}

pub fn analyze(snapshot: &ReportSnapshot, config: &DeathsConfig) -> Result<AnalyzerResult> {
    let pull_count = snapshot.pull_count();
    let recent_window = config.recent_window_ms.unwrap_or(DEFAULT_RECENT_WINDOW_MS);
    let flagged: Vec<String> = config
        .flagged_abilities
        .clone()
        .unwrap_or_else(|| DEFAULT_FLAGGED_ABILITIES.iter().map(|s| s.to_string()).collect());

    let mut totals: BTreeMap<i64, u64> = BTreeMap::new();

    for (_, events) in events_by_pull(snapshot) {
        for (i, event) in events.iter().enumerate() {
            if event.event_type != EventType::Death {
                continue;
            }

            let is_oblivion = event.ability_name.as_deref() == Some(OBLIVION_ABILITY);
            if is_oblivion {
                match config.oblivion_filter {
                    ObliviionFilter::ExcludeAll => continue,
                    ObliviionFilter::ExcludeWithoutRecent => {
                        let has_recent_flag = events[..i].iter().any(|prior| {
                            prior.target_id == event.target_id
                                && event.timestamp_ms - prior.timestamp_ms <= recent_window
                                && prior
                                    .ability_name
                                    .as_deref()
                                    .map(|name| flagged.iter().any(|f| f == name))
                                    .unwrap_or(false)
                        });
                        if !has_recent_flag {
                            continue;
                        }
                    }
                    ObliviionFilter::IncludeAll => {}
                }
            }

            *totals.entry(event.target_id).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<PlayerResult> = totals
        .into_iter()
        .map(|(actor_id, deaths)| {
            let actor = snapshot.actor(actor_id);
            let mut row = empty_row(actor_id, actor.name, actor.role);
            row.metrics.insert(
                "deaths".to_string(),
                MetricValue::from_total(deaths as f64, pull_count),
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
            sub_type: "Rogue".into(),
            role: Role::Melee,
        }
    }

    fn debuff(ts: i64, target: i64, ability: &str) -> Event {
        Event {
            timestamp_ms: ts,
            event_type: EventType::Applydebuff,
            source_id: 999,
            target_id: target,
            ability_id: None,
            ability_name: Some(ability.to_string()),
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

    fn death(ts: i64, target: i64) -> Event {
        let mut event = debuff(ts, target, OBLIVION_ABILITY);
        event.event_type = EventType::Death;
        event
    }

    fn fight() -> Fight {
        Fight {
            id: 1,
            name: "Dimensius".into(),
            boss_id: Some(2),
            start_ms: 0,
            end_ms: 200_000,
            kill: false,
            phase_transitions: vec![],
        }
    }

    #[test]
    fn s4_exclude_without_recent_filters_unflagged_oblivion_deaths() {
        let mut actors = Map::new();
        actors.insert(10, player(10, "PlayerX"));
        actors.insert(11, player(11, "PlayerY"));

        let events = vec![
            debuff(95_000, 10, "Devour"),
            death(100_000, 10),
            death(100_000, 11),
        ];

        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![fight()],
            actors,
            events,
        };

        let config = DeathsConfig {
            oblivion_filter: ObliviionFilter::ExcludeWithoutRecent,
            recent_window_ms: Some(8_000),
            flagged_abilities: None,
        };

        let result = analyze(&snapshot, &config).unwrap();
        let names: Vec<&str> = result.entries.iter().map(|e| e.actor_name.as_str()).collect();
        assert!(names.contains(&"PlayerX"));
        assert!(!names.contains(&"PlayerY"));
    }

    #[test]
    fn exclude_all_drops_every_oblivion_death() {
        let mut actors = Map::new();
        actors.insert(10, player(10, "PlayerX"));
        let events = vec![death(100_000, 10)];
        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![fight()],
            actors,
            events,
        };
        let config = DeathsConfig {
            oblivion_filter: ObliviionFilter::ExcludeAll,
            ..Default::default()
        };
        let result = analyze(&snapshot, &config).unwrap();
        assert!(result.entries.is_empty());
    }

    #[test]
    fn non_oblivion_deaths_are_always_counted() {
        let mut actors = Map::new();
        actors.insert(10, player(10, "PlayerX"));
        let mut event = death(100_000, 10);
        event.ability_name = Some("Crushing Blow".to_string());
        let snapshot = ReportSnapshot {
            report_codes: vec![],
            fights: vec![fight()],
            actors,
            events: vec![event],
        };
        let config = DeathsConfig {
            oblivion_filter: ObliviionFilter::ExcludeAll,
            ..Default::default()
        };
        let result = analyze(&snapshot, &config).unwrap();
        assert_eq!(result.entries[0].metric("deaths").total, 1.0);
    }
}
