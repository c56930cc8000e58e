//! Multi-report merger. Combines N independently fetched
//! [`ReportSnapshot`]s into one virtual snapshot so analyzers can treat
//! several raid nights as a single combined sample, without knowing
//! they're looking at more than one report.

use crate::models::{Actor, Event, Fight, ReportSnapshot};
use std::collections::{BTreeMap, HashMap};

/// Merges `snapshots` in admission order. Actor identity collapses by
/// `name` (first occurrence wins on role/class conflicts); fight ids
/// are renumbered globally; `pull_index` is renumbered per fight name
/// across the whole merged set, preserving each report's internal
/// ordering. Event order is the concatenation of each report's event
/// stream, in admission order — not re-sorted by timestamp, since
/// pulls from different reports have no meaningful shared clock.
pub fn merge_snapshots(snapshots: Vec<ReportSnapshot>) -> ReportSnapshot {
    let mut merged_actors: BTreeMap<i64, Actor> = BTreeMap::new();
    let mut name_to_merged_id: HashMap<String, i64> = HashMap::new();
    let mut next_actor_id = 1i64;
    let mut actor_id_maps: Vec<HashMap<i64, i64>> = Vec::with_capacity(snapshots.len());

    for snapshot in &snapshots {
        let mut id_map = HashMap::with_capacity(snapshot.actors.len());
        for (&orig_id, actor) in &snapshot.actors {
            let merged_id = *name_to_merged_id.entry(actor.name.clone()).or_insert_with(|| {
                let id = next_actor_id;
                next_actor_id += 1;
                id
            });
            merged_actors.entry(merged_id).or_insert_with(|| Actor {
                id: merged_id,
                ..actor.clone()
            });
            id_map.insert(orig_id, merged_id);
        }
        actor_id_maps.push(id_map);
    }

    let mut merged_fights: Vec<Fight> = Vec::new();
    let mut fight_id_maps: Vec<HashMap<u32, u32>> = Vec::with_capacity(snapshots.len());
    let mut next_fight_id = 1u32;

    for snapshot in &snapshots {
        let mut id_map = HashMap::with_capacity(snapshot.fights.len());
        let mut report_fights: Vec<&Fight> = snapshot.fights.iter().collect();
        report_fights.sort_by_key(|f| f.start_ms);
        for fight in report_fights {
            let new_id = next_fight_id;
            next_fight_id += 1;
            id_map.insert(fight.id, new_id);
            merged_fights.push(Fight {
                id: new_id,
                ..fight.clone()
            });
        }
        fight_id_maps.push(id_map);
    }

    let mut pull_counters: HashMap<String, u32> = HashMap::new();
    let mut pull_index_by_fight_id: HashMap<u32, u32> = HashMap::new();
    for fight in &merged_fights {
        let counter = pull_counters.entry(fight.name.clone()).or_insert(0);
        *counter += 1;
        pull_index_by_fight_id.insert(fight.id, *counter);
    }

    let mut merged_events = Vec::new();
    let mut sequence = 0u64;
    for (report_index, snapshot) in snapshots.iter().enumerate() {
        let actor_ids = &actor_id_maps[report_index];
        let fight_ids = &fight_id_maps[report_index];
        for event in &snapshot.events {
            let mut merged_event: Event = event.clone();
            merged_event.source_id = actor_ids.get(&event.source_id).copied().unwrap_or(event.source_id);
            merged_event.target_id = actor_ids.get(&event.target_id).copied().unwrap_or(event.target_id);
            if let Some(original_fight_id) = event.fight_id {
                if let Some(&new_fight_id) = fight_ids.get(&original_fight_id) {
                    merged_event.fight_id = Some(new_fight_id);
                    merged_event.pull_index = pull_index_by_fight_id.get(&new_fight_id).copied();
                }
            }
            merged_event.sequence = sequence;
            sequence += 1;
            merged_events.push(merged_event);
        }
    }

    let report_codes = snapshots
        .into_iter()
        .flat_map(|s| s.report_codes)
        .collect();

    ReportSnapshot {
        report_codes,
        fights: merged_fights,
        actors: merged_actors,
        events: merged_events,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Actor, ActorType, EventType, Fight, Role};
    use std::collections::BTreeMap as Map;

    fn fight(id: u32, start: i64) -> Fight {
        Fight {
            id,
            name: "Nexus-King".into(),
            boss_id: Some(1),
            start_ms: start,
            end_ms: start + 60_000,
            kill: false,
            phase_transitions: vec![],
        }
    }

    fn player(id: i64, name: &str) -> Actor {
        Actor {
            id,
            name: name.to_string(),
            actor_type: ActorType::Player,
            sub_type: "Warrior".into(),
            role: Role::Melee,
        }
    }

    fn damage_event(fight_id: u32, source: i64) -> Event {
        Event {
            timestamp_ms: 0,
            event_type: EventType::Damage,
            source_id: source,
            target_id: 500,
            ability_id: Some(1),
            ability_name: None,
            amount: 100,
            mitigated: 0,
            overkill: 0,
            hit_type: None,
            extra: Map::new(),
            fight_id: Some(fight_id),
            pull_index: Some(1),
            phase_id: Some(1),
            offset_from_pull_start_ms: Some(0),
            sequence: 0,
        }
    }

    #[test]
    fn s7_pull_count_sums_across_reports() {
        let mut actors_a = Map::new();
        actors_a.insert(10, player(10, "PlayerP"));
        let report_a = ReportSnapshot {
            report_codes: vec![crate::models::ReportCode::parse("aaa").unwrap()],
            fights: vec![fight(1, 0), fight(2, 60_000), fight(3, 120_000)],
            actors: actors_a,
            events: vec![damage_event(1, 10), damage_event(2, 10), damage_event(3, 10)],
        };

        let mut actors_b = Map::new();
        actors_b.insert(20, player(20, "PlayerP"));
        let report_b = ReportSnapshot {
            report_codes: vec![crate::models::ReportCode::parse("bbb").unwrap()],
            fights: vec![fight(1, 0), fight(2, 60_000), fight(3, 120_000)],
            actors: actors_b,
            events: vec![damage_event(1, 20), damage_event(2, 20), damage_event(3, 20)],
        };

        let merged = merge_snapshots(vec![report_a, report_b]);
        assert_eq!(merged.pull_count(), 6);
        assert_eq!(merged.report_codes.len(), 2);

        // Same-named actors from different reports collapse to one entry.
        assert_eq!(merged.actors.len(), 1);

        let total_damage: i64 = merged.events.iter().map(|e| e.amount).sum();
        assert_eq!(total_damage, 600);
    }

    #[test]
    fn pull_indices_continue_across_report_boundary() {
        let mut actors_a = Map::new();
        actors_a.insert(10, player(10, "PlayerP"));
        let report_a = ReportSnapshot {
            report_codes: vec![],
            fights: vec![fight(1, 0)],
            actors: actors_a,
            events: vec![damage_event(1, 10)],
        };
        let mut actors_b = Map::new();
        actors_b.insert(10, player(10, "PlayerP"));
        let report_b = ReportSnapshot {
            report_codes: vec![],
            fights: vec![fight(1, 0)],
            actors: actors_b,
            events: vec![damage_event(1, 10)],
        };

        let merged = merge_snapshots(vec![report_a, report_b]);
        let pull_indices: Vec<u32> = merged.events.iter().filter_map(|e| e.pull_index).collect();
        assert_eq!(pull_indices, vec![1, 2]);
    }
}
