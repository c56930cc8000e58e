//! Event normalizer.
//!
//! Takes the raw actor roster, retained fights, and a flat (not yet
//! fight-scoped) event stream and derives the fields a snapshot needs
//! but a raw event page never carries: `fight_id`, `pull_index`,
//! `phase_id`, and `offset_from_pull_start_ms`. Also guarantees that
//! every `source_id`/`target_id` resolves to exactly one `Actor` entry
//! by materializing synthetic `Unknown-<id>` actors for anything the
//! master data didn't cover.

use crate::models::{Actor, Event, Fight};
use std::collections::BTreeMap;

/// Counts of events dropped because their timestamp fell outside every
/// retained fight's window. Exposed for diagnostics, not part of the
/// public result shape.
#[derive(Debug, Default, Clone, Copy)]
pub struct NormalizationStats {
    pub dropped_outside_fight: u64,
}

/// Assigns each retained fight a 1-based pull index, numbering fights
/// sharing a `name` in ascending `start_ms` order.
pub fn assign_pull_indices(fights: &[Fight]) -> BTreeMap<u32, u32> {
    let mut ordered: Vec<&Fight> = fights.iter().collect();
    ordered.sort_by_key(|f| f.start_ms);

    let mut counts: BTreeMap<String, u32> = BTreeMap::new();
    let mut pull_index_by_fight_id = BTreeMap::new();
    for fight in ordered {
        let counter = counts.entry(fight.name.clone()).or_insert(0);
        *counter += 1;
        pull_index_by_fight_id.insert(fight.id, *counter);
    }
    pull_index_by_fight_id
}

/// Normalizes `events` in place against `fights`, and returns the full
/// actor map (master actors plus any synthetic placeholders the event
/// stream required).
pub fn normalize(
    mut events: Vec<Event>,
    fights: &[Fight],
    mut actors: BTreeMap<i64, Actor>,
) -> (Vec<Event>, BTreeMap<i64, Actor>, NormalizationStats) {
    let pull_index_by_fight_id = assign_pull_indices(fights);
    let mut stats = NormalizationStats::default();

    let mut sorted_fights: Vec<&Fight> = fights.iter().collect();
    sorted_fights.sort_by_key(|f| f.start_ms);

    let mut kept = Vec::with_capacity(events.len());
    for mut event in events.drain(..) {
        let Some(fight) = sorted_fights
            .iter()
            .find(|f| event.timestamp_ms >= f.start_ms && event.timestamp_ms <= f.end_ms)
        else {
            stats.dropped_outside_fight += 1;
            continue;
        };

        event.fight_id = Some(fight.id);
        event.pull_index = pull_index_by_fight_id.get(&fight.id).copied();
        event.phase_id = Some(fight.phase_at(event.timestamp_ms));
        event.offset_from_pull_start_ms = Some(event.timestamp_ms - fight.start_ms);

        ensure_actor(&mut actors, event.source_id);
        ensure_actor(&mut actors, event.target_id);

        kept.push(event);
    }

    kept.sort_by(|a, b| {
        (a.timestamp_ms, a.source_id, a.sequence).cmp(&(b.timestamp_ms, b.source_id, b.sequence))
    });

    (kept, actors, stats)
}

fn ensure_actor(actors: &mut BTreeMap<i64, Actor>, id: i64) {
    actors.entry(id).or_insert_with(|| Actor::unknown(id));
}

/// Stable merge of two already-sorted event pages by `(timestamp_ms,
/// source_id)`, preserving relative order of equal keys. Used to combine
/// two ability-filtered streams into one page order without re-sorting
/// the whole thing.
pub fn stable_merge_by_timestamp(a: Vec<Event>, b: Vec<Event>) -> Vec<Event> {
    let mut merged = Vec::with_capacity(a.len() + b.len());
    let mut ia = a.into_iter().peekable();
    let mut ib = b.into_iter().peekable();
    loop {
        match (ia.peek(), ib.peek()) {
            (Some(x), Some(y)) => {
                if x.timestamp_ms <= y.timestamp_ms {
                    merged.push(ia.next().unwrap());
                } else {
                    merged.push(ib.next().unwrap());
                }
            }
            (Some(_), None) => merged.push(ia.next().unwrap()),
            (None, Some(_)) => merged.push(ib.next().unwrap()),
            (None, None) => break,
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActorType, EventType, PhaseTransition, Role};
    use std::collections::BTreeMap;

    fn fight(id: u32, name: &str, start: i64, end: i64) -> Fight {
        Fight {
            id,
            name: name.to_string(),
            boss_id: Some(1),
            start_ms: start,
            end_ms: end,
            kill: id % 2 == 0,
            phase_transitions: vec![PhaseTransition { id: 1, start_ms: start }],
        }
    }

    fn event(ts: i64, source: i64, target: i64, seq: u64) -> Event {
        Event {
            timestamp_ms: ts,
            event_type: EventType::Damage,
            source_id: source,
            target_id: target,
            ability_id: Some(1227472),
            ability_name: Some("Test Ability".into()),
            amount: 100,
            mitigated: 0,
            overkill: 0,
            hit_type: None,
            extra: BTreeMap::new(),
            fight_id: None,
            pull_index: None,
            phase_id: None,
            offset_from_pull_start_ms: None,
            sequence: seq,
        }
    }

    #[test]
    fn pull_indices_number_same_name_fights_ascending() {
        let fights = vec![
            fight(2, "Nexus-King", 200_000, 300_000),
            fight(1, "Nexus-King", 100_000, 200_000),
            fight(3, "Other Boss", 50_000, 60_000),
        ];
        let indices = assign_pull_indices(&fights);
        assert_eq!(indices[&1], 1);
        assert_eq!(indices[&2], 2);
        assert_eq!(indices[&3], 1);
    }

    #[test]
    fn events_outside_every_fight_are_dropped() {
        let fights = vec![fight(1, "Nexus-King", 100_000, 200_000)];
        let events = vec![event(50_000, 10, 20, 0), event(150_000, 10, 20, 1)];
        let (kept, _, stats) = normalize(events, &fights, BTreeMap::new());
        assert_eq!(kept.len(), 1);
        assert_eq!(stats.dropped_outside_fight, 1);
        assert_eq!(kept[0].fight_id, Some(1));
        assert_eq!(kept[0].pull_index, Some(1));
    }

    #[test]
    fn unknown_actors_become_synthetic_entries() {
        let fights = vec![fight(1, "Nexus-King", 0, 200_000)];
        let events = vec![event(1_000, 99, 98, 0)];
        let mut actors = BTreeMap::new();
        actors.insert(
            99,
            Actor {
                id: 99,
                name: "Known".into(),
                actor_type: ActorType::Player,
                sub_type: "Warrior".into(),
                role: Role::Melee,
            },
        );
        let (_, actors, _) = normalize(events, &fights, actors);
        assert_eq!(actors.len(), 2);
        assert_eq!(actors[&98].name, "Unknown-98");
    }

    #[test]
    fn stable_merge_preserves_order_on_ties() {
        let a = vec![event(100, 1, 2, 0), event(300, 1, 2, 1)];
        let b = vec![event(100, 1, 2, 2), event(200, 1, 2, 3)];
        let merged = stable_merge_by_timestamp(a, b);
        let timestamps: Vec<i64> = merged.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(timestamps, vec![100, 100, 200, 300]);
        // On a tie, the left stream's event stays first.
        assert_eq!(merged[0].sequence, 0);
    }
}
