//! Report fetcher. Pages `reportData.report.events` and pulls
//! `masterData`/`fights` into a fully materialized [`ReportSnapshot`].
//!
//! This module owns both the GraphQL document text and the
//! JSON-to-domain-type mapping so the upstream schema only has one place
//! to change.

use crate::error::{EngineError, Result};
use crate::graphql_client::GraphQlClient;
use crate::models::{
    Actor, ActorType, DataType, Event, EventType, Fight, FightFilter, PhaseTransition, Role,
    ReportCode, ReportSnapshot,
};
use crate::normalizer;
use crate::role_table;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument, warn};

const MASTER_DATA_QUERY: &str = r#"
query($code: String!) {
  reportData {
    report(code: $code) {
      title
      startTime
      endTime
      masterData {
        actors { id name type subType icon specs }
        abilities { gameID name }
      }
      fights {
        id
        name
        boss
        startTime
        endTime
        kill
        phaseTransitions { id startTime }
      }
    }
  }
}
"#;

const EVENTS_QUERY: &str = r#"
query($code: String!, $dataType: EventDataType!, $startTime: Float!, $endTime: Float!, $abilityID: Float) {
  reportData {
    report(code: $code) {
      events(dataType: $dataType, startTime: $startTime, endTime: $endTime, limit: 10000, abilityID: $abilityID) {
        data
        nextPageTimestamp
      }
    }
  }
}
"#;

const MAX_STALLED_OBSERVATIONS: u32 = 3;

/// Parameters for one report fetch.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub report_code: ReportCode,
    pub fight_filter: FightFilter,
    pub data_types: Vec<DataType>,
    /// Ability ids to apply as a server-side filter. Empty means no
    /// filter. More than one id triggers a paged fetch per ability
    /// followed by a stable timestamp merge of the resulting streams.
    pub ability_ids: Vec<i64>,
    /// Upper bound on page-fetch requests issued concurrently across
    /// all `(data_type, ability_id)` streams for this report.
    pub max_inflight: usize,
}

struct MasterData {
    actors: BTreeMap<i64, Actor>,
    fights: Vec<Fight>,
}

/// Fetches a complete, normalized [`ReportSnapshot`] for one report.
#[instrument(skip(client), fields(report_code = %request.report_code))]
pub async fn fetch_report(client: &GraphQlClient, request: &FetchRequest) -> Result<ReportSnapshot> {
    let master = fetch_master_data(client, &request.report_code).await?;
    let retained = retain_fights(master.fights, &request.fight_filter);

    if retained.is_empty() {
        debug!("no fights matched fight filter, returning empty snapshot");
        return Ok(ReportSnapshot {
            report_codes: vec![request.report_code.clone()],
            fights: vec![],
            actors: master.actors,
            events: vec![],
        });
    }

    let window_start = retained.iter().map(|f| f.start_ms).min().unwrap_or(0);
    let window_end = retained.iter().map(|f| f.end_ms).max().unwrap_or(0);

    // One `(data_type, ability_id)` pair per page-fetch stream. Streams
    // overlap their page requests up to `max_inflight`, matching the
    // worker pool's per-job concurrency bound instead of fetching each
    // stream fully before starting the next.
    let ability_slots: Vec<Option<i64>> = if request.ability_ids.is_empty() {
        vec![None]
    } else {
        request.ability_ids.iter().map(|id| Some(*id)).collect()
    };

    let tasks = request.data_types.iter().enumerate().flat_map(|(data_idx, data_type)| {
        let data_type = *data_type;
        ability_slots.iter().enumerate().map(move |(ability_idx, ability_id)| {
            (data_idx, ability_idx, data_type, *ability_id)
        })
    });

    let max_inflight = request.max_inflight.max(1);
    let mut streams: Vec<(usize, usize, Vec<Event>)> = stream::iter(tasks.map(|(data_idx, ability_idx, data_type, ability_id)| {
        let report_code = request.report_code.clone();
        async move {
            let events =
                fetch_events_paged(client, &report_code, data_type, ability_id, window_start, window_end).await?;
            Ok::<_, EngineError>((data_idx, ability_idx, events))
        }
    }))
    .buffer_unordered(max_inflight)
    .try_collect()
    .await?;
    streams.sort_by_key(|(data_idx, ability_idx, _)| (*data_idx, *ability_idx));

    let mut raw_events = Vec::new();
    let mut current_data_idx = None;
    let mut merged_for_data_type: Vec<Event> = Vec::new();
    for (data_idx, _, events) in streams {
        match current_data_idx {
            Some(idx) if idx == data_idx => {
                merged_for_data_type = normalizer::stable_merge_by_timestamp(merged_for_data_type, events);
            }
            _ => {
                if current_data_idx.is_some() {
                    raw_events.extend(std::mem::take(&mut merged_for_data_type));
                }
                current_data_idx = Some(data_idx);
                merged_for_data_type = events;
            }
        }
    }
    if current_data_idx.is_some() {
        raw_events.extend(merged_for_data_type);
    }

    for (i, event) in raw_events.iter_mut().enumerate() {
        event.sequence = i as u64;
    }

    let (events, actors, stats) = normalizer::normalize(raw_events, &retained, master.actors);
    if stats.dropped_outside_fight > 0 {
        debug!(
            dropped = stats.dropped_outside_fight,
            "events fell outside every retained fight window"
        );
    }

    Ok(ReportSnapshot {
        report_codes: vec![request.report_code.clone()],
        fights: retained,
        actors,
        events,
    })
}

async fn fetch_master_data(client: &GraphQlClient, report_code: &ReportCode) -> Result<MasterData> {
    let variables = json!({ "code": report_code.as_str() });
    let data = client.query(MASTER_DATA_QUERY, variables).await?;

    let report = data
        .pointer("/reportData/report")
        .filter(|v| !v.is_null())
        .ok_or_else(|| EngineError::ReportNotFound(report_code.to_string()))?;

    let actors = parse_actors(report.pointer("/masterData/actors"))?;
    let fights = parse_fights(report.get("fights"))?;

    Ok(MasterData { actors, fights })
}

fn parse_actors(value: Option<&Value>) -> Result<BTreeMap<i64, Actor>> {
    let arr = value
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Other(anyhow::anyhow!("masterData.actors missing or malformed")))?;

    let mut actors = BTreeMap::new();
    for raw in arr {
        let id = raw.get("id").and_then(Value::as_i64).ok_or_else(|| {
            EngineError::Other(anyhow::anyhow!("actor entry missing integer id"))
        })?;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let actor_type = match raw.get("type").and_then(Value::as_str) {
            Some("Player") => ActorType::Player,
            _ => ActorType::Npc,
        };
        let sub_type = raw
            .get("subType")
            .and_then(Value::as_str)
            .unwrap_or("Unknown")
            .to_string();
        let spec = raw
            .get("specs")
            .and_then(Value::as_array)
            .and_then(|specs| specs.first())
            .and_then(|s| s.get("spec"))
            .and_then(Value::as_str);
        let role = if actor_type == ActorType::Player {
            role_table::role_for(&sub_type, spec)
        } else {
            Role::Unknown
        };

        actors.insert(
            id,
            Actor {
                id,
                name,
                actor_type,
                sub_type,
                role,
            },
        );
    }
    Ok(actors)
}

fn parse_fights(value: Option<&Value>) -> Result<Vec<Fight>> {
    let arr = value
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Other(anyhow::anyhow!("fights missing or malformed")))?;

    let mut fights = Vec::with_capacity(arr.len());
    for raw in arr {
        let id = raw
            .get("id")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("fight entry missing integer id")))?
            as u32;
        let name = raw
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown Fight")
            .to_string();
        let boss_id = raw.get("boss").and_then(Value::as_u64).map(|v| v as u32);
        let start_ms = raw.get("startTime").and_then(Value::as_i64).unwrap_or(0);
        let end_ms = raw.get("endTime").and_then(Value::as_i64).unwrap_or(start_ms);
        let kill = raw.get("kill").and_then(Value::as_bool).unwrap_or(false);

        let phase_transitions = raw
            .get("phaseTransitions")
            .and_then(Value::as_array)
            .map(|arr| {
                let mut transitions: Vec<PhaseTransition> = arr
                    .iter()
                    .filter_map(|t| {
                        Some(PhaseTransition {
                            id: t.get("id")?.as_u64()? as u32,
                            start_ms: t.get("startTime")?.as_i64()?,
                        })
                    })
                    .collect();
                transitions.sort_by_key(|t| t.start_ms);
                transitions
            })
            .unwrap_or_default();

        fights.push(Fight {
            id,
            name,
            boss_id,
            start_ms,
            end_ms,
            kill,
            phase_transitions,
        });
    }
    Ok(fights)
}

fn retain_fights(fights: Vec<Fight>, filter: &FightFilter) -> Vec<Fight> {
    match filter {
        FightFilter::AllBosses => fights.into_iter().filter(|f| f.boss_id.is_some()).collect(),
        FightFilter::Boss(name) => {
            let wanted = name.to_lowercase();
            fights
                .into_iter()
                .filter(|f| f.name.to_lowercase() == wanted)
                .collect()
        }
    }
}

async fn fetch_events_paged(
    client: &GraphQlClient,
    report_code: &ReportCode,
    data_type: DataType,
    ability_id: Option<i64>,
    window_start: i64,
    window_end: i64,
) -> Result<Vec<Event>> {
    let mut events = Vec::new();
    let mut cursor = window_start;
    let mut identical_observations = 0u32;
    let mut previous_cursor: Option<i64> = None;

    loop {
        let variables = json!({
            "code": report_code.as_str(),
            "dataType": data_type_name(data_type),
            "startTime": cursor,
            "endTime": window_end,
            "abilityID": ability_id,
        });

        let data = client.query(EVENTS_QUERY, variables).await?;
        crate::metrics::record_pagination_page(data_type_name(data_type));
        let page = data
            .pointer("/reportData/report/events")
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("events page missing")))?;

        let rows = page.get("data").and_then(Value::as_array).cloned().unwrap_or_default();
        for row in &rows {
            if let Some(event) = parse_event(row) {
                events.push(event);
            }
        }

        let next = page.get("nextPageTimestamp").and_then(Value::as_i64);

        match next {
            None => break,
            Some(n) if n >= window_end => break,
            Some(n) => {
                if Some(n) == previous_cursor {
                    identical_observations += 1;
                    if identical_observations >= MAX_STALLED_OBSERVATIONS {
                        warn!(cursor = n, "pagination cursor stalled, aborting fetch");
                        crate::metrics::record_pagination_stalled();
                        return Err(EngineError::PaginationStalled {
                            observations: identical_observations,
                        });
                    }
                } else {
                    identical_observations = 0;
                }
                previous_cursor = Some(n);
                cursor = n;
            }
        }
    }

    Ok(events)
}

fn data_type_name(data_type: DataType) -> &'static str {
    match data_type {
        DataType::DamageDone => "DamageDone",
        DataType::DamageTaken => "DamageTaken",
        DataType::Healing => "Healing",
        DataType::Casts => "Casts",
        DataType::Deaths => "Deaths",
        DataType::Resources => "Resources",
        DataType::Buffs => "Buffs",
        DataType::Debuffs => "Debuffs",
    }
}

fn parse_event(row: &Value) -> Option<Event> {
    let timestamp_ms = row.get("timestamp")?.as_i64()?;
    let event_type = match row.get("type").and_then(Value::as_str) {
        Some("damage") => EventType::Damage,
        Some("heal") => EventType::Heal,
        Some("cast") => EventType::Cast,
        Some("applybuff") => EventType::Applybuff,
        Some("applydebuff") => EventType::Applydebuff,
        Some("death") => EventType::Death,
        Some("removebuff") => EventType::Removebuff,
        Some("removedebuff") => EventType::Removedebuff,
        _ => EventType::Other,
    };
    let source_id = row.get("sourceID").and_then(Value::as_i64).unwrap_or(-1);
    let target_id = row.get("targetID").and_then(Value::as_i64).unwrap_or(-1);
    let ability_id = row
        .pointer("/ability/guid")
        .and_then(Value::as_i64)
        .or_else(|| row.get("abilityGameID").and_then(Value::as_i64));
    let ability_name = row
        .pointer("/ability/name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let amount = row.get("amount").and_then(Value::as_i64).unwrap_or(0);
    let mitigated = row.get("mitigated").and_then(Value::as_i64).unwrap_or(0);
    let overkill = row.get("overkill").and_then(Value::as_i64).unwrap_or(0);
    let hit_type = row.get("hitType").and_then(Value::as_str).map(str::to_string);

    let known_keys = [
        "timestamp", "type", "sourceID", "targetID", "ability", "abilityGameID", "amount",
        "mitigated", "overkill", "hitType",
    ];
    let extra = row
        .as_object()
        .map(|obj| {
            obj.iter()
                .filter(|(k, _)| !known_keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default();

    Some(Event {
        timestamp_ms,
        event_type,
        source_id,
        target_id,
        ability_id,
        ability_name,
        amount,
        mitigated,
        overkill,
        hit_type,
        extra,
        fight_id: None,
        pull_index: None,
        phase_id: None,
        offset_from_pull_start_ms: None,
        sequence: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_fights_all_bosses_filters_non_boss() {
        let fights = vec![
            Fight {
                id: 1,
                name: "Trash".into(),
                boss_id: None,
                start_ms: 0,
                end_ms: 1000,
                kill: false,
                phase_transitions: vec![],
            },
            Fight {
                id: 2,
                name: "Nexus-King".into(),
                boss_id: Some(7),
                start_ms: 1000,
                end_ms: 2000,
                kill: true,
                phase_transitions: vec![],
            },
        ];
        let retained = retain_fights(fights, &FightFilter::AllBosses);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].id, 2);
    }

    #[test]
    fn retain_fights_boss_filter_is_case_insensitive() {
        let fights = vec![Fight {
            id: 1,
            name: "NEXUS-king".into(),
            boss_id: Some(7),
            start_ms: 0,
            end_ms: 1000,
            kill: true,
            phase_transitions: vec![],
        }];
        let retained = retain_fights(fights, &FightFilter::Boss("nexus-king".to_string()));
        assert_eq!(retained.len(), 1);
    }

    #[test]
    fn parse_event_preserves_unknown_fields_in_extra() {
        let row = json!({
            "timestamp": 1000,
            "type": "damage",
            "sourceID": 1,
            "targetID": 2,
            "amount": 500,
            "somethingNew": "value",
        });
        let event = parse_event(&row).unwrap();
        assert_eq!(event.amount, 500);
        assert_eq!(
            event.extra.get("somethingNew").and_then(Value::as_str),
            Some("value")
        );
    }
}
