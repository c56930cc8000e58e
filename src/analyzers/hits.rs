//! Hit counter: counts damage events against a single tracked ability,
//! per pull, per target player — the base mistake-counting shape every
//! other "did a player eat a bad mechanic" analyzer builds on.

use super::{empty_row, events_by_pull, AnalyzerResult, PlayerResult};
use crate::error::{EngineError, Result};
use crate::models::{EventType, ReportSnapshot};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct HitCounterConfig {
    pub ability_id: i64,
    pub first_hit_only: bool,
    /// Once this many death events have occurred in the pull, further
    /// matching damage is ignored.
    pub ignore_after_deaths: Option<u32>,
    /// Damage in the closing window of the fight (seconds from the end)
    /// is ignored — avoids penalizing hits during an unavoidable wipe
    /// cleanup.
    pub ignore_final_seconds: Option<f64>,
}

pub fn analyze(snapshot: &ReportSnapshot, config: &HitCounterConfig) -> Result<AnalyzerResult> {
    if config.ability_id <= 0 {
        return Err(EngineError::BadRequest("ability_id must be positive".into()));
    }

    let pull_count = snapshot.pull_count();
    let mut totals: BTreeMap<i64, u64> = BTreeMap::new();
    let mut first_hit_seen: BTreeMap<(u32, i64), bool> = BTreeMap::new();

    for (fight_id, events) in events_by_pull(snapshot) {
        let fight = snapshot
            .fight(fight_id)
            .ok_or_else(|| EngineError::Other(anyhow::anyhow!("pull references unknown fight")))?;

        let cutoff_offset = config
            .ignore_final_seconds
            .map(|secs| fight.duration_ms() - (secs * 1000.0) as i64);

        let mut deaths_so_far = 0u32;
        for event in events {
            if event.event_type == EventType::Death {
                deaths_so_far += 1;
                continue;
            }
            if event.event_type != EventType::Damage || event.ability_id != Some(config.ability_id) {
                continue;
            }
            if let Some(limit) = config.ignore_after_deaths {
                if deaths_so_far > limit {
                    continue;
                }
            }
            if let (Some(cutoff), Some(offset)) = (cutoff_offset, event.offset_from_pull_start_ms) {
                if offset >= cutoff {
                    continue;
                }
            }

            if config.first_hit_only {
                let key = (fight_id, event.target_id);
                if *first_hit_seen.entry(key).or_insert(false) {
                    continue;
                }
                first_hit_seen.insert(key, true);
            }

            *totals.entry(event.target_id).or_insert(0) += 1;
        }
    }

    let mut entries: Vec<PlayerResult> = totals
        .into_iter()
        .map(|(actor_id, hits)| {
            let actor = snapshot.actor(actor_id);
            let mut row = empty_row(actor_id, actor.name, actor.role);
            row.metrics.insert(
                "hits".to_string(),
                super::MetricValue::from_total(hits as f64, pull_count),
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
