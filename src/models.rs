//! Core data model: reports, fights, actors, and events, expressed as
//! plain owned Rust types. Nothing in this module performs I/O; it is
//! the vocabulary the rest of the crate shares.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// An opaque, canonicalized Warcraft Logs report identifier.
///
/// Accepts either a bare code or a full report URL at construction time;
/// the canonical form is always the bare alphanumeric code.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportCode(String);

impl ReportCode {
    /// Extracts the canonical report code from a bare code or a full
    /// `https://www.warcraftlogs.com/reports/<code>` URL.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return None;
        }
        let candidate = if let Some(idx) = trimmed.rfind("/reports/") {
            &trimmed[idx + "/reports/".len()..]
        } else {
            trimmed
        };
        let code: String = candidate
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        if code.is_empty() {
            None
        } else {
            Some(ReportCode(code))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReportCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A phase transition within a fight: the moment a new mechanical phase
/// begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub id: u32,
    pub start_ms: i64,
}

/// A single pull attempt at a boss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fight {
    pub id: u32,
    pub name: String,
    pub boss_id: Option<u32>,
    pub start_ms: i64,
    pub end_ms: i64,
    pub kill: bool,
    /// Strictly increasing by `start_ms`; each `start_ms` falls within
    /// `[start_ms, end_ms]` of the fight.
    pub phase_transitions: Vec<PhaseTransition>,
}

impl Fight {
    pub fn duration_ms(&self) -> i64 {
        self.end_ms - self.start_ms
    }

    /// Selects the phase active at `timestamp_ms`: the last transition
    /// whose `start_ms <= timestamp_ms`, defaulting to phase 1 if none.
    pub fn phase_at(&self, timestamp_ms: i64) -> u32 {
        self.phase_transitions
            .iter()
            .rev()
            .find(|t| t.start_ms <= timestamp_ms)
            .map(|t| t.id)
            .unwrap_or(1)
    }
}

/// The role a player or NPC actor fills, used for default result sorting
/// and for analyzer role-dependent metric selection (e.g. phase damage vs.
/// healing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Tank,
    Healer,
    Melee,
    Ranged,
    Unknown,
}

impl Role {
    /// Sort priority used for default result ordering.
    pub fn priority(self) -> u8 {
        match self {
            Role::Tank => 0,
            Role::Healer => 1,
            Role::Melee => 2,
            Role::Ranged => 3,
            Role::Unknown => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorType {
    Player,
    Npc,
}

/// A participant in the report: a player character or an NPC (boss/add).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub name: String,
    pub actor_type: ActorType,
    /// Class name for players, species name for NPCs.
    pub sub_type: String,
    pub role: Role,
}

impl Actor {
    /// Builds the synthetic placeholder used when an event references an
    /// actor id absent from `masterData`.
    pub fn unknown(id: i64) -> Self {
        Actor {
            id,
            name: format!("Unknown-{id}"),
            actor_type: ActorType::Npc,
            sub_type: "Unknown".to_string(),
            role: Role::Unknown,
        }
    }
}

/// The wire-level event type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Damage,
    Heal,
    Cast,
    Applybuff,
    Applydebuff,
    Death,
    Removebuff,
    Removedebuff,
    Other,
}

/// A single normalized combat log event.
///
/// `fight_id`, `pull_index`, `phase_id`, and `offset_from_pull_start_ms`
/// are populated by the normalizer; they are `None` only on events that
/// have not yet been normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub timestamp_ms: i64,
    pub event_type: EventType,
    pub source_id: i64,
    pub target_id: i64,
    pub ability_id: Option<i64>,
    pub ability_name: Option<String>,
    pub amount: i64,
    pub mitigated: i64,
    pub overkill: i64,
    pub hit_type: Option<String>,
    /// Fields from the upstream event not modeled explicitly above,
    /// preserved for diagnostics.
    pub extra: BTreeMap<String, serde_json::Value>,

    pub fight_id: Option<u32>,
    pub pull_index: Option<u32>,
    pub phase_id: Option<u32>,
    pub offset_from_pull_start_ms: Option<i64>,

    /// Tie-break for events sharing a `(timestamp_ms, source_id)` pair:
    /// insertion order from the upstream page.
    pub sequence: u64,
}

/// A fully materialized, immutable view of one or more reports: the
/// fights, the resolved actor roster, and the time-ordered event stream.
///
/// Once published to the snapshot cache a `ReportSnapshot` is never
/// mutated; analyzers hold shared references to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSnapshot {
    pub report_codes: Vec<ReportCode>,
    pub fights: Vec<Fight>,
    pub actors: BTreeMap<i64, Actor>,
    /// Sorted ascending by `(timestamp_ms, source_id, sequence)`.
    pub events: Vec<Event>,
}

impl ReportSnapshot {
    pub fn actor(&self, id: i64) -> Actor {
        self.actors
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Actor::unknown(id))
    }

    pub fn fight(&self, id: u32) -> Option<&Fight> {
        self.fights.iter().find(|f| f.id == id)
    }

    /// Number of retained fights (pulls) in this snapshot.
    pub fn pull_count(&self) -> u32 {
        self.fights.len() as u32
    }
}

/// The set of upstream `dataType` values a fetch requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    DamageDone,
    DamageTaken,
    Healing,
    Casts,
    Deaths,
    Resources,
    Buffs,
    Debuffs,
}

/// Selects which fights to retain from a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FightFilter {
    /// Retain every fight with a non-null `boss_id`.
    AllBosses,
    /// Retain fights whose name matches case-insensitively.
    Boss(String),
}

impl Default for FightFilter {
    fn default() -> Self {
        FightFilter::AllBosses
    }
}

/// A deterministic digest of a logical fetch/analysis request, used as the
/// snapshot cache key.
///
/// Built from a canonical, sorted textual representation of its inputs so
/// that two logically-identical requests always hash to the same value
/// regardless of e.g. `HashSet` iteration order upstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn compute(
        report_codes: &[ReportCode],
        fight_filter: &FightFilter,
        data_types: &[DataType],
        ability_ids: &[i64],
    ) -> Self {
        use std::fmt::Write;

        let mut codes: Vec<&str> = report_codes.iter().map(|c| c.as_str()).collect();
        codes.sort_unstable();

        let mut dtypes: Vec<String> = data_types.iter().map(|d| format!("{d:?}")).collect();
        dtypes.sort();

        let mut abilities = ability_ids.to_vec();
        abilities.sort_unstable();

        let filter_key = match fight_filter {
            FightFilter::AllBosses => "all".to_string(),
            FightFilter::Boss(name) => format!("boss:{}", name.to_lowercase()),
        };

        let mut buf = String::new();
        write!(
            buf,
            "reports={}|filter={}|types={}|abilities={:?}",
            codes.join(","),
            filter_key,
            dtypes.join(","),
            abilities
        )
        .expect("formatting into a String never fails");

        Fingerprint(buf)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_code_parses_bare_and_url() {
        assert_eq!(
            ReportCode::parse("AbC123").unwrap().as_str(),
            "AbC123"
        );
        assert_eq!(
            ReportCode::parse("https://www.warcraftlogs.com/reports/XyZ789#fight=1")
                .unwrap()
                .as_str(),
            "XyZ789"
        );
        assert!(ReportCode::parse("   ").is_none());
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = Fingerprint::compute(
            &[
                ReportCode::parse("bbb").unwrap(),
                ReportCode::parse("aaa").unwrap(),
            ],
            &FightFilter::AllBosses,
            &[DataType::Healing, DataType::DamageDone],
            &[2, 1],
        );
        let b = Fingerprint::compute(
            &[
                ReportCode::parse("aaa").unwrap(),
                ReportCode::parse("bbb").unwrap(),
            ],
            &FightFilter::AllBosses,
            &[DataType::DamageDone, DataType::Healing],
            &[1, 2],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn phase_at_defaults_to_one_with_no_transitions() {
        let fight = Fight {
            id: 1,
            name: "Nexus-King".into(),
            boss_id: Some(1),
            start_ms: 0,
            end_ms: 100_000,
            kill: true,
            phase_transitions: vec![],
        };
        assert_eq!(fight.phase_at(50_000), 1);
    }

    #[test]
    fn phase_at_selects_last_transition_before_timestamp() {
        let fight = Fight {
            id: 1,
            name: "Nexus-King".into(),
            boss_id: Some(1),
            start_ms: 0,
            end_ms: 100_000,
            kill: true,
            phase_transitions: vec![
                PhaseTransition { id: 1, start_ms: 0 },
                PhaseTransition {
                    id: 2,
                    start_ms: 45_000,
                },
            ],
        };
        assert_eq!(fight.phase_at(10_000), 1);
        assert_eq!(fight.phase_at(45_000), 2);
        assert_eq!(fight.phase_at(99_000), 2);
    }
}
