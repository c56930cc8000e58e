//! Static `{subType or spec -> role}` lookup table, replacing the ad-hoc
//! per-call role guessing the upstream payload would otherwise invite.
//! Built once behind a `once_cell::sync::Lazy` global singleton.

use crate::models::Role;
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Maps a player class name to its default role. Specs within a class
/// (e.g. Holy Paladin vs. Protection Paladin) are not distinguished here —
/// upstream's `specs` array on the actor is consulted first by
/// [`role_for_actor`], and this table is the class-level fallback.
static CLASS_ROLE_TABLE: Lazy<HashMap<&'static str, Role>> = Lazy::new(|| {
    HashMap::from([
        ("Warrior", Role::Melee),
        ("Paladin", Role::Melee),
        ("Hunter", Role::Ranged),
        ("Rogue", Role::Melee),
        ("Priest", Role::Healer),
        ("Shaman", Role::Melee),
        ("Mage", Role::Ranged),
        ("Warlock", Role::Ranged),
        ("Monk", Role::Melee),
        ("Druid", Role::Melee),
        ("DemonHunter", Role::Melee),
        ("DeathKnight", Role::Melee),
        ("Evoker", Role::Ranged),
    ])
});

/// Per-spec overrides, keyed by `"Class:Spec"`, for classes whose role
/// depends on the active spec rather than the class alone.
static SPEC_ROLE_TABLE: Lazy<HashMap<&'static str, Role>> = Lazy::new(|| {
    HashMap::from([
        ("Warrior:Protection", Role::Tank),
        ("Paladin:Protection", Role::Tank),
        ("Paladin:Holy", Role::Healer),
        ("Priest:Discipline", Role::Healer),
        ("Priest:Holy", Role::Healer),
        ("Priest:Shadow", Role::Ranged),
        ("Shaman:Restoration", Role::Healer),
        ("Shaman:Elemental", Role::Ranged),
        ("Monk:Mistweaver", Role::Healer),
        ("Monk:Brewmaster", Role::Tank),
        ("Druid:Restoration", Role::Healer),
        ("Druid:Guardian", Role::Tank),
        ("Druid:Balance", Role::Ranged),
        ("DeathKnight:Blood", Role::Tank),
        ("DemonHunter:Vengeance", Role::Tank),
        ("Evoker:Preservation", Role::Healer),
        ("Evoker:Augmentation", Role::Ranged),
    ])
});

/// Resolves a role from `(sub_type, spec)`, falling back to
/// [`Role::Unknown`] for NPCs and unrecognized classes.
pub fn role_for(sub_type: &str, spec: Option<&str>) -> Role {
    if let Some(spec) = spec {
        let key = format!("{sub_type}:{spec}");
        if let Some(role) = SPEC_ROLE_TABLE.get(key.as_str()) {
            return *role;
        }
    }
    CLASS_ROLE_TABLE
        .get(sub_type)
        .copied()
        .unwrap_or(Role::Unknown)
}
