// pokemon.rs
// PokeAPI response shapes and the uniform record the rest of the crate works with.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const HP: &str = "hp";
pub const ATTACK: &str = "attack";
pub const DEFENSE: &str = "defense";
pub const SPECIAL_ATTACK: &str = "special-attack";
pub const SPECIAL_DEFENSE: &str = "special-defense";
pub const SPEED: &str = "speed";

pub const STAT_NAMES: [&str; 6] = [HP, ATTACK, DEFENSE, SPECIAL_ATTACK, SPECIAL_DEFENSE, SPEED];

/// Hit points assumed when a record carries no `hp` stat.
pub const DEFAULT_HP: u32 = 100;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PokemonListResponse {
    pub results: Vec<NamedAPIResource>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NamedAPIResource {
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PokemonDetail {
    pub id: u32,
    pub name: String,
    pub types: Vec<PokemonType>,
    pub stats: Vec<PokemonStat>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PokemonStat {
    pub base_stat: u32,
    pub stat: NamedAPIResource,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PokemonType {
    pub r#type: NamedAPIResource,
}

/// One Pokémon as fetched for a session. Never mutated after assembly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PokemonRecord {
    pub id: u32,
    pub name: String,
    pub sprite_url: String,
    pub types: Vec<String>,
    pub stats: BTreeMap<String, u32>,
}

impl PokemonRecord {
    /// Assembles a record from a detail payload. Stats missing from the payload
    /// are filled with their defaults so every fetched record has all six keys.
    pub fn from_detail(detail: PokemonDetail, sprite_url: String) -> Self {
        let mut stats: BTreeMap<String, u32> = detail
            .stats
            .into_iter()
            .map(|entry| (entry.stat.name, entry.base_stat))
            .collect();
        for name in STAT_NAMES {
            stats.entry(name.to_string()).or_insert_with(|| default_stat(name));
        }

        Self {
            id: detail.id,
            name: detail.name.to_lowercase(),
            sprite_url,
            types: detail.types.into_iter().map(|t| t.r#type.name).collect(),
            stats,
        }
    }

    /// Base value of `name`, 0 when absent.
    pub fn stat(&self, name: &str) -> u32 {
        self.stats.get(name).copied().unwrap_or(0)
    }

    pub fn hp(&self) -> u32 {
        self.stats.get(HP).copied().unwrap_or(DEFAULT_HP)
    }

    pub fn has_type(&self, wanted: &str) -> bool {
        self.types.iter().any(|t| t.eq_ignore_ascii_case(wanted))
    }
}

pub fn default_stat(name: &str) -> u32 {
    if name == HP { DEFAULT_HP } else { 0 }
}
