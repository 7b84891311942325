use crate::pokemon::{ATTACK, PokemonRecord};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// Type filter value that disables type filtering.
pub const ALL_TYPES: &str = "All";

/// Choices offered by the type picker.
pub const TYPE_FILTERS: [&str; 18] = [
    ALL_TYPES, "Fire", "Water", "Grass", "Electric", "Psychic", "Ice", "Dragon", "Dark", "Fairy",
    "Rock", "Ground", "Poison", "Bug", "Fighting", "Ghost", "Steel", "Normal",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOption {
    #[default]
    Alphabetical,
    HighestAttack,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQuery {
    pub search: String,
    pub type_filter: String,
    pub sort: SortOption,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            search: String::new(),
            type_filter: ALL_TYPES.to_string(),
            sort: SortOption::default(),
        }
    }
}

impl CatalogQuery {
    fn matches(&self, record: &PokemonRecord, needle: &str) -> bool {
        let name_ok = needle.is_empty() || record.name.to_lowercase().contains(needle);
        let type_ok = self.type_filter.eq_ignore_ascii_case(ALL_TYPES)
            || record.has_type(&self.type_filter);
        name_ok && type_ok
    }
}

/// The full set of records fetched for one session.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    records: Vec<PokemonRecord>,
}

impl CatalogStore {
    pub fn new(records: Vec<PokemonRecord>) -> Self {
        tracing::debug!("Catalog store holds {} records", records.len());
        Self { records }
    }

    pub fn records(&self) -> &[PokemonRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PokemonRecord> {
        self.records.iter().find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Filters and sorts a copy of the catalog. Sorting is stable, so records
    /// with equal keys keep catalog order.
    pub fn filter(&self, query: &CatalogQuery) -> Vec<PokemonRecord> {
        let needle = query.search.to_lowercase();
        let mut result: Vec<PokemonRecord> = self
            .records
            .iter()
            .filter(|r| query.matches(r, &needle))
            .cloned()
            .collect();

        match query.sort {
            SortOption::Alphabetical => result.sort_by(|a, b| a.name.cmp(&b.name)),
            SortOption::HighestAttack => result.sort_by_key(|r| Reverse(r.stat(ATTACK))),
        }
        result
    }

    pub fn random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&PokemonRecord> {
        self.records.choose(rng)
    }

    /// Uniform pick among records other than `name`, falling back to the whole
    /// catalog when `name` is the only entry.
    pub fn random_excluding<R: Rng + ?Sized>(
        &self,
        name: &str,
        rng: &mut R,
    ) -> Option<&PokemonRecord> {
        let others: Vec<&PokemonRecord> = self
            .records
            .iter()
            .filter(|r| !r.name.eq_ignore_ascii_case(name))
            .collect();
        match others.choose(rng) {
            Some(record) => Some(*record),
            None => self.random(rng),
        }
    }
}
