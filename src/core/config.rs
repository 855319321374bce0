use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::error::Result;
use crate::datastore::compaction::CompactionStrategy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage_path: PathBuf,

    // Attribute columns by name
    pub attributes: BTreeMap<String, AttributeConfig>,

    // Rank setup
    pub rank: RankConfig,

    // Feed boundary
    pub max_pending_operations: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_path: PathBuf::from("./data"),
            attributes: BTreeMap::new(),
            rank: RankConfig::default(),
            max_pending_operations: 1000,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasicType {
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionType {
    Single,
    Array,
    WeightedSet,
}

/// Which structures back the unique value dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DictionaryType {
    Btree,
    Hash,
    BtreeAndHash,
}

/// Matching mode for string dictionaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Matching {
    Cased,
    Uncased,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryConfig {
    pub kind: DictionaryType,
    pub matching: Matching,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        DictionaryConfig {
            kind: DictionaryType::Btree,
            matching: Matching::Uncased,
        }
    }
}

impl DictionaryConfig {
    pub fn new(kind: DictionaryType, matching: Matching) -> Self {
        DictionaryConfig { kind, matching }
    }

    pub fn has_btree(&self) -> bool {
        matches!(self.kind, DictionaryType::Btree | DictionaryType::BtreeAndHash)
    }

    pub fn has_hash(&self) -> bool {
        matches!(self.kind, DictionaryType::Hash | DictionaryType::BtreeAndHash)
    }
}

/// Buffer sizing for the arena backing an enum store or array store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GrowStrategy {
    pub initial_entries: usize,
    pub grow_factor: f64,
}

impl Default for GrowStrategy {
    fn default() -> Self {
        GrowStrategy {
            initial_entries: 1024,
            grow_factor: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeConfig {
    pub basic_type: BasicType,
    pub collection: CollectionType,
    pub fast_search: bool,
    pub dictionary: DictionaryConfig,
    pub compaction: CompactionStrategy,
    pub grow: GrowStrategy,
}

impl Default for AttributeConfig {
    fn default() -> Self {
        AttributeConfig {
            basic_type: BasicType::Int32,
            collection: CollectionType::Single,
            fast_search: false,
            dictionary: DictionaryConfig::default(),
            compaction: CompactionStrategy::default(),
            grow: GrowStrategy::default(),
        }
    }
}

impl AttributeConfig {
    pub fn new(basic_type: BasicType, collection: CollectionType) -> Self {
        AttributeConfig {
            basic_type,
            collection,
            ..AttributeConfig::default()
        }
    }

    pub fn with_fast_search(mut self, fast_search: bool) -> Self {
        self.fast_search = fast_search;
        self
    }

    pub fn with_dictionary(mut self, dictionary: DictionaryConfig) -> Self {
        self.dictionary = dictionary;
        self
    }

    pub fn with_compaction(mut self, compaction: CompactionStrategy) -> Self {
        self.compaction = compaction;
        self
    }

    pub fn is_weighted_set(&self) -> bool {
        self.collection == CollectionType::WeightedSet
    }

    /// Uncased matching only changes ordering for string attributes.
    pub fn is_folded(&self) -> bool {
        self.basic_type == BasicType::String && self.dictionary.matching == Matching::Uncased
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankConfig {
    pub unbox_seeds: bool,
    pub enable_profiling: bool,
}

impl Default for RankConfig {
    fn default() -> Self {
        RankConfig {
            unbox_seeds: true,
            enable_profiling: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_in_defaults() {
        let config = Config::from_json(
            r#"{
                "attributes": {
                    "tags": { "basic_type": "String", "collection": "WeightedSet", "fast_search": true },
                    "year": { "basic_type": "Int16" }
                },
                "rank": { "enable_profiling": true },
                "max_pending_operations": 16
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_pending_operations, 16);
        assert!(config.rank.enable_profiling);
        assert!(config.rank.unbox_seeds);
        let tags = &config.attributes["tags"];
        assert!(tags.is_weighted_set() && tags.fast_search && tags.is_folded());
        assert_eq!(config.attributes["year"].collection, CollectionType::Single);
        assert_eq!(config.attributes["year"].grow, GrowStrategy::default());
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        let err = Config::from_json("{ \"attributes\": 3 }").unwrap_err();
        assert_eq!(err.kind, crate::core::error::ErrorKind::Parse);
    }
}
