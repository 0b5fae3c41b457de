//! Memory items and their metadata.

use super::MemoryError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Highest allowed priority.
pub const MAX_PRIORITY: u8 = 10;

/// Process-unique memory item identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(pub u64);

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed set of memory categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Items,
    Npcs,
    Locations,
    Quests,
    GameMechanics,
    Stats,
}

impl MemoryCategory {
    pub const ALL: [MemoryCategory; 6] = [
        MemoryCategory::Items,
        MemoryCategory::Npcs,
        MemoryCategory::Locations,
        MemoryCategory::Quests,
        MemoryCategory::GameMechanics,
        MemoryCategory::Stats,
    ];

    /// Name as used by the tools.
    pub fn name(&self) -> &'static str {
        match self {
            MemoryCategory::Items => "items",
            MemoryCategory::Npcs => "npcs",
            MemoryCategory::Locations => "locations",
            MemoryCategory::Quests => "quests",
            MemoryCategory::GameMechanics => "game_mechanics",
            MemoryCategory::Stats => "stats",
        }
    }

    /// All category names, for tool schemas.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(MemoryCategory::name).collect()
    }
}

impl fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MemoryCategory {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == lower)
            .ok_or_else(|| MemoryError::UnknownCategory(s.to_string()))
    }
}

/// One remembered fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    pub id: MemoryId,
    pub text: String,
    pub category: Option<MemoryCategory>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Starts at 1, bumped on every update.
    pub version: u32,
    /// 0 to [`MAX_PRIORITY`].
    pub priority: u8,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub context: BTreeMap<String, Value>,
    pub related_ids: BTreeSet<MemoryId>,
    /// Provenance tag, "direct" unless stated otherwise.
    pub source: String,
}

impl MemoryItem {
    /// Whether priority or confidence differ from the defaults.
    pub fn has_custom_scores(&self) -> bool {
        self.priority > 0 || self.confidence < 1.0
    }

    /// Lowercased whitespace tokens of the text.
    pub(crate) fn word_set(&self) -> BTreeSet<String> {
        self.text
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }
}

/// Optional metadata supplied when adding an item.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryMetadata {
    pub priority: u8,
    pub confidence: f64,
    pub context: BTreeMap<String, Value>,
    pub related_ids: BTreeSet<MemoryId>,
    pub source: String,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            priority: 0,
            confidence: 1.0,
            context: BTreeMap::new(),
            related_ids: BTreeSet::new(),
            source: "direct".to_string(),
        }
    }
}

impl MemoryMetadata {
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    pub fn with_related(mut self, id: MemoryId) -> Self {
        self.related_ids.insert(id);
        self
    }
}

/// Fields to change on an existing item. `None` leaves a field as is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryUpdate {
    pub text: Option<String>,
    pub category: Option<MemoryCategory>,
    pub priority: Option<u8>,
    pub confidence: Option<f64>,
    /// Merged key by key into the existing context.
    pub context: Option<BTreeMap<String, Value>>,
    /// Added to the existing related ids.
    pub related_ids: Option<BTreeSet<MemoryId>>,
    pub source: Option<String>,
}

/// Search predicates over item metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryFilter {
    pub min_priority: Option<u8>,
    pub min_confidence: Option<f64>,
    pub source: Option<String>,
}

impl MemoryFilter {
    pub fn matches(&self, item: &MemoryItem) -> bool {
        self.min_priority.map_or(true, |p| item.priority >= p)
            && self.min_confidence.map_or(true, |c| item.confidence >= c)
            && self.source.as_ref().map_or(true, |s| &item.source == s)
    }
}

pub(crate) fn clamp_priority(priority: u8) -> u8 {
    priority.min(MAX_PRIORITY)
}

pub(crate) fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        1.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}
