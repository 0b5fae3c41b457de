//! Structured memory store.

use super::item::{
    clamp_confidence, clamp_priority, MemoryCategory, MemoryFilter, MemoryId, MemoryItem,
    MemoryMetadata, MemoryUpdate,
};
use super::MemoryError;
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;
use tracing::{debug, info};

/// Word-set overlap above which two items count as duplicates.
const SIMILARITY_THRESHOLD: f64 = 0.7;

/// Item count above which hourly consolidation kicks in.
const CONSOLIDATE_TOTAL_ITEMS: usize = 100;

/// Bucket size that triggers consolidation on every add.
const CONSOLIDATE_CATEGORY_ITEMS: usize = 50;

/// Floor for item age in search ranking, in seconds.
const MIN_AGE_SECS: f64 = 0.001;

/// Flat list of items plus a per-category index of ids.
///
/// Every categorized item appears in exactly one bucket, the one
/// matching its `category`.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    items: Vec<MemoryItem>,
    buckets: BTreeMap<MemoryCategory, Vec<MemoryId>>,
    next_id: u64,
    last_consolidated: Option<DateTime<Utc>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in insertion order.
    pub fn items(&self) -> &[MemoryItem] {
        &self.items
    }

    pub fn get(&self, id: MemoryId) -> Option<&MemoryItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Ids stored under a category, in bucket order.
    pub fn category_ids(&self, category: MemoryCategory) -> &[MemoryId] {
        self.buckets
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn category_len(&self, category: MemoryCategory) -> usize {
        self.category_ids(category).len()
    }

    pub fn last_consolidated(&self) -> Option<DateTime<Utc>> {
        self.last_consolidated
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add an item and run the consolidation check.
    ///
    /// Returns the item as inserted; consolidation may merge it away.
    pub fn add(
        &mut self,
        text: impl Into<String>,
        category: Option<MemoryCategory>,
        metadata: MemoryMetadata,
    ) -> MemoryItem {
        self.add_at(text, category, metadata, Utc::now())
    }

    pub(crate) fn add_at(
        &mut self,
        text: impl Into<String>,
        category: Option<MemoryCategory>,
        metadata: MemoryMetadata,
        now: DateTime<Utc>,
    ) -> MemoryItem {
        self.next_id += 1;
        let item = MemoryItem {
            id: MemoryId(self.next_id),
            text: text.into(),
            category,
            created_at: now,
            updated_at: now,
            version: 1,
            priority: clamp_priority(metadata.priority),
            confidence: clamp_confidence(metadata.confidence),
            context: metadata.context,
            related_ids: metadata.related_ids,
            source: metadata.source,
        };

        if let Some(category) = category {
            self.buckets.entry(category).or_default().push(item.id);
        }
        self.items.push(item.clone());
        debug!(id = %item.id, category = ?category, "memory item added");

        if self.needs_consolidation(now) {
            self.consolidate_at(now);
        }
        item
    }

    /// Apply `update` to an item, bumping its version.
    ///
    /// A missing id leaves the store untouched.
    pub fn update(
        &mut self,
        id: MemoryId,
        update: MemoryUpdate,
    ) -> Result<&MemoryItem, MemoryError> {
        self.update_at(id, update, Utc::now())
    }

    pub(crate) fn update_at(
        &mut self,
        id: MemoryId,
        update: MemoryUpdate,
        now: DateTime<Utc>,
    ) -> Result<&MemoryItem, MemoryError> {
        let index = self.index_of(id).ok_or(MemoryError::NotFound(id))?;

        let item = &mut self.items[index];
        item.version += 1;
        item.updated_at = now;
        if let Some(text) = update.text {
            item.text = text;
        }
        if let Some(priority) = update.priority {
            item.priority = clamp_priority(priority);
        }
        if let Some(confidence) = update.confidence {
            item.confidence = clamp_confidence(confidence);
        }
        if let Some(context) = update.context {
            item.context.extend(context);
        }
        if let Some(related) = update.related_ids {
            item.related_ids.extend(related);
        }
        if let Some(source) = update.source {
            item.source = source;
        }
        if let Some(category) = update.category {
            item.category = Some(category);
        }
        let category = item.category;

        // Re-index: the item moves to the end of its bucket.
        if let Some(category) = category {
            self.unindex(id);
            self.buckets.entry(category).or_default().push(id);
        }

        Ok(&self.items[index])
    }

    /// Remove an item from the flat list and its bucket.
    pub fn remove(&mut self, id: MemoryId) -> Result<MemoryItem, MemoryError> {
        let index = self.index_of(id).ok_or(MemoryError::NotFound(id))?;
        let item = self.items.remove(index);
        self.unindex(id);
        debug!(id = %id, "memory item removed");
        Ok(item)
    }

    fn index_of(&self, id: MemoryId) -> Option<usize> {
        self.items.iter().position(|item| item.id == id)
    }

    fn unindex(&mut self, id: MemoryId) {
        for bucket in self.buckets.values_mut() {
            bucket.retain(|&other| other != id);
        }
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Case-insensitive substring search, best matches first.
    ///
    /// Ranked by `priority * confidence / age`, age measured from
    /// `updated_at`. Ties keep store order.
    pub fn search(
        &self,
        query: &str,
        category: Option<MemoryCategory>,
        filter: &MemoryFilter,
    ) -> Vec<&MemoryItem> {
        self.search_at(query, category, filter, Utc::now())
    }

    pub(crate) fn search_at(
        &self,
        query: &str,
        category: Option<MemoryCategory>,
        filter: &MemoryFilter,
        now: DateTime<Utc>,
    ) -> Vec<&MemoryItem> {
        let query = query.to_lowercase();
        let space: Vec<&MemoryItem> = match category {
            Some(category) => self
                .category_ids(category)
                .iter()
                .filter_map(|&id| self.get(id))
                .collect(),
            None => self.items.iter().collect(),
        };

        let mut results: Vec<(f64, &MemoryItem)> = space
            .into_iter()
            .filter(|item| item.text.to_lowercase().contains(&query))
            .filter(|item| filter.matches(item))
            .map(|item| (relevance(item, now), item))
            .collect();
        results.sort_by(|a, b| b.0.total_cmp(&a.0));
        results.into_iter().map(|(_, item)| item).collect()
    }

    // ========================================================================
    // Consolidation
    // ========================================================================

    fn needs_consolidation(&self, now: DateTime<Utc>) -> bool {
        let Some(last) = self.last_consolidated else {
            return true;
        };
        let since = now - last;
        (self.items.len() > CONSOLIDATE_TOTAL_ITEMS && since > Duration::hours(1))
            || self
                .buckets
                .values()
                .any(|bucket| bucket.len() > CONSOLIDATE_CATEGORY_ITEMS)
            || since > Duration::hours(24)
    }

    /// Merge near-duplicate items. Returns how many items were absorbed.
    ///
    /// Items are grouped greedily in store order: each item joins the first
    /// group whose first member it resembles. In each group the most
    /// recently updated item survives (then higher priority, then higher
    /// confidence; the earliest wins a full tie) and takes over the others'
    /// related ids and context.
    pub fn consolidate(&mut self) -> usize {
        self.consolidate_at(Utc::now())
    }

    pub(crate) fn consolidate_at(&mut self, now: DateTime<Utc>) -> usize {
        let words: Vec<BTreeSet<String>> = self.items.iter().map(MemoryItem::word_set).collect();

        let mut groups: Vec<Vec<usize>> = Vec::new();
        for (index, item_words) in words.iter().enumerate() {
            match groups
                .iter_mut()
                .find(|group| jaccard(item_words, &words[group[0]]) > SIMILARITY_THRESHOLD)
            {
                Some(group) => group.push(index),
                None => groups.push(vec![index]),
            }
        }

        let mut absorbed = HashSet::new();
        for group in groups.iter().filter(|group| group.len() > 1) {
            let primary = group
                .iter()
                .copied()
                .reduce(|best, candidate| {
                    if outranks(&self.items[candidate], &self.items[best]) {
                        candidate
                    } else {
                        best
                    }
                })
                .unwrap_or(group[0]);

            for &other in group.iter().filter(|&&i| i != primary) {
                let (related, context) = {
                    let item = &self.items[other];
                    (item.related_ids.clone(), item.context.clone())
                };
                let target = &mut self.items[primary];
                target.related_ids.extend(related);
                target.context.extend(context);
                absorbed.insert(self.items[other].id);
            }
        }

        if !absorbed.is_empty() {
            self.items.retain(|item| !absorbed.contains(&item.id));
            for bucket in self.buckets.values_mut() {
                bucket.retain(|id| !absorbed.contains(id));
            }
            info!(merged = absorbed.len(), remaining = self.items.len(), "memory consolidated");
        }
        self.last_consolidated = Some(now);
        absorbed.len()
    }

    // ========================================================================
    // Formatting
    // ========================================================================

    /// Render the store for a prompt, grouped by category.
    ///
    /// Categories appear in order of first use, uncategorized items last.
    /// An empty store renders as an empty string.
    pub fn format_for_prompt(&self) -> String {
        if self.items.is_empty() {
            return String::new();
        }

        let mut sections: Vec<(MemoryCategory, Vec<&MemoryItem>)> = Vec::new();
        let mut uncategorized = Vec::new();
        for item in &self.items {
            match item.category {
                Some(category) => match sections.iter_mut().find(|(c, _)| *c == category) {
                    Some((_, items)) => items.push(item),
                    None => sections.push((category, vec![item])),
                },
                None => uncategorized.push(item),
            }
        }

        let mut out = String::from("Memory:\n");
        for (category, items) in sections {
            let _ = write!(out, "\n[{}]\n", category.name().to_uppercase());
            write_items(&mut out, items);
        }
        if !uncategorized.is_empty() {
            out.push_str("\n[UNCATEGORIZED]\n");
            write_items(&mut out, uncategorized);
        }
        out
    }
}

fn write_items(out: &mut String, mut items: Vec<&MemoryItem>) {
    items.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
    });
    for item in items {
        let _ = write!(out, "[{}] {}", item.id, item.text);
        if item.has_custom_scores() {
            let _ = write!(
                out,
                " (priority: {}, confidence: {:.1})",
                item.priority, item.confidence
            );
        }
        out.push('\n');
    }
}

fn relevance(item: &MemoryItem, now: DateTime<Utc>) -> f64 {
    let age = (now - item.updated_at).num_milliseconds() as f64 / 1000.0;
    item.priority as f64 * item.confidence / age.max(MIN_AGE_SECS)
}

fn outranks(candidate: &MemoryItem, best: &MemoryItem) -> bool {
    candidate
        .updated_at
        .cmp(&best.updated_at)
        .then(candidate.priority.cmp(&best.priority))
        .then(candidate.confidence.total_cmp(&best.confidence))
        .is_gt()
}

/// Jaccard similarity of two word sets. Two empty sets are identical.
pub(crate) fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
