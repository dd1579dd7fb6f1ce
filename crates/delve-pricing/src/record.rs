//! Price records, entries and the immutable [`CacheSnapshot`].

use std::collections::HashMap;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One record of the external reference feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub name: String,
    pub value: f64,
    /// Category the record belongs to.  Filled in from the requested
    /// category when the feed omits it.
    #[serde(default)]
    pub category: String,
}

impl PriceRecord {
    pub fn new(name: impl Into<String>, value: f64, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value,
            category: category.into(),
        }
    }
}

/// A cached reference price.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceEntry {
    pub key: String,
    pub value: f64,
    pub category: String,
    pub refreshed_at: DateTime<Utc>,
    /// Refresh cycle that produced this entry.
    pub generation: u64,
}

/// Which lookup tier produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Exact,
    CaseInsensitive,
    Substring,
}

// ─────────────────────────────────────────────────────────────────────────────
// CacheSnapshot
// ─────────────────────────────────────────────────────────────────────────────

/// Immutable key → [`PriceEntry`] mapping produced by one refresh cycle.
///
/// Snapshots are never modified after construction; a refresh builds a new
/// one and swaps the shared `Arc`.  Every entry carries the snapshot's
/// generation.
#[derive(Debug)]
pub struct CacheSnapshot {
    entries: HashMap<String, PriceEntry>,
    /// Lower-cased key → original key.
    folded: HashMap<String, String>,
    generation: u64,
    built_at: Instant,
}

impl CacheSnapshot {
    /// The snapshot in place before the first successful refresh.
    pub fn empty(built_at: Instant) -> Self {
        Self {
            entries: HashMap::new(),
            folded: HashMap::new(),
            generation: 0,
            built_at,
        }
    }

    /// Build a snapshot from fetched records.
    ///
    /// When a name appears more than once the first record wins, so the
    /// configured category order decides between duplicates.
    pub fn from_records(
        records: impl IntoIterator<Item = PriceRecord>,
        generation: u64,
        built_at: Instant,
    ) -> Self {
        let refreshed_at = Utc::now();
        let mut entries = HashMap::new();
        let mut folded = HashMap::new();
        for record in records {
            if entries.contains_key(&record.name) {
                continue;
            }
            folded
                .entry(record.name.to_lowercase())
                .or_insert_with(|| record.name.clone());
            entries.insert(
                record.name.clone(),
                PriceEntry {
                    key: record.name,
                    value: record.value,
                    category: record.category,
                    refreshed_at,
                    generation,
                },
            );
        }
        Self {
            entries,
            folded,
            generation,
            built_at,
        }
    }

    /// Look `key` up by exact match, then case-insensitively, then by
    /// substring containment in either direction.
    pub fn lookup(&self, key: &str) -> Option<&PriceEntry> {
        self.lookup_with_tier(key).map(|(entry, _)| entry)
    }

    /// Like [`lookup`][Self::lookup] but also reports which tier matched.
    ///
    /// Among several substring matches the one with the largest overlap
    /// wins, then the one whose length is closest to `key`, then the
    /// lexicographically smallest key.
    pub fn lookup_with_tier(&self, key: &str) -> Option<(&PriceEntry, MatchTier)> {
        if let Some(entry) = self.entries.get(key) {
            return Some((entry, MatchTier::Exact));
        }

        let query = key.to_lowercase();
        if let Some(entry) = self.folded.get(&query).and_then(|k| self.entries.get(k)) {
            return Some((entry, MatchTier::CaseInsensitive));
        }
        if query.is_empty() {
            return None;
        }

        self.folded
            .iter()
            .filter(|(folded, _)| folded.contains(query.as_str()) || query.contains(folded.as_str()))
            .min_by(|(a, ka), (b, kb)| {
                let overlap_a = a.len().min(query.len());
                let overlap_b = b.len().min(query.len());
                overlap_b
                    .cmp(&overlap_a)
                    .then_with(|| a.len().abs_diff(query.len()).cmp(&b.len().abs_diff(query.len())))
                    .then_with(|| ka.cmp(kb))
            })
            .and_then(|(_, k)| self.entries.get(k))
            .map(|entry| (entry, MatchTier::Substring))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> Instant {
        self.built_at
    }

    pub fn entries(&self) -> impl Iterator<Item = &PriceEntry> {
        self.entries.values()
    }
}
