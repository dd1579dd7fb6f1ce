//! Item selection rules.
//!
//! - [`ItemMatcher`] decides which items may be loaded into the apparatus
//!   (configured names, tier window, blacklist).  Matching items are also the
//!   ones kept in the inventory instead of being stashed.
//! - [`LootFilter`] decides which ground items are worth picking up, using
//!   preferred/blacklisted names and the reference price of the item.

use delve_pricing::{CacheSnapshot, PriceCache};
use delve_types::ItemRef;
use delve_types::settings::{DeviceSettings, LootSettings};

fn fold(names: &[String]) -> Vec<String> {
    names.iter().map(|n| n.to_lowercase()).collect()
}

fn contains_any(name: &str, needles: &[String]) -> bool {
    let name = name.to_lowercase();
    needles.iter().any(|n| name.contains(n.as_str()))
}

// ─────────────────────────────────────────────────────────────────────────────
// ItemMatcher
// ─────────────────────────────────────────────────────────────────────────────

/// Case-insensitive name and tier filter for apparatus items.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemMatcher {
    names: Vec<String>,
    min_tier: u8,
    max_tier: u8,
    blacklist: Vec<String>,
}

impl ItemMatcher {
    /// Match items whose name contains any of `names` and whose tier lies in
    /// `min_tier..=max_tier`.
    pub fn new(names: &[String], min_tier: u8, max_tier: u8) -> Self {
        Self {
            names: fold(names),
            min_tier,
            max_tier,
            blacklist: Vec::new(),
        }
    }

    pub fn from_settings(settings: &DeviceSettings) -> Self {
        Self::new(&settings.item_names, settings.min_tier, settings.max_tier)
            .with_blacklist(&settings.blacklist)
    }

    /// Reject items whose name contains any of `names`.
    pub fn with_blacklist(mut self, names: &[String]) -> Self {
        self.blacklist = fold(names);
        self
    }

    pub fn matches(&self, item: &ItemRef) -> bool {
        self.rank(item).is_some()
    }

    /// Index of the first configured name `item` matches; lower is
    /// preferred.  `None` when the item is not accepted at all.
    pub fn rank(&self, item: &ItemRef) -> Option<usize> {
        if !(self.min_tier..=self.max_tier).contains(&item.tier)
            || contains_any(&item.name, &self.blacklist)
        {
            return None;
        }
        let name = item.name.to_lowercase();
        self.names.iter().position(|n| name.contains(n.as_str()))
    }

    /// The accepted item whose name ranks best; the earliest one on ties.
    pub fn best<'a>(&self, items: impl IntoIterator<Item = &'a ItemRef>) -> Option<&'a ItemRef> {
        items
            .into_iter()
            .filter_map(|i| self.rank(i).map(|r| (r, i)))
            .min_by_key(|(r, _)| *r)
            .map(|(_, i)| i)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// LootFilter
// ─────────────────────────────────────────────────────────────────────────────

/// Why a ground item was accepted or rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum LootDecision {
    Preferred,
    /// Reference value at or above the configured minimum.
    Valuable(f64),
    Blacklisted,
    /// Reference value below the configured minimum.
    BelowMinimum(f64),
    /// No reference value known.
    Unpriced,
}

impl LootDecision {
    pub fn accepted(&self) -> bool {
        matches!(self, LootDecision::Preferred | LootDecision::Valuable(_))
    }
}

/// Pickup rules: blacklist first, then preferred names, then value.  Name
/// rules are case-insensitive substring matches.
#[derive(Debug, Clone, PartialEq)]
pub struct LootFilter {
    preferred: Vec<String>,
    blacklist: Vec<String>,
    min_value: f64,
}

impl LootFilter {
    pub fn from_settings(settings: &LootSettings) -> Self {
        Self {
            preferred: fold(&settings.preferred),
            blacklist: fold(&settings.blacklist),
            min_value: settings.min_value,
        }
    }

    /// Decide using a fixed price snapshot.  Never schedules a refresh, so it
    /// is safe inside eligibility predicates.
    pub fn evaluate(&self, item: &ItemRef, prices: Option<&CacheSnapshot>) -> LootDecision {
        self.decide(item, || {
            prices.and_then(|s| s.lookup(&item.name)).map(|e| e.value)
        })
    }

    /// Decide using the live cache; a stale cache schedules a refresh.
    pub fn evaluate_live(&self, item: &ItemRef, prices: Option<&PriceCache>) -> LootDecision {
        self.decide(item, || prices.and_then(|c| c.get_value(&item.name)))
    }

    fn decide(&self, item: &ItemRef, value: impl FnOnce() -> Option<f64>) -> LootDecision {
        if contains_any(&item.name, &self.blacklist) {
            return LootDecision::Blacklisted;
        }
        if contains_any(&item.name, &self.preferred) {
            return LootDecision::Preferred;
        }
        match value() {
            Some(v) if v >= self.min_value => LootDecision::Valuable(v),
            Some(v) => LootDecision::BelowMinimum(v),
            None => LootDecision::Unpriced,
        }
    }
}
