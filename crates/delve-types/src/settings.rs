//! Flat automation settings consumed by eligibility predicates and the device
//! protocol.
//!
//! Every section deserializes with defaults so a partial `config.toml` (or
//! none at all) yields a usable configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root settings structure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Stop entering new instances after this many completions. `0` means
    /// no limit.
    pub max_runs: u32,
    pub navigation: NavigationSettings,
    pub device: DeviceSettings,
    pub stuck: StuckSettings,
    pub breaker: BreakerSettings,
    pub loot: LootSettings,
    pub pricing: PricingSettings,
}

/// Ranges used when approaching objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Maximum distance at which `interact` is issued.
    pub interact_range: f32,
    /// Distance at which an objective is engaged with the primary skill.
    pub engage_range: f32,
    pub poll_interval_ms: u64,
    /// How long to wait for an area transition after using a portal.
    pub transition_timeout_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        Self {
            interact_range: 3.0,
            engage_range: 4.0,
            poll_interval_ms: 100,
            transition_timeout_ms: 10_000,
        }
    }
}

impl NavigationSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn transition_timeout(&self) -> Duration {
        Duration::from_millis(self.transition_timeout_ms)
    }
}

/// Apparatus protocol tuning and the item filter for what gets loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Beyond this distance the protocol walks towards the apparatus.
    pub proximity: f32,
    pub poll_interval_ms: u64,
    pub open_timeout_ms: u64,
    pub place_timeout_ms: u64,
    pub overlay_timeout_ms: u64,
    /// Delay between move-out actions in `clear_device`.
    pub clear_delay_ms: u64,
    /// Settling delay after the activate key before re-verifying.
    pub settle_ms: u64,
    /// Budget for observing the device close after activation.
    pub activate_timeout_ms: u64,
    /// Names of items that may be loaded, in preference order. Matched
    /// case-insensitively by substring.
    pub item_names: Vec<String>,
    pub min_tier: u8,
    pub max_tier: u8,
    /// Names that are never loaded even if they match `item_names`.
    pub blacklist: Vec<String>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            proximity: 3.0,
            poll_interval_ms: 100,
            open_timeout_ms: 3_000,
            place_timeout_ms: 2_000,
            overlay_timeout_ms: 1_000,
            clear_delay_ms: 150,
            settle_ms: 250,
            activate_timeout_ms: 8_000,
            item_names: vec!["Map".to_string()],
            min_tier: 1,
            max_tier: 16,
            blacklist: Vec::new(),
        }
    }
}

impl DeviceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }
    pub fn place_timeout(&self) -> Duration {
        Duration::from_millis(self.place_timeout_ms)
    }
    pub fn overlay_timeout(&self) -> Duration {
        Duration::from_millis(self.overlay_timeout_ms)
    }
    pub fn clear_delay(&self) -> Duration {
        Duration::from_millis(self.clear_delay_ms)
    }
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
    pub fn activate_timeout(&self) -> Duration {
        Duration::from_millis(self.activate_timeout_ms)
    }
}

/// No-progress detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StuckSettings {
    /// Consecutive no-movement updates before the subject counts as stuck.
    pub threshold: u32,
    /// Movement below this distance between updates counts as no progress.
    pub min_movement: f32,
    /// Status conditions that immobilise the player legitimately.
    pub immobilizing: Vec<String>,
}

impl Default for StuckSettings {
    fn default() -> Self {
        Self {
            threshold: 20,
            min_movement: 0.5,
            immobilizing: ["frozen", "stunned", "petrified", "rooted", "channelling"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub max_consecutive: u32,
    pub reset_window_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            max_consecutive: 10,
            reset_window_secs: 120,
        }
    }
}

impl BreakerSettings {
    pub fn reset_window(&self) -> Duration {
        Duration::from_secs(self.reset_window_secs)
    }
}

/// Which ground items are worth picking up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LootSettings {
    /// Loot farther than this is ignored.
    pub pickup_range: f32,
    /// Always picked up (case-insensitive substring).
    pub preferred: Vec<String>,
    /// Never picked up (case-insensitive substring). Wins over everything.
    pub blacklist: Vec<String>,
    /// Minimum reference price for items not listed in `preferred`.
    pub min_value: f64,
    pub pickup_timeout_ms: u64,
}

impl Default for LootSettings {
    fn default() -> Self {
        Self {
            pickup_range: 40.0,
            preferred: Vec::new(),
            blacklist: Vec::new(),
            min_value: 1.0,
            pickup_timeout_ms: 2_000,
        }
    }
}

impl LootSettings {
    pub fn pickup_timeout(&self) -> Duration {
        Duration::from_millis(self.pickup_timeout_ms)
    }
}

/// External reference-price feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingSettings {
    /// Base URL of the feed; records are fetched from `{base_url}/{category}`.
    pub base_url: String,
    pub categories: Vec<String>,
    pub ttl_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for PricingSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8686/prices".to_string(),
            categories: ["currency", "fragment", "map", "unique"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ttl_secs: 3_600,
            request_timeout_secs: 15,
        }
    }
}

impl PricingSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn breaker_defaults_match_ten_in_two_minutes() {
        let s = BreakerSettings::default();
        assert_eq!(s.max_consecutive, 10);
        assert_eq!(s.reset_window(), Duration::from_secs(120));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let raw = r#"
            max_runs = 3

            [stuck]
            threshold = 5
        "#;
        let s: Settings = toml::from_str(raw).unwrap();
        assert_eq!(s.max_runs, 3);
        assert_eq!(s.stuck.threshold, 5);
        assert!((s.stuck.min_movement - 0.5).abs() < f32::EPSILON);
        assert!(s.stuck.immobilizing.contains(&"frozen".to_string()));
        assert_eq!(s.device, DeviceSettings::default());
    }

    #[test]
    fn empty_document_is_default() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s, Settings::default());
    }
}
