//! [`StuckDetector`] – no-progress detector over position samples.
//!
//! Detects when a task that expects the player to move keeps reporting
//! (nearly) the same position, and signals that a recovery is required
//! before the task wastes further ticks.
//!
//! # Algorithm
//!
//! The first update after construction or [`StuckDetector::reset`] only
//! records the baseline position and is not counted.  Every later update
//! that moved less than `min_movement` from the baseline increments a
//! counter; once it reaches `threshold`, [`StuckDetector::update`] returns
//! `true` and keeps returning `true` until `reset` is called.  With
//! threshold `N` the first `true` is therefore returned by call `N + 1`
//! (baseline + `N` samples).
//!
//! Updates taken while the player carries an immobilising status condition
//! never count: the baseline is moved to the current position and the
//! counter is cleared.
//!
//! # Example
//!
//! ```rust
//! use delve_kernel::stuck_detector::StuckDetector;
//! use delve_types::Position;
//!
//! let mut detector = StuckDetector::new(3, 0.5, ["frozen"]);
//! let here = Position::new(10.0, 10.0);
//!
//! assert!(!detector.update(here, &[])); // call 1: baseline, not counted
//! assert!(!detector.update(here, &[])); // sample 1
//! assert!(!detector.update(here, &[])); // sample 2
//! assert!(detector.update(here, &[])); // sample 3 (call 4) → stuck
//!
//! detector.reset();
//! assert!(!detector.update(here, &[]));
//! ```

use std::collections::HashSet;

use delve_types::Position;
use delve_types::settings::StuckSettings;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// StuckDetector
// ─────────────────────────────────────────────────────────────────────────────

/// Detects that the player has stopped making progress.
#[derive(Debug, Clone)]
pub struct StuckDetector {
    /// Consecutive no-progress updates that constitute "stuck".
    threshold: u32,
    /// Minimum distance between updates that counts as movement.
    min_movement: f32,
    /// Lower-cased names of conditions that legitimately stop movement.
    immobilizing: HashSet<String>,
    baseline: Option<Position>,
    no_progress: u32,
}

impl StuckDetector {
    /// Create a detector.
    ///
    /// `immobilizing` lists status conditions (matched case-insensitively)
    /// under which standing still is expected.
    pub fn new<I, S>(threshold: u32, min_movement: f32, immobilizing: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            threshold,
            min_movement,
            immobilizing: immobilizing
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            baseline: None,
            no_progress: 0,
        }
    }

    pub fn from_settings(settings: &StuckSettings) -> Self {
        Self::new(settings.threshold, settings.min_movement, &settings.immobilizing)
    }

    /// Record a position sample.
    ///
    /// Returns `true` once `threshold` consecutive samples moved less than
    /// `min_movement`.  The counter is not cleared when that happens; call
    /// [`reset`][Self::reset] to resume detection.
    pub fn update(&mut self, position: Position, conditions: &[String]) -> bool {
        let Some(baseline) = self.baseline else {
            self.baseline = Some(position);
            return false;
        };

        if let Some(condition) = conditions
            .iter()
            .find(|c| self.immobilizing.contains(&c.to_lowercase()))
        {
            debug!(%condition, "immobilised; stuck counter cleared");
            self.baseline = Some(position);
            self.no_progress = 0;
            return false;
        }

        let moved = baseline.distance_to(&position);
        self.baseline = Some(position);

        if moved < self.min_movement {
            self.no_progress = self.no_progress.saturating_add(1);
            self.no_progress >= self.threshold
        } else {
            self.no_progress = 0;
            false
        }
    }

    /// Forget the baseline and the counter.  Call when a new objective begins.
    pub fn reset(&mut self) {
        self.baseline = None;
        self.no_progress = 0;
    }

    /// Consecutive no-progress updates recorded so far.
    pub fn no_progress_ticks(&self) -> u32 {
        self.no_progress
    }

    /// Add a condition to the immobilising set at runtime.
    pub fn add_immobilizing(&mut self, condition: &str) {
        self.immobilizing.insert(condition.to_lowercase());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(threshold: u32) -> StuckDetector {
        StuckDetector::new(threshold, 1.0, ["frozen", "Stunned"])
    }

    fn at(x: f32) -> Position {
        Position::new(x, 0.0)
    }

    #[test]
    fn first_update_records_baseline_only() {
        let mut d = detector(1);
        assert!(!d.update(at(0.0), &[]));
        assert_eq!(d.no_progress_ticks(), 0);
    }

    #[test]
    fn first_true_comes_on_call_threshold_plus_one() {
        for threshold in 1..=5u32 {
            let mut d = detector(threshold);
            let calls = (1..=threshold + 1)
                .find(|_| d.update(at(0.0), &[]))
                .expect("stuck within threshold + 1 calls");
            assert_eq!(calls, threshold + 1);
        }
    }

    #[test]
    fn stuck_exactly_on_threshold_update() {
        let mut d = detector(4);
        assert!(!d.update(at(0.0), &[]));
        assert!(!d.update(at(0.1), &[]));
        assert!(!d.update(at(0.2), &[]));
        assert!(!d.update(at(0.3), &[]));
        assert!(d.update(at(0.4), &[])); // fourth small move
    }

    #[test]
    fn stays_stuck_until_reset() {
        let mut d = detector(2);
        d.update(at(0.0), &[]);
        d.update(at(0.0), &[]);
        assert!(d.update(at(0.0), &[]));
        assert!(d.update(at(0.0), &[]));
        assert_eq!(d.no_progress_ticks(), 3);
        d.reset();
        assert!(!d.update(at(0.0), &[]));
        assert_eq!(d.no_progress_ticks(), 0);
    }

    #[test]
    fn real_movement_clears_counter() {
        let mut d = detector(3);
        d.update(at(0.0), &[]);
        d.update(at(0.1), &[]);
        d.update(at(0.2), &[]);
        assert_eq!(d.no_progress_ticks(), 2);
        assert!(!d.update(at(5.0), &[]));
        assert_eq!(d.no_progress_ticks(), 0);
    }

    #[test]
    fn movement_at_exact_minimum_counts_as_progress() {
        let mut d = detector(1);
        d.update(at(0.0), &[]);
        assert!(!d.update(at(1.0), &[]));
    }

    #[test]
    fn immobilising_condition_resets_counter() {
        let mut d = detector(3);
        d.update(at(0.0), &[]);
        d.update(at(0.0), &[]);
        d.update(at(0.0), &[]);
        assert_eq!(d.no_progress_ticks(), 2);
        assert!(!d.update(at(0.0), &["frozen".to_string()]));
        assert_eq!(d.no_progress_ticks(), 0);
        // Counting starts over after the condition clears.
        assert!(!d.update(at(0.0), &[]));
        assert!(!d.update(at(0.0), &[]));
        assert!(d.update(at(0.0), &[]));
    }

    #[test]
    fn immobilising_match_is_case_insensitive() {
        let mut d = detector(1);
        d.update(at(0.0), &[]);
        assert!(!d.update(at(0.0), &["STUNNED".to_string()]));
        assert_eq!(d.no_progress_ticks(), 0);
    }

    #[test]
    fn unrelated_condition_does_not_reset() {
        let mut d = detector(2);
        d.update(at(0.0), &[]);
        d.update(at(0.0), &["burning".to_string()]);
        assert!(d.update(at(0.0), &["burning".to_string()]));
    }

    #[test]
    fn immobilising_set_is_extensible() {
        let mut d = detector(1);
        d.add_immobilizing("Rooted");
        d.update(at(0.0), &[]);
        assert!(!d.update(at(0.0), &["rooted".to_string()]));
    }

    #[test]
    fn from_settings_uses_configured_values() {
        let settings = StuckSettings {
            threshold: 2,
            min_movement: 0.5,
            immobilizing: vec!["Channelling".to_string()],
        };
        let mut d = StuckDetector::from_settings(&settings);
        d.update(at(0.0), &[]);
        assert!(!d.update(at(0.0), &["channelling".to_string()]));
        d.update(at(0.0), &[]);
        assert!(d.update(at(0.0), &[]));
    }
}
