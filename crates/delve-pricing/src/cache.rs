//! [`PriceCache`] – periodically refreshed reference-price snapshot.
//!
//! Readers call [`PriceCache::get_value`] from the tick thread and never
//! wait on the network: the active [`CacheSnapshot`] is an `Arc` that is
//! cloned under a short read lock, and a refresh builds a complete new
//! snapshot off to the side before swapping the `Arc` under a short write
//! lock.  A reader therefore sees either the old mapping or the new one,
//! never a mix.
//!
//! When the active snapshot is older than the TTL, `get_value` spawns one
//! background refresh on the captured tokio runtime and answers from the
//! stale snapshot.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use delve_kernel::clock::SystemClock;
//! use delve_pricing::{PriceCache, StaticPriceSource};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = StaticPriceSource::new().with_category("currency", &[("Chaos Orb", 1.0)]);
//! let cache = PriceCache::new(
//!     Arc::new(source),
//!     vec!["currency".to_string()],
//!     Duration::from_secs(3600),
//!     Arc::new(SystemClock),
//! );
//! cache.force_refresh().await.unwrap();
//!
//! assert_eq!(cache.get_value("chaos orb"), Some(1.0));
//! assert_eq!(cache.get_value("Chaos Orb Fragment"), Some(1.0));
//! # }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use delve_kernel::clock::Clock;
use delve_types::settings::PricingSettings;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::PriceError;
use crate::record::{CacheSnapshot, PriceRecord};
use crate::source::{HttpPriceSource, PriceSource};

/// Minimum pause between background attempts after a refresh that produced
/// no data at all.
const RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Summary of a completed refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub generation: u64,
    pub entries: usize,
    /// Categories omitted from the snapshot because their fetch failed.
    pub failed: Vec<String>,
}

struct Inner {
    source: Arc<dyn PriceSource>,
    categories: Vec<String>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    active: RwLock<Arc<CacheSnapshot>>,
    refreshing: AtomicBool,
    generation: AtomicU64,
    /// Set after a refresh that fetched nothing; cleared on success.
    failed_at: Mutex<Option<Instant>>,
    runtime: Option<Handle>,
}

// ─────────────────────────────────────────────────────────────────────────────
// PriceCache
// ─────────────────────────────────────────────────────────────────────────────

/// Shared reference-price cache.  Clone it cheaply – all clones share the
/// same active snapshot.
#[derive(Clone)]
pub struct PriceCache {
    inner: Arc<Inner>,
}

impl PriceCache {
    /// Create a cache over `source`.
    ///
    /// The tokio runtime current at construction (if any) is captured for
    /// background refreshes; use [`on_runtime`][Self::on_runtime] when
    /// constructing outside of one.
    pub fn new(
        source: Arc<dyn PriceSource>,
        categories: Vec<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let empty = Arc::new(CacheSnapshot::empty(clock.now()));
        Self {
            inner: Arc::new(Inner {
                source,
                categories,
                ttl,
                clock,
                active: RwLock::new(empty),
                refreshing: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                failed_at: Mutex::new(None),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    /// Build a cache backed by the HTTP feed described in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Http`] if the HTTP client cannot be built.
    pub fn from_settings(
        settings: &PricingSettings,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, PriceError> {
        let source = HttpPriceSource::new(
            settings.base_url.clone(),
            Duration::from_secs(settings.request_timeout_secs),
        )?;
        Ok(Self::new(
            Arc::new(source),
            settings.categories.clone(),
            settings.ttl(),
            clock,
        ))
    }

    /// Use `handle` for background refreshes.  Only effective before the
    /// cache has been cloned.
    pub fn on_runtime(mut self, handle: Handle) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.runtime = Some(handle);
        }
        self
    }

    /// The active snapshot.  Holding it keeps that mapping alive even after
    /// a refresh replaces it.
    pub fn snapshot(&self) -> Arc<CacheSnapshot> {
        self.inner
            .active
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Reference value for `key`, or `None` when nothing matches.
    ///
    /// Never blocks on the network.  A stale snapshot schedules a background
    /// refresh and is still used to answer this call.
    pub fn get_value(&self, key: &str) -> Option<f64> {
        let snapshot = self.snapshot();
        if self.needs_refresh(&snapshot) {
            self.spawn_refresh();
        }
        snapshot.lookup(key).map(|entry| entry.value)
    }

    /// `true` when the active snapshot has never been filled or is older
    /// than the TTL.
    pub fn is_stale(&self) -> bool {
        let snapshot = self.snapshot();
        snapshot.generation() == 0 || self.inner.clock.since(snapshot.built_at()) > self.inner.ttl
    }

    /// `true` while a background refresh is in flight.
    pub fn is_refreshing(&self) -> bool {
        self.inner.refreshing.load(Ordering::Acquire)
    }

    /// Fetch every category and replace the active snapshot.
    ///
    /// A category whose fetch fails keeps the values it had in the active
    /// snapshot, restamped with the new generation.  If every category
    /// fails the active snapshot is kept as is and [`PriceError::NoData`] is
    /// returned.
    pub async fn refresh(&self) -> Result<RefreshReport, PriceError> {
        let previous = self.snapshot();
        let mut records = Vec::new();
        let mut failed = Vec::new();
        for category in &self.inner.categories {
            match self.inner.source.fetch_category(category).await {
                Ok(mut batch) => {
                    debug!(%category, records = batch.len(), "price category fetched");
                    records.append(&mut batch);
                }
                Err(e) => {
                    let kept = carry_over(&previous, category);
                    warn!(%category, error = %e, kept = kept.len(), "price category unavailable; keeping prior values");
                    records.extend(kept);
                    failed.push(category.clone());
                }
            }
        }

        if !self.inner.categories.is_empty() && failed.len() == self.inner.categories.len() {
            *self.inner.failed_at.lock().unwrap_or_else(|e| e.into_inner()) =
                Some(self.inner.clock.now());
            return Err(PriceError::NoData { failed });
        }

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = Arc::new(CacheSnapshot::from_records(
            records,
            generation,
            self.inner.clock.now(),
        ));
        let entries = snapshot.len();
        {
            let mut active = self.inner.active.write().unwrap_or_else(|e| e.into_inner());
            // A slower, older refresh must not replace a newer snapshot.
            if active.generation() < generation {
                *active = snapshot;
            }
        }
        *self.inner.failed_at.lock().unwrap_or_else(|e| e.into_inner()) = None;

        info!(generation, entries, failed = failed.len(), "price snapshot replaced");
        Ok(RefreshReport {
            generation,
            entries,
            failed,
        })
    }

    /// Refresh and wait for completion.  Used at start-up so the first
    /// lookups are answered from real data.
    pub async fn force_refresh(&self) -> Result<RefreshReport, PriceError> {
        info!(categories = self.inner.categories.len(), "forcing price refresh");
        self.refresh().await
    }

    fn needs_refresh(&self, snapshot: &CacheSnapshot) -> bool {
        let stale = snapshot.generation() == 0
            || self.inner.clock.since(snapshot.built_at()) > self.inner.ttl;
        if !stale {
            return false;
        }
        match *self.inner.failed_at.lock().unwrap_or_else(|e| e.into_inner()) {
            Some(at) => self.inner.clock.since(at) >= RETRY_BACKOFF,
            None => true,
        }
    }

    fn spawn_refresh(&self) {
        if self.inner.refreshing.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(handle) = self.inner.runtime.clone() else {
            warn!("no async runtime available; price snapshot stays stale");
            self.inner.refreshing.store(false, Ordering::Release);
            return;
        };
        let cache = self.clone();
        handle.spawn(async move {
            if let Err(e) = cache.refresh().await {
                warn!(error = %e, "background price refresh failed");
            }
            cache.inner.refreshing.store(false, Ordering::Release);
        });
    }
}

/// Records of `category` as they stand in `snapshot`.
fn carry_over(snapshot: &CacheSnapshot, category: &str) -> Vec<PriceRecord> {
    snapshot
        .entries()
        .filter(|e| e.category == category)
        .map(|e| PriceRecord::new(e.key.clone(), e.value, e.category.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticPriceSource;
    use delve_kernel::clock::{ManualClock, SystemClock};

    const TTL: Duration = Duration::from_secs(10);

    fn cache_over(source: Arc<StaticPriceSource>, clock: Arc<dyn Clock>) -> PriceCache {
        PriceCache::new(
            source,
            vec!["currency".to_string(), "fragment".to_string()],
            TTL,
            clock,
        )
    }

    fn two_categories(value: f64) -> StaticPriceSource {
        StaticPriceSource::new()
            .with_category("currency", &[("Chaos Orb", value), ("Exalted Orb", value)])
            .with_category("fragment", &[("Sacrifice at Dawn", value)])
    }

    async fn wait_for_generation(cache: &PriceCache, generation: u64) -> bool {
        for _ in 0..200 {
            if cache.snapshot().generation() >= generation {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn lookup_tiers_after_force_refresh() {
        let source = Arc::new(two_categories(1.0));
        let cache = cache_over(source, Arc::new(SystemClock));
        let report = cache.force_refresh().await.unwrap();
        assert_eq!(report.generation, 1);
        assert_eq!(report.entries, 3);

        assert_eq!(cache.get_value("Chaos Orb"), Some(1.0));
        assert_eq!(cache.get_value("chaos orb"), Some(1.0));
        assert_eq!(cache.get_value("Chaos Orb Fragment"), Some(1.0));
        assert_eq!(cache.get_value("Headhunter"), None);
    }

    #[tokio::test]
    async fn failed_category_without_prior_values_is_absent() {
        let source = Arc::new(two_categories(1.0));
        source.set_failing("fragment", true);
        let cache = cache_over(source, Arc::new(SystemClock));
        let report = cache.force_refresh().await.unwrap();

        assert_eq!(report.failed, vec!["fragment".to_string()]);
        assert_eq!(cache.get_value("Chaos Orb"), Some(1.0));
        assert_eq!(cache.get_value("Sacrifice at Dawn"), None);
    }

    #[tokio::test]
    async fn failed_category_keeps_prior_values() {
        let source = Arc::new(two_categories(3.0));
        let cache = cache_over(source.clone(), Arc::new(SystemClock));
        cache.force_refresh().await.unwrap();

        source.set_category("currency", &[("Chaos Orb", 4.0), ("Exalted Orb", 4.0)]);
        source.set_failing("fragment", true);
        let report = cache.refresh().await.unwrap();

        assert_eq!(report.failed, vec!["fragment".to_string()]);
        assert_eq!(report.entries, 3);
        assert_eq!(cache.get_value("Chaos Orb"), Some(4.0));
        assert_eq!(cache.get_value("Sacrifice at Dawn"), Some(3.0));
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.generation(), 2);
        assert!(snapshot.entries().all(|e| e.generation == 2));
    }

    #[tokio::test]
    async fn total_failure_keeps_previous_snapshot() {
        let source = Arc::new(two_categories(1.0));
        let cache = cache_over(source.clone(), Arc::new(SystemClock));
        cache.force_refresh().await.unwrap();

        source.set_failing("currency", true);
        source.set_failing("fragment", true);
        let result = cache.refresh().await;
        assert!(matches!(result, Err(PriceError::NoData { ref failed }) if failed.len() == 2));
        assert_eq!(cache.snapshot().generation(), 1);
        assert_eq!(cache.get_value("Exalted Orb"), Some(1.0));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stale_read_answers_from_old_snapshot_and_refreshes_in_background() {
        let clock = Arc::new(ManualClock::new());
        let source = Arc::new(two_categories(1.0).with_delay(Duration::from_millis(20)));
        let cache = cache_over(source.clone(), clock.clone());
        cache.force_refresh().await.unwrap();

        source.set_category("currency", &[("Chaos Orb", 2.0)]);
        clock.advance(TTL + Duration::from_secs(1));
        assert!(cache.is_stale());

        // Answered immediately from the stale snapshot.
        assert_eq!(cache.get_value("Chaos Orb"), Some(1.0));
        assert!(wait_for_generation(&cache, 2).await);
        assert_eq!(cache.get_value("Chaos Orb"), Some(2.0));
        assert!(!cache.is_stale());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fresh_snapshot_does_not_schedule_refresh() {
        let clock = Arc::new(ManualClock::new());
        let source = Arc::new(two_categories(1.0));
        let cache = cache_over(source, clock.clone());
        cache.force_refresh().await.unwrap();

        clock.advance(TTL - Duration::from_secs(1));
        assert_eq!(cache.get_value("Chaos Orb"), Some(1.0));
        assert!(!cache.is_refreshing());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.snapshot().generation(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn readers_never_observe_mixed_generations() {
        // Every record of refresh round `n` carries the value `n`.
        let source = Arc::new(two_categories(1.0).with_delay(Duration::from_millis(2)));
        let cache = cache_over(source.clone(), Arc::new(SystemClock));
        cache.force_refresh().await.unwrap();
        let stop = Arc::new(AtomicBool::new(false));

        let mut readers = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let stop = stop.clone();
            readers.push(tokio::spawn(async move {
                let mut observed = 0u32;
                while !stop.load(Ordering::Acquire) {
                    let snapshot = cache.snapshot();
                    let round = snapshot.lookup("Chaos Orb").map(|e| e.value);
                    assert!(round.is_some());
                    assert_eq!(snapshot.len(), 3);
                    for entry in snapshot.entries() {
                        assert_eq!(Some(entry.value), round, "mixed refresh rounds");
                        assert_eq!(entry.generation, snapshot.generation());
                    }
                    observed += 1;
                    tokio::task::yield_now().await;
                }
                observed
            }));
        }

        for round in 2..=20u32 {
            let v = f64::from(round);
            source.set_category("currency", &[("Chaos Orb", v), ("Exalted Orb", v)]);
            source.set_category("fragment", &[("Sacrifice at Dawn", v)]);
            let report = cache.refresh().await.unwrap();
            assert!(report.failed.is_empty());
            assert_eq!(cache.snapshot().lookup("Sacrifice at Dawn").map(|e| e.value), Some(v));
        }
        stop.store(true, Ordering::Release);

        for reader in readers {
            assert!(reader.await.unwrap() > 0);
        }
        assert_eq!(cache.get_value("Chaos Orb"), Some(20.0));
    }

    #[test]
    fn without_runtime_stale_reads_still_answer() {
        let cache = cache_over(Arc::new(two_categories(1.0)), Arc::new(SystemClock));
        assert!(cache.is_stale());
        assert_eq!(cache.get_value("Chaos Orb"), None);
        assert!(!cache.is_refreshing());
    }
}
