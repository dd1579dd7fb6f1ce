//! Reference-price feeds.
//!
//! A [`PriceSource`] returns the records of one category per call.  The
//! cache fetches every configured category through it and treats each call
//! independently: one failing category never aborts the others.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::PriceError;
use crate::record::PriceRecord;

/// A request/response feed of categorized price records.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch every record of `category`.
    async fn fetch_category(&self, category: &str) -> Result<Vec<PriceRecord>, PriceError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// HttpPriceSource
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches `GET {base_url}/{category}`, expecting a JSON array of
/// `{ "name": ..., "value": ..., "category": ... }` records.
pub struct HttpPriceSource {
    base_url: String,
    client: reqwest::Client,
}

impl HttpPriceSource {
    /// Create a source rooted at `base_url` with a per-request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`PriceError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PriceError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    fn category_url(&self, category: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), category)
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn fetch_category(&self, category: &str) -> Result<Vec<PriceRecord>, PriceError> {
        let url = self.category_url(category);
        debug!(%url, "fetching price category");
        let mut records: Vec<PriceRecord> = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        for record in records.iter_mut().filter(|r| r.category.is_empty()) {
            record.category = category.to_string();
        }
        Ok(records)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// StaticPriceSource
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory feed for tests and offline runs.
///
/// Categories can be replaced or marked failing between refreshes, and an
/// artificial delay makes every fetch slow enough to overlap with readers.
#[derive(Default)]
pub struct StaticPriceSource {
    categories: Mutex<HashMap<String, Vec<PriceRecord>>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
}

impl StaticPriceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_category`][Self::set_category].
    pub fn with_category(self, category: &str, records: &[(&str, f64)]) -> Self {
        self.set_category(category, records);
        self
    }

    /// Delay every fetch by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the records served for `category`.
    pub fn set_category(&self, category: &str, records: &[(&str, f64)]) {
        let records = records
            .iter()
            .map(|(name, value)| PriceRecord::new(*name, *value, category))
            .collect();
        self.categories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(category.to_string(), records);
    }

    /// Make fetches of `category` fail (or succeed again).
    pub fn set_failing(&self, category: &str, failing: bool) {
        let mut set = self.failing.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            set.insert(category.to_string());
        } else {
            set.remove(category);
        }
    }
}

#[async_trait]
impl PriceSource for StaticPriceSource {
    async fn fetch_category(&self, category: &str) -> Result<Vec<PriceRecord>, PriceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(category)
        {
            return Err(PriceError::Unavailable {
                category: category.to_string(),
                reason: "source marked failing".to_string(),
            });
        }
        self.categories
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(category)
            .cloned()
            .ok_or_else(|| PriceError::Unavailable {
                category: category.to_string(),
                reason: "unknown category".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_url_joins_without_double_slash() {
        let source = HttpPriceSource::new("http://prices.local/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(source.category_url("currency"), "http://prices.local/api/currency");
    }

    #[tokio::test]
    async fn http_source_reports_error_when_server_unavailable() {
        // Port 9 (discard) is closed on test machines; the request must fail, not panic.
        let source = HttpPriceSource::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let result = source.fetch_category("currency").await;
        assert!(matches!(result, Err(PriceError::Http(_))));
    }

    #[tokio::test]
    async fn static_source_serves_and_fails_on_demand() {
        let source = StaticPriceSource::new().with_category("currency", &[("Chaos Orb", 1.0)]);
        let records = source.fetch_category("currency").await.unwrap();
        assert_eq!(records, vec![PriceRecord::new("Chaos Orb", 1.0, "currency")]);

        source.set_failing("currency", true);
        assert!(matches!(
            source.fetch_category("currency").await,
            Err(PriceError::Unavailable { .. })
        ));
        assert!(source.fetch_category("unknown").await.is_err());
    }
}
