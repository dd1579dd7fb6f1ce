//! `delve-pricing` – reference-price lookups for loot valuation.
//!
//! # Modules
//!
//! - [`record`] – [`PriceRecord`][record::PriceRecord] as served by the feed,
//!   the cached [`PriceEntry`][record::PriceEntry], and the immutable
//!   [`CacheSnapshot`][record::CacheSnapshot] with its three-tier lookup
//!   (exact, case-insensitive, substring).
//! - [`source`] – the [`PriceSource`][source::PriceSource] trait with an
//!   HTTP implementation and an in-memory one for tests and offline runs.
//! - [`cache`] – [`PriceCache`][cache::PriceCache]: the shared cache that
//!   answers from the active snapshot and refreshes it in the background
//!   once it is older than the TTL.

pub mod cache;
pub mod record;
pub mod source;

use thiserror::Error;

pub use cache::{PriceCache, RefreshReport};
pub use record::{CacheSnapshot, MatchTier, PriceEntry, PriceRecord};
pub use source::{HttpPriceSource, PriceSource, StaticPriceSource};

/// Errors raised while fetching reference data.
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Reference data unavailable for category '{category}': {reason}")]
    Unavailable { category: String, reason: String },
    #[error("No price category could be fetched (failed: {failed:?})")]
    NoData { failed: Vec<String> },
}

impl From<PriceError> for delve_types::DelveError {
    fn from(e: PriceError) -> Self {
        match e {
            PriceError::Unavailable { category, reason } => {
                delve_types::DelveError::ExternalDataUnavailable { category, reason }
            }
            other => delve_types::DelveError::ExternalDataUnavailable {
                category: "*".to_string(),
                reason: other.to_string(),
            },
        }
    }
}
