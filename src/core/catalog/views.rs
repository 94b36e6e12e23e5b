//! Catalog View Module
//!
//! Read-only derived views over the catalog store for display and summary
//! purposes. Stateless between calls: every answer is computed from a
//! fresh store snapshot, never cached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::assets::{Sensitivity, VideoAsset};
use crate::core::catalog::CatalogStore;

// =============================================================================
// Filter
// =============================================================================

/// Catalog list filter
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CatalogFilter {
    /// Every record
    #[default]
    All,
    /// Records classified safe
    Safe,
    /// Records classified flagged
    Flagged,
    /// Records whose upload is still in flight
    Processing,
}

impl CatalogFilter {
    /// Parses a filter name. Unknown values fall back to `All` — a
    /// permissive default, deliberately not an error.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "safe" => CatalogFilter::Safe,
            "flagged" => CatalogFilter::Flagged,
            "processing" => CatalogFilter::Processing,
            _ => CatalogFilter::All,
        }
    }

    /// True when the asset matches this filter
    pub fn matches(&self, asset: &VideoAsset) -> bool {
        match self {
            CatalogFilter::All => true,
            CatalogFilter::Safe => asset.sensitivity == Sensitivity::Safe,
            CatalogFilter::Flagged => asset.sensitivity == Sensitivity::Flagged,
            CatalogFilter::Processing => asset.is_processing(),
        }
    }
}

// =============================================================================
// Summary Stats
// =============================================================================

/// Catalog summary counters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    /// Total number of records
    pub total: usize,
    /// Records still processing
    pub processing_count: usize,
    /// Records classified flagged
    pub flagged_count: usize,
}

// =============================================================================
// View Service
// =============================================================================

/// Read-only view service over a catalog store
#[derive(Clone)]
pub struct CatalogView {
    store: Arc<CatalogStore>,
}

impl CatalogView {
    /// Creates a view over the given store
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self { store }
    }

    /// Returns the catalog filtered by the predicate, most-recent-first
    pub fn list_filtered(&self, filter: CatalogFilter) -> Vec<VideoAsset> {
        self.store
            .list()
            .into_iter()
            .filter(|asset| filter.matches(asset))
            .collect()
    }

    /// Computes summary counters from the current store snapshot
    pub fn summary_stats(&self) -> CatalogStats {
        let assets = self.store.list();
        CatalogStats {
            total: assets.len(),
            processing_count: assets.iter().filter(|a| a.is_processing()).count(),
            flagged_count: assets
                .iter()
                .filter(|a| a.sensitivity == Sensitivity::Flagged)
                .count(),
        }
    }
}
