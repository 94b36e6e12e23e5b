//! Asset Model Definitions
//!
//! Defines the VideoAsset entity and its two state machines: processing
//! status and content-sensitivity classification.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::{AssetId, PROGRESS_COMPLETE};

// =============================================================================
// Status State Machine
// =============================================================================

/// Processing status of an asset.
///
/// Upload progress lives inside the `Processing` variant, so the
/// "progress present iff processing" invariant is enforced by the type
/// rather than checked at runtime. Progress only ever increases; it hits
/// 100 exactly once, at the transition out of `Processing`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AssetStatus {
    /// Upload in flight. Sole initial state.
    Processing { progress_pct: u8 },
    /// Upload finished; the asset is playable. Terminal.
    Completed,
    /// Validation or transfer error ended the upload. Terminal.
    Failed { error: String },
}

impl AssetStatus {
    /// True while the upload is still in flight
    pub fn is_processing(&self) -> bool {
        matches!(self, AssetStatus::Processing { .. })
    }

    /// True once the status can no longer change
    pub fn is_terminal(&self) -> bool {
        !self.is_processing()
    }

    /// Current upload progress, present only while processing
    pub fn progress_pct(&self) -> Option<u8> {
        match self {
            AssetStatus::Processing { progress_pct } => Some(*progress_pct),
            _ => None,
        }
    }
}

// =============================================================================
// Sensitivity State Machine
// =============================================================================

/// Content-sensitivity classification of an asset.
///
/// `Analyzing` is only valid while a classification job for the asset is
/// outstanding (or about to be armed); once a job concludes the verdict is
/// permanent for the asset's current content.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sensitivity {
    /// Classification pending or in flight
    Analyzing,
    /// Verdict: no sensitive content found
    Safe,
    /// Verdict: sensitive content found
    Flagged,
}

// =============================================================================
// Video Asset
// =============================================================================

/// One tracked video and its metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoAsset {
    /// Unique identifier (ULID), immutable
    pub id: AssetId,
    /// Display title; defaults to the filename stem, user-editable
    pub title: String,
    /// Original upload name, immutable
    pub filename: String,
    /// File size in bytes, immutable
    pub size_bytes: u64,
    /// Ingestion timestamp (RFC 3339), immutable
    pub uploaded_at: String,
    /// Processing status state machine
    pub status: AssetStatus,
    /// Sensitivity classification state machine
    pub sensitivity: Sensitivity,
    /// Duration in seconds; absent until metadata extraction completes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u64>,
    /// Thumbnail URI; absent while unknown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    /// Reference to the retrievable byte stream
    pub media_ref: String,
}

/// Derives a default title from an upload filename (extension stripped).
pub fn title_from_filename(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| filename.to_string())
}

impl VideoAsset {
    /// Creates a newly ingested asset with a generated ULID.
    ///
    /// New assets always enter at `Processing { progress_pct: 0 }` with
    /// sensitivity `Analyzing`; classification is armed only once the
    /// upload completes.
    pub fn new(filename: &str, size_bytes: u64, media_ref: &str) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            title: title_from_filename(filename),
            filename: filename.to_string(),
            size_bytes,
            uploaded_at: chrono::Utc::now().to_rfc3339(),
            status: AssetStatus::Processing { progress_pct: 0 },
            sensitivity: Sensitivity::Analyzing,
            duration_sec: None,
            thumbnail_url: None,
            media_ref: media_ref.to_string(),
        }
    }

    /// Sets the display title (builder pattern)
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// Sets the duration (builder pattern)
    pub fn with_duration(mut self, duration_sec: u64) -> Self {
        self.duration_sec = Some(duration_sec);
        self
    }

    /// Sets the thumbnail URI (builder pattern)
    pub fn with_thumbnail_url(mut self, url: &str) -> Self {
        self.thumbnail_url = Some(url.to_string());
        self
    }

    /// Applies an upload progress increment, clamped to 100.
    ///
    /// Returns the new percentage, or `None` when the asset is not
    /// processing (terminal statuses ignore progress). Reaching 100 flips
    /// the status to `Completed` in the same mutation, which drops the
    /// progress field entirely.
    pub fn apply_progress(&mut self, delta_pct: u8) -> Option<u8> {
        match &mut self.status {
            AssetStatus::Processing { progress_pct } => {
                let next = progress_pct.saturating_add(delta_pct).min(PROGRESS_COMPLETE);
                *progress_pct = next;
                if next >= PROGRESS_COMPLETE {
                    self.status = AssetStatus::Completed;
                }
                Some(next)
            }
            _ => None,
        }
    }

    /// Marks the upload as failed.
    ///
    /// Returns false (and leaves the record untouched) when the status is
    /// already terminal.
    pub fn mark_failed(&mut self, reason: &str) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = AssetStatus::Failed {
            error: reason.to_string(),
        };
        true
    }

    /// Commits a classification verdict
    pub fn resolve_sensitivity(&mut self, verdict: Sensitivity) {
        self.sensitivity = verdict;
    }

    /// True while the upload is in flight
    pub fn is_processing(&self) -> bool {
        self.status.is_processing()
    }

    /// Current upload progress, present iff processing
    pub fn progress_pct(&self) -> Option<u8> {
        self.status.progress_pct()
    }
}
