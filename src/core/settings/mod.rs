//! Settings Persistence System
//!
//! Persistent vault configuration with:
//! - Atomic file writes (temp file + rename)
//! - Schema validation with defaults
//! - Tolerant normalization of out-of-range values
//!
//! Storage location: {data_dir}/settings.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::core::fs::atomic_write_json_pretty;
use crate::core::CoreResult;

/// Settings schema version for migration support
pub const SETTINGS_VERSION: u32 = 1;

/// Settings file name
pub const SETTINGS_FILE: &str = "settings.json";

// =============================================================================
// Settings
// =============================================================================

/// Vault configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VaultSettings {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Ingestion settings
    #[serde(default)]
    pub ingest: IngestSettings,

    /// Classification settings
    #[serde(default)]
    pub classification: ClassificationSettings,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

impl Default for VaultSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            ingest: IngestSettings::default(),
            classification: ClassificationSettings::default(),
        }
    }
}

impl VaultSettings {
    /// Normalizes and clamps settings so persisted state is always valid.
    ///
    /// Intentionally tolerant: corrects bad values instead of failing, so
    /// an old or hand-edited config never bricks the vault.
    pub fn normalize(&mut self) {
        self.version = SETTINGS_VERSION;

        // At least 1 MiB, at most 8 GiB.
        self.ingest.max_upload_bytes = self
            .ingest
            .max_upload_bytes
            .clamp(1024 * 1024, 8 * 1024 * 1024 * 1024);

        self.ingest.accepted_content_types = self
            .ingest
            .accepted_content_types
            .iter()
            .map(|t| t.trim().to_ascii_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if self.ingest.accepted_content_types.is_empty() {
            warn!("No accepted content types configured, restoring defaults");
            self.ingest.accepted_content_types = default_accepted_content_types();
        }

        self.classification.max_attempts = self.classification.max_attempts.clamp(1, 10);
        self.classification.retry_backoff_ms =
            self.classification.retry_backoff_ms.clamp(10, 60_000);
    }

    /// Loads settings from `{dir}/settings.json`, falling back to defaults
    /// when the file is missing or unreadable.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(SETTINGS_FILE);
        let mut settings = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<VaultSettings>(&contents) {
                Ok(s) => s,
                Err(e) => {
                    warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    VaultSettings::default()
                }
            },
            Err(_) => VaultSettings::default(),
        };
        settings.normalize();
        settings
    }

    /// Persists settings atomically to `{dir}/settings.json`.
    pub fn save(&self, dir: &Path) -> CoreResult<()> {
        let mut normalized = self.clone();
        normalized.normalize();
        atomic_write_json_pretty(&dir.join(SETTINGS_FILE), &normalized)
    }
}

/// Default vault data directory (`{user data dir}/videovault`), falling
/// back to the current directory in sandboxed environments.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("videovault")
}

// =============================================================================
// Ingest Settings
// =============================================================================

/// Upload validation settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IngestSettings {
    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,

    /// Accepted declared media types
    #[serde(default = "default_accepted_content_types")]
    pub accepted_content_types: Vec<String>,
}

/// 500 MiB upload ceiling
fn default_max_upload_bytes() -> u64 {
    500 * 1024 * 1024
}

fn default_accepted_content_types() -> Vec<String> {
    vec!["video/mp4".to_string(), "video/quicktime".to_string()]
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            accepted_content_types: default_accepted_content_types(),
        }
    }
}

impl IngestSettings {
    /// True when the declared media type is accepted
    pub fn accepts(&self, content_type: &str) -> bool {
        let normalized = content_type.trim().to_ascii_lowercase();
        self.accepted_content_types
            .iter()
            .any(|t| t == &normalized)
    }
}

// =============================================================================
// Classification Settings
// =============================================================================

/// Classification retry settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationSettings {
    /// Retry ceiling for the external classification capability
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts; doubles per retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    250
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}
