//! Vault Facade
//!
//! Wires the catalog store, ingestor, classification engine, views, and
//! event bus into one coordinated surface. Cross-cutting orderings live
//! here, most importantly: deleting an asset cancels its classification
//! job before the record is removed.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::core::assets::{AssetStatus, Sensitivity, VideoAsset};
use crate::core::catalog::{CatalogFilter, CatalogStats, CatalogStore, CatalogView};
use crate::core::classify::{ClassificationEngine, Classifier};
use crate::core::events::{EventBus, VaultEvent};
use crate::core::ingest::{AdvanceOutcome, Ingestor, LocalBlobStore, MediaTransfer, UploadRequest};
use crate::core::settings::VaultSettings;
use crate::core::{AssetId, CoreError, CoreResult};

/// Catalog database file name inside the vault data directory
pub const CATALOG_DB_FILE: &str = "catalog.db";

/// Media blob directory name inside the vault data directory
pub const MEDIA_DIR: &str = "media";

/// What startup recovery did to the catalog
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// In-flight uploads marked failed because the process restarted
    pub failed_uploads: usize,
    /// Completed-but-unclassified assets whose jobs were re-admitted
    pub resumed_classifications: usize,
}

/// The video vault: one facade over the whole asset lifecycle
pub struct VideoVault {
    store: Arc<CatalogStore>,
    engine: Arc<ClassificationEngine>,
    ingestor: Ingestor,
    view: CatalogView,
    events: EventBus,
    settings: VaultSettings,
}

impl VideoVault {
    /// Opens a durable vault rooted at `data_dir`.
    ///
    /// Loads settings, opens the catalog database, allocates the media blob
    /// directory, and runs startup recovery over the loaded records.
    ///
    /// Recovery may re-admit classification jobs, so this must be called
    /// from within a Tokio runtime.
    pub fn open(data_dir: &Path, classifier: Arc<dyn Classifier>) -> CoreResult<Self> {
        std::fs::create_dir_all(data_dir)?;
        let settings = VaultSettings::load(data_dir);
        let store = Arc::new(CatalogStore::open(&data_dir.join(CATALOG_DB_FILE))?);
        let blobs: Arc<dyn MediaTransfer> =
            Arc::new(LocalBlobStore::new(data_dir.join(MEDIA_DIR))?);

        let vault = Self::assemble(store, classifier, blobs, settings);
        let report = vault.recover()?;
        if report != RecoveryReport::default() {
            info!(
                "Startup recovery: {} upload(s) marked failed, {} classification(s) resumed",
                report.failed_uploads, report.resumed_classifications
            );
        }
        Ok(vault)
    }

    /// Opens an ephemeral vault with the given transport. State is lost on
    /// drop; recovery is not run.
    pub fn in_memory(
        classifier: Arc<dyn Classifier>,
        transfer: Arc<dyn MediaTransfer>,
    ) -> CoreResult<Self> {
        let store = Arc::new(CatalogStore::in_memory()?);
        Ok(Self::assemble(
            store,
            classifier,
            transfer,
            VaultSettings::default(),
        ))
    }

    fn assemble(
        store: Arc<CatalogStore>,
        classifier: Arc<dyn Classifier>,
        transfer: Arc<dyn MediaTransfer>,
        settings: VaultSettings,
    ) -> Self {
        let events = EventBus::default();
        let engine = Arc::new(ClassificationEngine::new(
            Arc::clone(&store),
            classifier,
            events.clone(),
            settings.classification.clone(),
        ));
        let ingestor = Ingestor::new(
            Arc::clone(&store),
            Arc::clone(&engine),
            events.clone(),
            settings.ingest.clone(),
            transfer,
        );
        let view = CatalogView::new(Arc::clone(&store));
        Self {
            store,
            engine,
            ingestor,
            view,
            events,
            settings,
        }
    }

    /// Current vault settings
    pub fn settings(&self) -> &VaultSettings {
        &self.settings
    }

    /// Subscribes to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.events.subscribe()
    }

    // -------------------------------------------------------------------------
    // Ingestion
    // -------------------------------------------------------------------------

    /// Validates and admits an upload; see [`Ingestor::begin`]
    pub fn begin_upload(&self, request: &UploadRequest) -> CoreResult<VideoAsset> {
        self.ingestor.begin(request)
    }

    /// Applies a progress increment to an in-flight upload
    pub fn advance_upload(&self, id: &AssetId, delta_pct: u8) -> CoreResult<AdvanceOutcome> {
        self.ingestor.advance(id, delta_pct)
    }

    /// Marks an in-flight upload as failed
    pub fn fail_upload(&self, id: &AssetId, reason: &str) -> CoreResult<()> {
        self.ingestor.fail(id, reason)
    }

    /// Runs the transport for an admitted upload to completion
    pub async fn run_transfer(&self, id: &AssetId, request: &UploadRequest) -> CoreResult<()> {
        self.ingestor.run_transfer(id, request).await
    }

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    /// Returns one record by id
    pub fn get_asset(&self, id: &AssetId) -> CoreResult<VideoAsset> {
        self.store.get(id)
    }

    /// Returns the catalog filtered by the predicate, most-recent-first
    pub fn list_catalog(&self, filter: CatalogFilter) -> Vec<VideoAsset> {
        self.view.list_filtered(filter)
    }

    /// Computes summary counters from the live catalog
    pub fn summary_stats(&self) -> CatalogStats {
        self.view.summary_stats()
    }

    /// Renames an asset. The title must be non-empty after trimming.
    pub fn set_title(&self, id: &AssetId, title: &str) -> CoreResult<VideoAsset> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Err(CoreError::Internal("title must not be empty".to_string()));
        }
        let title = trimmed.to_string();
        self.store.update(id, move |asset| asset.title = title)
    }

    /// Records probed media metadata on an asset
    pub fn set_media_metadata(
        &self,
        id: &AssetId,
        duration_sec: Option<u64>,
        thumbnail_url: Option<String>,
    ) -> CoreResult<VideoAsset> {
        self.store.update(id, move |asset| {
            if duration_sec.is_some() {
                asset.duration_sec = duration_sec;
            }
            if thumbnail_url.is_some() {
                asset.thumbnail_url = thumbnail_url;
            }
        })
    }

    /// Deletes an asset at any lifecycle stage.
    ///
    /// The classification job (if any) is cancelled before the record is
    /// removed, so a late verdict can never resurrect the row.
    pub fn delete_asset(&self, id: &AssetId) -> CoreResult<()> {
        if self.engine.cancel(id) {
            info!("Cancelled outstanding classification for asset {}", id);
        }
        self.store.delete(id)?;
        self.events.emit(VaultEvent::AssetDeleted {
            asset_id: id.clone(),
        });
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Recovery
    // -------------------------------------------------------------------------

    /// Reconciles loaded records with the fact that no transfer or job
    /// survived the restart:
    /// - records still marked processing are failed, since their transfer
    ///   is gone;
    /// - completed records still awaiting a verdict get their
    ///   classification job re-admitted.
    pub fn recover(&self) -> CoreResult<RecoveryReport> {
        let mut report = RecoveryReport::default();
        for asset in self.store.list() {
            if asset.is_processing() {
                warn!("Upload for asset {} did not survive restart", asset.id);
                self.ingestor.fail(&asset.id, "interrupted by restart")?;
                report.failed_uploads += 1;
            } else if asset.status == AssetStatus::Completed
                && asset.sensitivity == Sensitivity::Analyzing
            {
                self.engine.enqueue(&asset.id);
                report.resumed_classifications += 1;
            }
        }
        Ok(report)
    }
}
