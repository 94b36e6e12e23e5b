//! Ingestion Module
//!
//! Validates upload requests, admits records into the catalog, and drives
//! transfer progress through the upload state machine. Completion of an
//! upload is the single place a classification job gets admitted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::assets::VideoAsset;
use crate::core::catalog::CatalogStore;
use crate::core::classify::ClassificationEngine;
use crate::core::events::{EventBus, VaultEvent};
use crate::core::fs::{sanitize_filename, validate_path_id_component};
use crate::core::settings::IngestSettings;
use crate::core::{AssetId, CoreError, CoreResult, PROGRESS_COMPLETE};

/// Scheme prefix for media references handed out by blob stores
pub const BLOB_SCHEME: &str = "blob://";

// =============================================================================
// Upload Request & Validation
// =============================================================================

/// A request to ingest one video file
#[derive(Clone, Debug)]
pub struct UploadRequest {
    /// Original file name as presented by the caller
    pub filename: String,
    /// Declared media type, e.g. `video/mp4`
    pub content_type: String,
    /// Declared size in bytes
    pub size_bytes: u64,
    /// Local path to read the bytes from, when the transport is file-based
    pub source_path: Option<PathBuf>,
}

impl UploadRequest {
    pub fn new(filename: &str, content_type: &str, size_bytes: u64) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            size_bytes,
            source_path: None,
        }
    }

    pub fn with_source_path(mut self, path: PathBuf) -> Self {
        self.source_path = Some(path);
        self
    }
}

/// Checks a request against the configured limits without touching any
/// state. Rejection here means nothing was recorded anywhere.
pub fn validate(request: &UploadRequest, settings: &IngestSettings) -> CoreResult<()> {
    if !settings.accepts(&request.content_type) {
        return Err(CoreError::UnsupportedType(request.content_type.clone()));
    }
    if request.size_bytes > settings.max_upload_bytes {
        return Err(CoreError::TooLarge {
            size_bytes: request.size_bytes,
            max_bytes: settings.max_upload_bytes,
        });
    }
    Ok(())
}

// =============================================================================
// Media Transfer Capability
// =============================================================================

/// Outcome of one progress advance
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Upload still in flight at the given cumulative percentage
    Advanced(u8),
    /// This advance crossed the completion threshold
    Completed,
    /// The record is terminal or gone; the tick was dropped
    Ignored,
}

/// Transport that moves upload bytes into durable media storage.
///
/// `allocate` is called once at admission and must return a stable media
/// reference; `transfer` later moves the bytes behind that reference,
/// reporting cumulative progress as percentage increments.
#[async_trait]
pub trait MediaTransfer: Send + Sync {
    fn allocate(&self, asset_id: &AssetId, filename: &str) -> String;

    async fn transfer(
        &self,
        request: &UploadRequest,
        media_ref: &str,
        progress: mpsc::Sender<u8>,
    ) -> CoreResult<()>;
}

// =============================================================================
// Local Blob Store
// =============================================================================

/// File-backed media storage under a single root directory
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf) -> CoreResult<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Resolves a media reference to its backing path
    pub fn resolve(&self, media_ref: &str) -> CoreResult<PathBuf> {
        let name = media_ref.strip_prefix(BLOB_SCHEME).ok_or_else(|| {
            CoreError::TransferFailed(format!("unrecognized media reference: {}", media_ref))
        })?;
        validate_path_id_component(name, "media reference")?;
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl MediaTransfer for LocalBlobStore {
    fn allocate(&self, asset_id: &AssetId, filename: &str) -> String {
        format!("{}{}_{}", BLOB_SCHEME, asset_id, sanitize_filename(filename))
    }

    async fn transfer(
        &self,
        request: &UploadRequest,
        media_ref: &str,
        progress: mpsc::Sender<u8>,
    ) -> CoreResult<()> {
        let source = request.source_path.as_ref().ok_or_else(|| {
            CoreError::TransferFailed("local transfer requires a source path".to_string())
        })?;
        let dest = self.resolve(media_ref)?;

        // Copy into a temp file first so a crashed transfer never leaves a
        // half-written blob behind the media reference.
        let tmp = self.root.join(format!(".{}.part", uuid::Uuid::new_v4()));
        let mut reader = tokio::fs::File::open(source).await?;
        let mut writer = tokio::fs::File::create(&tmp).await?;

        let total = request.size_bytes.max(1);
        let mut copied: u64 = 0;
        let mut reported: u8 = 0;
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n]).await?;
            copied += n as u64;

            let pct = ((copied.min(total) * 100) / total) as u8;
            if pct > reported {
                let _ = progress.send(pct - reported).await;
                reported = pct;
            }
        }

        writer.sync_all().await?;
        drop(writer);
        tokio::fs::rename(&tmp, &dest).await?;

        if reported < PROGRESS_COMPLETE {
            let _ = progress.send(PROGRESS_COMPLETE - reported).await;
        }
        Ok(())
    }
}

// =============================================================================
// Simulated Transfer
// =============================================================================

/// Synthetic transport that ticks progress without moving bytes.
///
/// Useful for demos and tests: the default emits ten 10% increments.
pub struct SimulatedTransfer {
    pub increments: Vec<u8>,
    pub step_delay: Duration,
    /// Fail with a transport error before sending the increment at this index
    pub fail_at: Option<usize>,
}

impl Default for SimulatedTransfer {
    fn default() -> Self {
        Self {
            increments: vec![10; 10],
            step_delay: Duration::ZERO,
            fail_at: None,
        }
    }
}

#[async_trait]
impl MediaTransfer for SimulatedTransfer {
    fn allocate(&self, asset_id: &AssetId, filename: &str) -> String {
        format!("{}{}_{}", BLOB_SCHEME, asset_id, sanitize_filename(filename))
    }

    async fn transfer(
        &self,
        _request: &UploadRequest,
        _media_ref: &str,
        progress: mpsc::Sender<u8>,
    ) -> CoreResult<()> {
        for (index, delta) in self.increments.iter().enumerate() {
            if self.fail_at == Some(index) {
                return Err(CoreError::TransferFailed(
                    "simulated transport failure".to_string(),
                ));
            }
            if !self.step_delay.is_zero() {
                tokio::time::sleep(self.step_delay).await;
            }
            let _ = progress.send(*delta).await;
        }
        Ok(())
    }
}

// =============================================================================
// Ingestor
// =============================================================================

/// Admits uploads into the catalog and drives them to completion
pub struct Ingestor {
    store: Arc<CatalogStore>,
    engine: Arc<ClassificationEngine>,
    events: EventBus,
    settings: IngestSettings,
    transfer: Arc<dyn MediaTransfer>,
}

impl Ingestor {
    pub fn new(
        store: Arc<CatalogStore>,
        engine: Arc<ClassificationEngine>,
        events: EventBus,
        settings: IngestSettings,
        transfer: Arc<dyn MediaTransfer>,
    ) -> Self {
        Self {
            store,
            engine,
            events,
            settings,
            transfer,
        }
    }

    /// Validates the request and admits a new record in the processing
    /// state. Nothing is recorded when validation fails.
    pub fn begin(&self, request: &UploadRequest) -> CoreResult<VideoAsset> {
        validate(request, &self.settings)?;

        let mut asset = VideoAsset::new(&request.filename, request.size_bytes, "");
        asset.media_ref = self.transfer.allocate(&asset.id, &request.filename);
        let snapshot = asset.clone();
        self.store.put(asset)?;

        info!(
            "Upload admitted: asset {} ({}, {} bytes)",
            snapshot.id, snapshot.filename, snapshot.size_bytes
        );
        Ok(snapshot)
    }

    /// Applies a cumulative progress increment.
    ///
    /// Ticks for terminal or deleted records are dropped, never errors.
    /// Crossing 100% flips the record to completed and admits the
    /// classification job.
    pub fn advance(&self, id: &AssetId, delta_pct: u8) -> CoreResult<AdvanceOutcome> {
        let mut outcome = AdvanceOutcome::Ignored;
        match self.store.update(id, |asset| {
            outcome = match asset.apply_progress(delta_pct) {
                Some(PROGRESS_COMPLETE) => AdvanceOutcome::Completed,
                Some(pct) => AdvanceOutcome::Advanced(pct),
                None => AdvanceOutcome::Ignored,
            };
        }) {
            Ok(_) => {}
            Err(CoreError::NotFound(_)) => {
                debug!("Dropping progress tick for unknown asset {}", id);
                return Ok(AdvanceOutcome::Ignored);
            }
            Err(e) => return Err(e),
        }

        match outcome {
            AdvanceOutcome::Advanced(pct) => {
                self.events.emit(VaultEvent::UploadProgress {
                    asset_id: id.clone(),
                    progress_pct: pct,
                });
            }
            AdvanceOutcome::Completed => {
                info!("Upload completed for asset {}", id);
                self.events.emit(VaultEvent::UploadCompleted {
                    asset_id: id.clone(),
                });
                self.engine.enqueue(id);
            }
            AdvanceOutcome::Ignored => {}
        }
        Ok(outcome)
    }

    /// Marks an in-flight upload as failed with the given reason.
    ///
    /// A failure report for a record that already reached a terminal state
    /// (or was deleted) is dropped.
    pub fn fail(&self, id: &AssetId, reason: &str) -> CoreResult<()> {
        let mut marked = false;
        match self.store.update(id, |asset| {
            marked = asset.mark_failed(reason);
        }) {
            Ok(_) => {
                if marked {
                    warn!("Upload failed for asset {}: {}", id, reason);
                    self.events.emit(VaultEvent::UploadFailed {
                        asset_id: id.clone(),
                        error: reason.to_string(),
                    });
                } else {
                    debug!("Dropping failure report for terminal asset {}", id);
                }
                Ok(())
            }
            Err(CoreError::NotFound(_)) => {
                debug!("Dropping failure report for unknown asset {}", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Runs the transport for an admitted upload, feeding its progress
    /// ticks through the state machine. A transport error marks the record
    /// failed and is returned to the caller.
    pub async fn run_transfer(&self, id: &AssetId, request: &UploadRequest) -> CoreResult<()> {
        let media_ref = self.store.get(id)?.media_ref;
        let (tx, mut rx) = mpsc::channel::<u8>(32);

        let fut = self.transfer.transfer(request, &media_ref, tx);
        tokio::pin!(fut);

        let mut result: Option<CoreResult<()>> = None;
        let mut rx_open = true;
        loop {
            tokio::select! {
                r = &mut fut, if result.is_none() => result = Some(r),
                maybe = rx.recv(), if rx_open => match maybe {
                    Some(delta) => {
                        self.advance(id, delta)?;
                    }
                    None => rx_open = false,
                },
                else => break,
            }
        }

        match result.unwrap_or(Ok(())) {
            Ok(()) => {
                // Transports report by size estimate; top up if the final
                // tick landed short of the threshold.
                if let Ok(asset) = self.store.get(id) {
                    if asset.is_processing() {
                        self.advance(id, PROGRESS_COMPLETE)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                self.fail(id, &e.to_string())?;
                Err(e)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
