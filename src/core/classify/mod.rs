//! Classification Engine Module
//!
//! Asynchronously assigns a sensitivity verdict to completed assets by
//! invoking an external classification capability. One outstanding job per
//! asset; jobs are cancellable and retried with bounded backoff.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::core::assets::Sensitivity;
use crate::core::catalog::CatalogStore;
use crate::core::events::{EventBus, VaultEvent};
use crate::core::settings::ClassificationSettings;
use crate::core::{AssetId, CoreError, CoreResult, JobId};

// =============================================================================
// Verdict & Classifier Capability
// =============================================================================

/// Terminal classification verdict
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Verdict {
    Safe,
    Flagged,
}

impl From<Verdict> for Sensitivity {
    fn from(verdict: Verdict) -> Self {
        match verdict {
            Verdict::Safe => Sensitivity::Safe,
            Verdict::Flagged => Sensitivity::Flagged,
        }
    }
}

/// External classification capability (content/appearance/speech analysis).
///
/// The implementation is out of scope here; only the contract matters:
/// classify the byte stream behind `media_ref` within a bounded time, or
/// fail with a retryable [`CoreError::ClassificationFailed`].
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn classify(&self, media_ref: &str) -> CoreResult<Verdict>;
}

// =============================================================================
// Job Handle
// =============================================================================

/// Handle to an outstanding classification job, held for cancellation
struct JobHandle {
    job_id: JobId,
    cancel_tx: oneshot::Sender<()>,
}

// =============================================================================
// Classification Engine
// =============================================================================

/// Drives classification jobs against the catalog store
pub struct ClassificationEngine {
    store: Arc<CatalogStore>,
    classifier: Arc<dyn Classifier>,
    events: EventBus,
    config: ClassificationSettings,
    jobs: Mutex<HashMap<AssetId, JobHandle>>,
}

impl ClassificationEngine {
    /// Creates an engine over the given store and capability
    pub fn new(
        store: Arc<CatalogStore>,
        classifier: Arc<dyn Classifier>,
        events: EventBus,
        config: ClassificationSettings,
    ) -> Self {
        Self {
            store,
            classifier,
            events,
            config,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    /// Admits a classification job for the asset.
    ///
    /// Idempotent: a second enqueue while a job for the same id is
    /// outstanding is a no-op.
    pub fn enqueue(self: &Arc<Self>, id: &AssetId) {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let job_id: JobId = ulid::Ulid::new().to_string();

        {
            let mut jobs = self.jobs.lock().unwrap();
            if jobs.contains_key(id) {
                debug!("Classification already outstanding for asset {}", id);
                return;
            }
            jobs.insert(
                id.clone(),
                JobHandle {
                    job_id: job_id.clone(),
                    cancel_tx,
                },
            );
        }

        info!("Classification job {} enqueued for asset {}", job_id, id);

        let engine = Arc::clone(self);
        let asset_id = id.clone();
        tokio::spawn(async move {
            engine.run_job(asset_id, job_id, cancel_rx).await;
        });
    }

    /// Cancels the outstanding job for the asset, if any.
    ///
    /// Synchronous: once this returns, a late-arriving result for the
    /// cancelled job will be discarded rather than written to the store.
    pub fn cancel(&self, id: &AssetId) -> bool {
        let handle = self.jobs.lock().unwrap().remove(id);
        match handle {
            Some(handle) => {
                // The task may already have finished; a dead receiver is fine.
                let _ = handle.cancel_tx.send(());
                debug!("Classification job {} cancelled for asset {}", handle.job_id, id);
                true
            }
            None => false,
        }
    }

    /// True while a job for the asset is outstanding
    pub fn has_outstanding(&self, id: &AssetId) -> bool {
        self.jobs.lock().unwrap().contains_key(id)
    }

    async fn run_job(&self, id: AssetId, job_id: JobId, mut cancel_rx: oneshot::Receiver<()>) {
        let media_ref = match self.store.get(&id) {
            Ok(asset) if asset.sensitivity == Sensitivity::Analyzing => asset.media_ref,
            Ok(_) => {
                debug!("Asset {} already has a verdict, skipping job {}", id, job_id);
                self.finish(&id, &job_id);
                return;
            }
            Err(_) => {
                debug!("Asset {} gone before job {} started", id, job_id);
                self.finish(&id, &job_id);
                return;
            }
        };

        let mut verdict: Option<Verdict> = None;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_attempts {
            if attempt > 1 {
                // Exponential backoff: base, 2x base, 4x base, ...
                let backoff =
                    Duration::from_millis(self.config.retry_backoff_ms << (attempt - 2).min(16));
                tokio::select! {
                    _ = &mut cancel_rx => {
                        debug!("Job {} cancelled during backoff", job_id);
                        return;
                    }
                    _ = tokio::time::sleep(backoff) => {}
                }
            }

            tokio::select! {
                _ = &mut cancel_rx => {
                    debug!("Job {} cancelled while awaiting classifier", job_id);
                    return;
                }
                result = self.classifier.classify(&media_ref) => match result {
                    Ok(v) => {
                        verdict = Some(v);
                        break;
                    }
                    Err(e) => {
                        warn!(
                            "Classification attempt {}/{} failed for asset {}: {}",
                            attempt, self.config.max_attempts, id, e
                        );
                        last_error = e.to_string();
                    }
                }
            }
        }

        // Retry ceiling exhausted: degrade to Safe rather than leaving the
        // asset stuck at Analyzing, and record the degradation.
        let (resolved, degraded) = match verdict {
            Some(v) => (Sensitivity::from(v), None),
            None => (Sensitivity::Safe, Some(last_error)),
        };

        // A cancel that raced the last attempt must still win: re-check
        // before the final store write commits.
        if matches!(cancel_rx.try_recv(), Ok(())) {
            debug!("Job {} cancelled before commit, verdict discarded", job_id);
            return;
        }

        match self.store.update(&id, |asset| asset.resolve_sensitivity(resolved)) {
            Ok(_) => {
                info!("Asset {} classified as {:?}", id, resolved);
                self.events.emit(VaultEvent::SensitivityResolved {
                    asset_id: id.clone(),
                    sensitivity: resolved,
                });
                if let Some(error) = degraded {
                    warn!(
                        "Classification degraded to safe for asset {} after {} attempt(s): {}",
                        id, self.config.max_attempts, error
                    );
                    self.events.emit(VaultEvent::ClassificationDegraded {
                        asset_id: id.clone(),
                        error,
                    });
                }
            }
            // The asset was deleted while the job ran; the verdict is moot.
            Err(CoreError::NotFound(_)) => {
                debug!("Discarding verdict for deleted asset {}", id);
            }
            Err(e) => {
                error!("Failed to persist verdict for asset {}: {}", id, e);
            }
        }

        self.finish(&id, &job_id);
    }

    /// Removes this job's bookkeeping entry, but only if it is still ours:
    /// a re-armed job for the same asset must not be clobbered.
    fn finish(&self, id: &AssetId, job_id: &JobId) {
        let mut jobs = self.jobs.lock().unwrap();
        if jobs.get(id).map(|h| &h.job_id) == Some(job_id) {
            jobs.remove(id);
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
