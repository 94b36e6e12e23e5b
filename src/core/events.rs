//! Event Broadcasting Module
//!
//! Fans out pipeline state changes (upload progress, terminal statuses,
//! classification verdicts) to any number of subscribers. The presentation
//! layer drives its progress UI from this stream.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::assets::Sensitivity;
use crate::core::AssetId;

/// Default broadcast channel capacity. Slow subscribers that fall further
/// behind than this are lagged, not blocked.
pub const EVENT_CAPACITY: usize = 256;

// =============================================================================
// Event Types
// =============================================================================

/// Pipeline event emitted on the vault's broadcast bus
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum VaultEvent {
    /// Upload progress advanced for an asset still in Processing
    UploadProgress { asset_id: AssetId, progress_pct: u8 },
    /// Upload reached 100% and the asset transitioned to Completed
    UploadCompleted { asset_id: AssetId },
    /// Upload transfer failed and the asset transitioned to Failed
    UploadFailed { asset_id: AssetId, error: String },
    /// Classification concluded with a verdict
    SensitivityResolved {
        asset_id: AssetId,
        sensitivity: Sensitivity,
    },
    /// Classification retries were exhausted and the asset degraded to Safe
    ClassificationDegraded { asset_id: AssetId, error: String },
    /// Asset removed from the catalog
    AssetDeleted { asset_id: AssetId },
}

impl VaultEvent {
    /// The asset this event concerns.
    pub fn asset_id(&self) -> &AssetId {
        match self {
            VaultEvent::UploadProgress { asset_id, .. }
            | VaultEvent::UploadCompleted { asset_id }
            | VaultEvent::UploadFailed { asset_id, .. }
            | VaultEvent::SensitivityResolved { asset_id, .. }
            | VaultEvent::ClassificationDegraded { asset_id, .. }
            | VaultEvent::AssetDeleted { asset_id } => asset_id,
        }
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast bus for [`VaultEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<VaultEvent>,
}

impl EventBus {
    /// Creates a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribes to all subsequent events
    pub fn subscribe(&self) -> broadcast::Receiver<VaultEvent> {
        self.tx.subscribe()
    }

    /// Emits an event. Having no subscribers is not an error.
    pub fn emit(&self, event: VaultEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_receives_emitted_events() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();

        bus.emit(VaultEvent::UploadProgress {
            asset_id: "a1".to_string(),
            progress_pct: 40,
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.asset_id(), "a1");
        assert!(matches!(
            event,
            VaultEvent::UploadProgress { progress_pct: 40, .. }
        ));
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = EventBus::default();
        bus.emit(VaultEvent::UploadCompleted {
            asset_id: "a1".to_string(),
        });
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = VaultEvent::SensitivityResolved {
            asset_id: "a1".to_string(),
            sensitivity: Sensitivity::Flagged,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "sensitivityResolved");
        assert_eq!(json["assetId"], "a1");
        assert_eq!(json["sensitivity"], "flagged");
    }
}
