//! Transit notifications.
//!
//! The perimeter and the file writer publish typed events; the inbox worker and
//! any other listener subscribe independently.

use peerhost_core::models::{
    FileSystemType, InternalDriveFileId, OdinId, TargetDrive, TransferFileType,
};
use tokio::sync::broadcast;
use uuid::Uuid;

const EVENT_CHANNEL_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitEvent {
    /// A transfer was accepted and its inbox item is durable.
    FileReceived {
        file: InternalDriveFileId,
        target_drive: TargetDrive,
        file_system_type: FileSystemType,
        transfer_file_type: TransferFileType,
        sender: OdinId,
    },
    /// A delete-linked-file instruction was queued.
    DeleteLinkedFileReceived {
        drive_id: Uuid,
        global_transit_id: Uuid,
    },
    /// A read receipt was queued.
    ReadReceiptReceived {
        drive_id: Uuid,
        global_transit_id: Uuid,
        reader: OdinId,
    },
    /// A command message was written to its drive.
    CommandMessageReceived {
        file: InternalDriveFileId,
        sender: OdinId,
    },
}

/// Broadcast bus for [`TransitEvent`]s.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TransitEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_SIZE);
        Self { tx }
    }

    /// Publish to current subscribers. Having none is fine.
    pub fn publish(&self, event: TransitEvent) {
        let receivers = self.tx.send(event).unwrap_or(0);
        tracing::trace!(receivers, "Transit event published");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransitEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
