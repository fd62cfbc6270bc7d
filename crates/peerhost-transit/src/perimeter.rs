//! Transit perimeter: the receiving side of a peer transfer.
//!
//! A transfer is initialized from its instruction set, then fed its parts in
//! protocol order (key header, metadata, payload). Each part is written to temp
//! storage and filtered. Finalizing either queues the transfer in the inbox or
//! drops it as rejected or quarantined.
//!
//! Ownership of a transfer's temp storage moves with its state item. Whoever
//! removes the item from the tracker (finalize or discard) is responsible for the
//! temp files, so cleanup runs exactly once.

use crate::events::{EventBus, TransitEvent};
use crate::filter::{FilterContext, FilterPipeline};
use crate::inbox::InboxStorage;
use crate::key_exchange::KeyExchange;
use crate::state::{IncomingTransferStateItem, PartState, TransferStateTracker};
use peerhost_core::models::{
    DeleteLinkedFileRequest, EncryptedRecipientTransferInstructionSet, FilterAction,
    HostTransitResponse, InternalDriveFileId, MarkFileAsReadRequest, MultipartPart, OdinId,
    TargetDrive, TransferInboxItem, TransitResponseCode,
};
use peerhost_core::AppError;
use peerhost_storage::{DriveFileSystem, PartReader};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

#[derive(Clone)]
pub struct TransitPerimeterService {
    tracker: Arc<TransferStateTracker>,
    pipeline: Arc<FilterPipeline>,
    key_exchange: Arc<dyn KeyExchange>,
    drives: Arc<dyn DriveFileSystem>,
    inbox: Arc<dyn InboxStorage>,
    events: EventBus,
    retain_quarantined: bool,
}

impl TransitPerimeterService {
    pub fn new(
        tracker: Arc<TransferStateTracker>,
        pipeline: FilterPipeline,
        key_exchange: Arc<dyn KeyExchange>,
        drives: Arc<dyn DriveFileSystem>,
        inbox: Arc<dyn InboxStorage>,
        events: EventBus,
    ) -> Self {
        Self {
            tracker,
            pipeline: Arc::new(pipeline),
            key_exchange,
            drives,
            inbox,
            events,
            retain_quarantined: false,
        }
    }

    /// Keep the temp files of quarantined transfers for review.
    pub fn with_retain_quarantined(mut self, retain: bool) -> Self {
        self.retain_quarantined = retain;
        self
    }

    pub fn tracker(&self) -> &TransferStateTracker {
        &self.tracker
    }

    /// Validate the instruction set and open a transfer. Returns its id.
    #[tracing::instrument(
        skip(self, instruction_set),
        fields(sender = %sender, crc = instruction_set.public_key_crc)
    )]
    pub async fn initialize_incoming_transfer(
        &self,
        sender: &OdinId,
        instruction_set: EncryptedRecipientTransferInstructionSet,
    ) -> Result<Uuid, AppError> {
        if instruction_set.public_key_crc == 0 {
            return Err(AppError::InvalidInstructionSet(
                "Public key CRC is missing".to_string(),
            ));
        }

        let key_header = &instruction_set.shared_secret_encrypted_key_header;
        if key_header.iv.is_empty() || key_header.encrypted_aes_key.is_empty() {
            return Err(AppError::InvalidInstructionSet(
                "Encrypted key header is empty".to_string(),
            ));
        }

        if !self
            .key_exchange
            .is_valid_public_key(instruction_set.public_key_crc)
            .await
        {
            return Err(AppError::InvalidInstructionSet(format!(
                "Public key {} is unknown or expired",
                instruction_set.public_key_crc
            )));
        }

        let drive_id = self
            .drives
            .get_drive_id(&instruction_set.target_drive)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInstructionSet(format!(
                    "Target drive {} not found",
                    instruction_set.target_drive
                ))
            })?;

        let temp_file = InternalDriveFileId::new(drive_id, Uuid::new_v4());
        let item = IncomingTransferStateItem::new(sender.clone(), temp_file, instruction_set);
        let transfer_id = self.tracker.insert(item).await;

        tracing::info!(transfer_id = %transfer_id, temp_file = %temp_file, "Transfer initialized");
        Ok(transfer_id)
    }

    /// Arm abort cleanup for `transfer_id`.
    pub fn guard(&self, transfer_id: Uuid) -> TransferGuard {
        TransferGuard {
            service: self.clone(),
            transfer_id,
            armed: true,
        }
    }

    /// Store one part and run it through the filters.
    ///
    /// An out-of-order part is a protocol error and ends the transfer. A part
    /// arriving after a rejected one fails with `TransferRejected`. Once a part is
    /// quarantined every later part is quarantined without filtering.
    #[tracing::instrument(skip(self, data))]
    pub async fn apply_first_stage_filtering(
        &self,
        transfer_id: Uuid,
        part: MultipartPart,
        data: PartReader,
    ) -> Result<FilterAction, AppError> {
        let item = self
            .tracker
            .get(transfer_id)
            .await
            .ok_or_else(|| AppError::TransferNotFound(transfer_id.to_string()))?;

        let expected = item.expected_next_part();
        if expected != Some(part) {
            self.discard_transfer(transfer_id).await;
            return Err(AppError::Protocol(match expected {
                Some(expected) => format!("Expected {} section, received {}", expected, part),
                None => format!("Received {} section after the payload", part),
            }));
        }

        if item.has_rejected_part() {
            return Err(AppError::TransferRejected(format!(
                "Transfer {} already has a rejected part",
                transfer_id
            )));
        }

        let size_bytes = match self
            .drives
            .write_temp_stream(&item.temp_file, part.extension(), data)
            .await
        {
            Ok(size) => size,
            Err(e) => {
                self.discard_transfer(transfer_id).await;
                return Err(e.into());
            }
        };

        let outcome = if item.has_quarantined_part() {
            tracing::debug!("Transfer already quarantined, skipping filters");
            FilterAction::Quarantine
        } else {
            let ctx = FilterContext {
                sender: &item.sender,
                transfer: &item,
                part,
                size_bytes,
                drives: self.drives.as_ref(),
            };
            self.pipeline.evaluate(&ctx).await
        };

        self.tracker
            .record_part(
                transfer_id,
                part,
                PartState {
                    outcome,
                    extension: part.extension(),
                    size_bytes,
                },
            )
            .await?;

        tracing::debug!(outcome = %outcome, size_bytes, "Part received");
        Ok(outcome)
    }

    /// True once all three parts are present and accepted.
    pub async fn is_file_valid(&self, transfer_id: Uuid) -> Result<bool, AppError> {
        self.tracker
            .get(transfer_id)
            .await
            .map(|item| item.is_complete_and_valid())
            .ok_or_else(|| AppError::TransferNotFound(transfer_id.to_string()))
    }

    /// Terminal transition. The state item is gone afterwards whatever the outcome.
    #[tracing::instrument(skip(self))]
    pub async fn finalize_transfer(&self, transfer_id: Uuid) -> Result<HostTransitResponse, AppError> {
        let item = self
            .tracker
            .remove(transfer_id)
            .await
            .ok_or_else(|| AppError::TransferNotFound(transfer_id.to_string()))?;

        // The item is out of the tracker, so a dropped guard can no longer clean
        // up. Whatever follows must finish even if the request is dropped.
        let this = self.clone();
        tokio::spawn(async move { this.settle(item).await })
            .await
            .map_err(|e| AppError::Internal(format!("Finalize task failed: {}", e)))?
    }

    async fn settle(&self, item: IncomingTransferStateItem) -> Result<HostTransitResponse, AppError> {
        if item.has_quarantined_part() {
            if self.retain_quarantined {
                tracing::warn!(
                    sender = %item.sender,
                    temp_file = %item.temp_file,
                    "Transfer quarantined, temp files retained for review"
                );
            } else {
                tracing::warn!(sender = %item.sender, "Transfer quarantined");
                self.delete_temp(&item).await;
            }
            return Ok(HostTransitResponse::new(TransitResponseCode::QuarantinedPayload));
        }

        if item.has_rejected_part() {
            tracing::info!(sender = %item.sender, "Transfer rejected");
            self.delete_temp(&item).await;
            return Ok(HostTransitResponse::new(TransitResponseCode::Rejected));
        }

        if item.is_complete_and_valid() {
            return self.accept(item).await;
        }

        self.delete_temp(&item).await;
        if let Some(missing) = item.expected_next_part() {
            return Err(AppError::Protocol(format!(
                "Transfer ended before the {} section",
                missing
            )));
        }
        Err(AppError::UnhandledScenario(format!(
            "Transfer {} finalized with parts {:?}",
            item.id,
            item.parts().collect::<Vec<_>>()
        )))
    }

    async fn accept(&self, item: IncomingTransferStateItem) -> Result<HostTransitResponse, AppError> {
        let start = Instant::now();
        let inbox_item = TransferInboxItem::save_file(
            item.sender.clone(),
            item.temp_file.drive_id,
            item.temp_file.file_id,
            item.instruction_set.clone(),
        );

        if let Err(e) = self.inbox.add(&inbox_item).await {
            tracing::error!(error = %e, "Inbox add failed, dropping transfer");
            self.delete_temp(&item).await;
            return Err(e);
        }

        self.events.publish(TransitEvent::FileReceived {
            file: item.temp_file,
            target_drive: item.target_drive,
            file_system_type: item.transfer_file_system_type,
            transfer_file_type: item.transfer_file_type,
            sender: item.sender.clone(),
        });

        tracing::info!(
            sender = %item.sender,
            inbox_item_id = %inbox_item.id,
            file = %item.temp_file,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Transfer accepted"
        );
        Ok(HostTransitResponse::new(TransitResponseCode::Accepted))
    }

    /// Abort a transfer: evict its state and delete its temp files.
    ///
    /// Returns `false` if the transfer was already finalized or discarded.
    pub async fn discard_transfer(&self, transfer_id: Uuid) -> bool {
        match self.tracker.remove(transfer_id).await {
            Some(item) => {
                self.delete_temp(&item).await;
                tracing::info!(transfer_id = %transfer_id, sender = %item.sender, "Transfer discarded");
                true
            }
            None => false,
        }
    }

    async fn delete_temp(&self, item: &IncomingTransferStateItem) {
        if let Err(e) = self.drives.delete_temp_files(&item.temp_file).await {
            tracing::error!(
                transfer_id = %item.id,
                temp_file = %item.temp_file,
                error = %e,
                "Failed to delete transfer temp files"
            );
        }
    }

    /// Queue a delete of the file linked by `global_transit_id`.
    ///
    /// Never fails: any problem is answered with `Rejected`.
    #[tracing::instrument(
        skip(self, request),
        fields(sender = %sender, global_transit_id = %request.global_transit_id)
    )]
    pub async fn accept_delete_linked_file_request(
        &self,
        sender: &OdinId,
        request: DeleteLinkedFileRequest,
    ) -> HostTransitResponse {
        match self.enqueue_delete(sender, request).await {
            Ok(()) => HostTransitResponse::new(TransitResponseCode::Accepted),
            Err(e) => {
                tracing::warn!(error = %e, "Delete linked file request rejected");
                HostTransitResponse::new(TransitResponseCode::Rejected)
            }
        }
    }

    async fn enqueue_delete(
        &self,
        sender: &OdinId,
        request: DeleteLinkedFileRequest,
    ) -> Result<(), AppError> {
        let drive_id = self.resolve_drive(&request.target_drive).await?;

        let item = TransferInboxItem::delete_linked_file(
            sender.clone(),
            drive_id,
            request.global_transit_id,
            request.file_system_type,
        );
        self.inbox.add(&item).await?;

        self.events.publish(TransitEvent::DeleteLinkedFileReceived {
            drive_id,
            global_transit_id: request.global_transit_id,
        });
        Ok(())
    }

    /// Queue a read receipt from `sender` for the file linked by `global_transit_id`.
    ///
    /// Never fails: any problem is answered with `Rejected`.
    #[tracing::instrument(
        skip(self, request),
        fields(sender = %sender, global_transit_id = %request.global_transit_id)
    )]
    pub async fn accept_mark_file_as_read_request(
        &self,
        sender: &OdinId,
        request: MarkFileAsReadRequest,
    ) -> HostTransitResponse {
        match self.enqueue_read_receipt(sender, request).await {
            Ok(()) => HostTransitResponse::new(TransitResponseCode::Accepted),
            Err(e) => {
                tracing::warn!(error = %e, "Mark file as read request rejected");
                HostTransitResponse::new(TransitResponseCode::Rejected)
            }
        }
    }

    async fn enqueue_read_receipt(
        &self,
        sender: &OdinId,
        request: MarkFileAsReadRequest,
    ) -> Result<(), AppError> {
        let drive_id = self.resolve_drive(&request.target_drive).await?;

        let item = TransferInboxItem::read_receipt(
            sender.clone(),
            drive_id,
            request.global_transit_id,
            request.file_system_type,
        );
        self.inbox.add(&item).await?;

        self.events.publish(TransitEvent::ReadReceiptReceived {
            drive_id,
            global_transit_id: request.global_transit_id,
            reader: sender.clone(),
        });
        Ok(())
    }

    async fn resolve_drive(&self, target_drive: &TargetDrive) -> Result<Uuid, AppError> {
        self.drives
            .get_drive_id(target_drive)
            .await?
            .ok_or_else(|| {
                AppError::InvalidInstructionSet(format!("Target drive {} not found", target_drive))
            })
    }
}

/// Discards its transfer on drop unless disarmed.
///
/// Hold one for the lifetime of the request that feeds a transfer; a client
/// disconnect or timeout drops the request future and with it the guard.
#[must_use = "dropping the guard discards the transfer"]
pub struct TransferGuard {
    service: TransitPerimeterService,
    transfer_id: Uuid,
    armed: bool,
}

impl TransferGuard {
    pub fn transfer_id(&self) -> Uuid {
        self.transfer_id
    }

    /// Finalize the transfer and disarm the guard.
    pub async fn finalize(mut self) -> Result<HostTransitResponse, AppError> {
        let result = self.service.finalize_transfer(self.transfer_id).await;
        self.armed = false;
        result
    }

    /// Discard the transfer now instead of on drop.
    pub async fn discard(mut self) -> bool {
        self.armed = false;
        self.service.discard_transfer(self.transfer_id).await
    }

    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for TransferGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let service = self.service.clone();
        let transfer_id = self.transfer_id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if service.discard_transfer(transfer_id).await {
                        tracing::warn!(transfer_id = %transfer_id, "Aborted transfer cleaned up");
                    }
                });
            }
            Err(_) => {
                tracing::error!(transfer_id = %transfer_id, "No runtime to clean up aborted transfer");
            }
        }
    }
}
