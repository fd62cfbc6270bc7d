//! Reconciles received files against the drive.
//!
//! A received file either becomes a new file or overwrites an existing one. Two
//! optional dedup ids decide which: the client unique id and the global transit id.
//! When both are present they must point at the same local file.

use crate::events::{EventBus, TransitEvent};
use crate::keyed_lock::{DedupKey, KeyedLock};
use peerhost_core::models::{
    AccessControlList, FileMetadata, FileSystemType, InternalDriveFileId, KeyHeader,
    MultipartPart, ServerFileHeader, ServerMetadata, TransferFileType, TransferInboxItem,
};
use peerhost_core::AppError;
use peerhost_storage::DriveFileSystem;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// What `handle_file` did with the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Created(ServerFileHeader),
    Overwritten(ServerFileHeader),
    CommandMessage(ServerFileHeader),
    /// The temp file was already committed by an earlier attempt.
    AlreadyCommitted(InternalDriveFileId),
}

impl WriteOutcome {
    pub fn header(&self) -> Option<&ServerFileHeader> {
        match self {
            WriteOutcome::Created(h)
            | WriteOutcome::Overwritten(h)
            | WriteOutcome::CommandMessage(h) => Some(h),
            WriteOutcome::AlreadyCommitted(_) => None,
        }
    }
}

pub struct TransitFileWriter {
    drives: Arc<dyn DriveFileSystem>,
    key_lock: KeyedLock<DedupKey>,
    events: EventBus,
}

impl TransitFileWriter {
    pub fn new(drives: Arc<dyn DriveFileSystem>, events: EventBus) -> Self {
        Self {
            drives,
            key_lock: KeyedLock::new(),
            events,
        }
    }

    /// Commit the file held in the item's temp storage.
    #[tracing::instrument(
        skip(self, item, key_header),
        fields(
            item_id = %item.id,
            sender = %item.sender,
            drive_id = %item.drive_id,
            file_id = %item.file_id
        )
    )]
    pub async fn handle_file(
        &self,
        item: &TransferInboxItem,
        key_header: KeyHeader,
    ) -> Result<WriteOutcome, AppError> {
        let start = Instant::now();
        let temp_file = InternalDriveFileId::new(item.drive_id, item.file_id);

        if self.drives.file_exists(&temp_file).await? {
            tracing::info!("Temp file already committed, skipping");
            return Ok(WriteOutcome::AlreadyCommitted(temp_file));
        }

        let mut metadata = self.read_metadata(&temp_file).await?;
        // The recorded sender is whoever delivered the transfer, never what the payload claims.
        metadata.sender_odin_id = Some(item.sender.clone());

        let mut server_metadata = ServerMetadata {
            access_control_list: AccessControlList::owner_only(),
            file_system_type: item.file_system_type,
            do_not_index: false,
            allow_distribution: false,
            read_receipts: Default::default(),
        };

        if item.transfer_file_type == TransferFileType::CommandMessage {
            server_metadata.do_not_index = true;
            let header = self
                .commit_new(&temp_file, key_header, metadata, server_metadata)
                .await?;
            self.events.publish(TransitEvent::CommandMessageReceived {
                file: header.file,
                sender: item.sender.clone(),
            });
            tracing::info!(
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "Command message stored"
            );
            return Ok(WriteOutcome::CommandMessage(header));
        }

        if item.file_system_type == FileSystemType::Comment {
            server_metadata.access_control_list = self.referenced_file_acl(&metadata).await?;
        }

        let outcome = self
            .reconcile(item, &temp_file, key_header, metadata, server_metadata)
            .await?;

        tracing::info!(
            outcome = match &outcome {
                WriteOutcome::Created(_) => "created",
                WriteOutcome::Overwritten(_) => "overwritten",
                WriteOutcome::CommandMessage(_) => "command_message",
                WriteOutcome::AlreadyCommitted(_) => "already_committed",
            },
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Received file written"
        );
        Ok(outcome)
    }

    /// Soft-delete the file the item's global transit id points at.
    ///
    /// Returns `false` when there is nothing to delete.
    #[tracing::instrument(
        skip(self, item),
        fields(item_id = %item.id, sender = %item.sender, drive_id = %item.drive_id)
    )]
    pub async fn delete_file(&self, item: &TransferInboxItem) -> Result<bool, AppError> {
        let global_transit_id = item.global_transit_id.ok_or_else(|| {
            AppError::InvalidInput("Delete instruction without a global transit id".to_string())
        })?;

        let _guard = self
            .key_lock
            .lock_all([DedupKey::GlobalTransitId {
                drive_id: item.drive_id,
                global_transit_id,
            }])
            .await;

        let existing = self
            .drives
            .get_file_by_global_transit_id(item.drive_id, global_transit_id)
            .await?;

        let Some(existing) = existing else {
            tracing::info!(global_transit_id = %global_transit_id, "No file to delete");
            return Ok(false);
        };

        if !existing.is_active() {
            tracing::debug!(file = %existing.file, "File already deleted");
            return Ok(false);
        }

        ensure_same_sender(&existing, item)?;

        self.drives.soft_delete_long_term_file(&existing.file).await?;
        tracing::info!(file = %existing.file, "Linked file deleted");
        Ok(true)
    }

    /// Record that the item's sender has read the file its global transit id points at.
    ///
    /// Returns `false` when there is no active file to mark.
    #[tracing::instrument(
        skip(self, item),
        fields(item_id = %item.id, sender = %item.sender, drive_id = %item.drive_id)
    )]
    pub async fn mark_file_as_read(&self, item: &TransferInboxItem) -> Result<bool, AppError> {
        let global_transit_id = item.global_transit_id.ok_or_else(|| {
            AppError::InvalidInput("Read receipt without a global transit id".to_string())
        })?;

        let _guard = self
            .key_lock
            .lock_all([DedupKey::GlobalTransitId {
                drive_id: item.drive_id,
                global_transit_id,
            }])
            .await;

        let existing = self
            .drives
            .get_file_by_global_transit_id(item.drive_id, global_transit_id)
            .await?;

        let Some(existing) = existing else {
            tracing::info!(global_transit_id = %global_transit_id, "No file to mark as read");
            return Ok(false);
        };

        if !existing.is_active() {
            tracing::debug!(file = %existing.file, "Read receipt for a deleted file");
            return Ok(false);
        }

        // A file cannot be acknowledged by the peer it came from.
        if existing.original_sender() == Some(&item.sender) {
            return Err(AppError::RemoteIdentity(format!(
                "Sender {} sent {} and cannot mark it as read",
                item.sender, existing.file
            )));
        }

        self.drives
            .record_read_receipt(&existing.file, &item.sender, item.added_timestamp)
            .await?;
        tracing::info!(file = %existing.file, "File marked as read");
        Ok(true)
    }

    async fn read_metadata(&self, temp_file: &InternalDriveFileId) -> Result<FileMetadata, AppError> {
        let bytes = self
            .drives
            .read_temp_bytes(temp_file, MultipartPart::Metadata.extension())
            .await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| AppError::InvalidFile(format!("Metadata could not be parsed: {}", e)))
    }

    /// A comment carries the ACL of the file it comments on.
    async fn referenced_file_acl(
        &self,
        metadata: &FileMetadata,
    ) -> Result<AccessControlList, AppError> {
        let reference = metadata.referenced_file.ok_or_else(|| {
            AppError::RemoteIdentity("Comment does not reference a file".to_string())
        })?;

        let drive_id = self
            .drives
            .get_drive_id(&reference.target_drive)
            .await?
            .ok_or_else(|| {
                AppError::RemoteIdentity(format!(
                    "Referenced drive {} not found",
                    reference.target_drive
                ))
            })?;

        let referenced = self
            .drives
            .get_file_by_global_transit_id(drive_id, reference.global_transit_id)
            .await?
            .filter(ServerFileHeader::is_active)
            .ok_or_else(|| {
                AppError::RemoteIdentity(format!(
                    "Referenced file {} not found",
                    reference.global_transit_id
                ))
            })?;

        if referenced.file_metadata.is_encrypted != metadata.is_encrypted {
            return Err(AppError::RemoteIdentity(
                "Comment encryption does not match the referenced file".to_string(),
            ));
        }

        Ok(referenced.server_metadata.access_control_list)
    }

    async fn reconcile(
        &self,
        item: &TransferInboxItem,
        temp_file: &InternalDriveFileId,
        key_header: KeyHeader,
        metadata: FileMetadata,
        server_metadata: ServerMetadata,
    ) -> Result<WriteOutcome, AppError> {
        let drive_id = item.drive_id;
        let unique_id = metadata.unique_id();
        let global_transit_id = metadata.global_transit_id;

        let _guard = self
            .key_lock
            .lock_all(dedup_keys(drive_id, unique_id, global_transit_id))
            .await;

        let existing = match (unique_id, global_transit_id) {
            (None, None) => None,
            (Some(unique_id), None) => {
                self.drives
                    .get_file_by_client_unique_id(drive_id, unique_id)
                    .await?
            }
            (None, Some(global_transit_id)) => {
                self.drives
                    .get_file_by_global_transit_id(drive_id, global_transit_id)
                    .await?
            }
            (Some(unique_id), Some(global_transit_id)) => {
                let by_unique_id = self
                    .drives
                    .get_file_by_client_unique_id(drive_id, unique_id)
                    .await?;
                let by_global_transit_id = self
                    .drives
                    .get_file_by_global_transit_id(drive_id, global_transit_id)
                    .await?;

                match (by_unique_id, by_global_transit_id) {
                    (None, None) => None,
                    (Some(a), Some(b)) if a.file == b.file => Some(a),
                    _ => {
                        return Err(AppError::DriveSecurity(
                            "UniqueId and GlobalTransitId are not the same file".to_string(),
                        ))
                    }
                }
            }
        };

        match existing {
            None => {
                let header = self
                    .commit_new(temp_file, key_header, metadata, server_metadata)
                    .await?;
                Ok(WriteOutcome::Created(header))
            }
            Some(existing) => {
                let header = self
                    .overwrite(item, temp_file, &existing, key_header, metadata, server_metadata)
                    .await?;
                Ok(WriteOutcome::Overwritten(header))
            }
        }
    }

    async fn commit_new(
        &self,
        temp_file: &InternalDriveFileId,
        key_header: KeyHeader,
        mut metadata: FileMetadata,
        server_metadata: ServerMetadata,
    ) -> Result<ServerFileHeader, AppError> {
        metadata.version_tag = None;
        let header = self
            .drives
            .commit_new_file(
                temp_file,
                key_header,
                metadata,
                server_metadata,
                MultipartPart::Payload.extension(),
            )
            .await?;
        Ok(header)
    }

    async fn overwrite(
        &self,
        item: &TransferInboxItem,
        temp_file: &InternalDriveFileId,
        existing: &ServerFileHeader,
        key_header: KeyHeader,
        mut metadata: FileMetadata,
        server_metadata: ServerMetadata,
    ) -> Result<ServerFileHeader, AppError> {
        if !existing.is_active() {
            return Err(AppError::InvalidFile(format!(
                "Cannot overwrite deleted file {}",
                existing.file
            )));
        }
        ensure_same_sender(existing, item)?;

        metadata.version_tag = existing.version_tag();
        let header = self
            .drives
            .overwrite_file(
                temp_file,
                &existing.file,
                key_header,
                metadata,
                server_metadata,
                MultipartPart::Payload.extension(),
            )
            .await?;
        Ok(header)
    }
}

fn dedup_keys(
    drive_id: Uuid,
    unique_id: Option<Uuid>,
    global_transit_id: Option<Uuid>,
) -> Vec<DedupKey> {
    let mut keys = Vec::with_capacity(2);
    if let Some(unique_id) = unique_id {
        keys.push(DedupKey::UniqueId {
            drive_id,
            unique_id,
        });
    }
    if let Some(global_transit_id) = global_transit_id {
        keys.push(DedupKey::GlobalTransitId {
            drive_id,
            global_transit_id,
        });
    }
    keys
}

fn ensure_same_sender(existing: &ServerFileHeader, item: &TransferInboxItem) -> Result<(), AppError> {
    if existing.original_sender() != Some(&item.sender) {
        return Err(AppError::DriveSecurity(format!(
            "Sender {} does not match the original sender of {}",
            item.sender, existing.file
        )));
    }
    Ok(())
}
