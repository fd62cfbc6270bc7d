//! Processing of a single popped inbox item.

use peerhost_core::models::{InternalDriveFileId, TransferInboxItem, TransferInstructionType};
use peerhost_core::AppError;
use peerhost_storage::DriveFileSystem;
use peerhost_transit::{InboxStorage, KeyExchange, TransitFileWriter, WriteOutcome};
use std::sync::Arc;
use std::time::Instant;

/// What happened to a popped item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Written (or deleted) and removed from the inbox.
    Completed,
    /// The item can never succeed; removed from the inbox.
    Discarded,
    /// Returned to pending for another attempt.
    Retrying { attempts: u32 },
    /// Failed `max_attempts` times; removed from the inbox.
    GaveUp,
    /// Another worker took the item over (its popstamp no longer matches).
    Stale,
}

pub struct InboxProcessor {
    inbox: Arc<dyn InboxStorage>,
    writer: Arc<TransitFileWriter>,
    key_exchange: Arc<dyn KeyExchange>,
    drives: Arc<dyn DriveFileSystem>,
    max_attempts: u32,
}

impl InboxProcessor {
    pub fn new(
        inbox: Arc<dyn InboxStorage>,
        writer: Arc<TransitFileWriter>,
        key_exchange: Arc<dyn KeyExchange>,
        drives: Arc<dyn DriveFileSystem>,
        max_attempts: u32,
    ) -> Self {
        Self {
            inbox,
            writer,
            key_exchange,
            drives,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn inbox(&self) -> &Arc<dyn InboxStorage> {
        &self.inbox
    }

    /// Process one popped item and settle it in the inbox.
    ///
    /// Errors are only returned when the inbox itself cannot be updated; failures of
    /// the item are reported through [`ProcessOutcome`].
    #[tracing::instrument(
        skip(self, item),
        fields(
            item_id = %item.id,
            instruction = %item.instruction_type,
            sender = %item.sender,
            attempts = item.attempts
        )
    )]
    pub async fn process_item(&self, item: &TransferInboxItem) -> Result<ProcessOutcome, AppError> {
        let popstamp = item.popstamp.ok_or_else(|| {
            AppError::Internal(format!("Inbox item {} was not popped", item.id))
        })?;
        let start = Instant::now();

        match self.apply(item).await {
            Ok(()) => {
                if !self.inbox.mark_complete(item.id, popstamp).await? {
                    tracing::warn!("Inbox item popstamp changed while processing");
                    return Ok(ProcessOutcome::Stale);
                }
                self.cleanup_temp(item).await;
                tracing::info!(
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Inbox item processed"
                );
                Ok(ProcessOutcome::Completed)
            }
            Err(e) if e.is_client_error() => {
                tracing::warn!(error = %e, "Inbox item can never be processed, discarding");
                self.remove(item, popstamp).await?;
                Ok(ProcessOutcome::Discarded)
            }
            Err(e) => {
                let attempts = item.attempts.saturating_add(1);
                if attempts >= self.max_attempts {
                    tracing::error!(
                        error = %e,
                        attempts,
                        max_attempts = self.max_attempts,
                        "Inbox item failed after max attempts, discarding"
                    );
                    self.remove(item, popstamp).await?;
                    return Ok(ProcessOutcome::GaveUp);
                }

                tracing::warn!(error = %e, attempts, "Inbox item failed, will retry");
                if !self.inbox.mark_failure(item.id, popstamp).await? {
                    return Ok(ProcessOutcome::Stale);
                }
                Ok(ProcessOutcome::Retrying { attempts })
            }
        }
    }

    async fn apply(&self, item: &TransferInboxItem) -> Result<(), AppError> {
        match item.instruction_type {
            TransferInstructionType::SaveFile => {
                let instruction_set = item.instruction_set.as_ref().ok_or_else(|| {
                    AppError::InvalidInput("Save instruction without an instruction set".to_string())
                })?;
                let key_header = self
                    .key_exchange
                    .decrypt_key_header(&instruction_set.shared_secret_encrypted_key_header)
                    .await?;

                match self.writer.handle_file(item, key_header).await? {
                    WriteOutcome::AlreadyCommitted(file) => {
                        tracing::debug!(file = %file, "Item was committed by an earlier attempt");
                    }
                    outcome => {
                        if let Some(header) = outcome.header() {
                            tracing::debug!(file = %header.file, "Item committed");
                        }
                    }
                }
                Ok(())
            }
            TransferInstructionType::DeleteLinkedFile => {
                let deleted = self.writer.delete_file(item).await?;
                tracing::debug!(deleted, "Delete instruction applied");
                Ok(())
            }
            TransferInstructionType::ReadReceipt => {
                let recorded = self.writer.mark_file_as_read(item).await?;
                tracing::debug!(recorded, "Read receipt applied");
                Ok(())
            }
        }
    }

    async fn remove(&self, item: &TransferInboxItem, popstamp: uuid::Uuid) -> Result<(), AppError> {
        if !self.inbox.mark_complete(item.id, popstamp).await? {
            tracing::warn!("Inbox item popstamp changed before it could be removed");
            return Ok(());
        }
        self.cleanup_temp(item).await;
        Ok(())
    }

    async fn cleanup_temp(&self, item: &TransferInboxItem) {
        if item.instruction_type != TransferInstructionType::SaveFile {
            return;
        }
        let temp_file = InternalDriveFileId::new(item.drive_id, item.file_id);
        if let Err(e) = self.drives.delete_temp_files(&temp_file).await {
            tracing::warn!(error = %e, file = %temp_file, "Failed to delete temp files");
        }
    }
}
