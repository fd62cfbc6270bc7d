#![allow(dead_code)]

pub mod fixtures;

use fixtures::{key_header, target_drive, CURRENT_CRC, PREVIOUS_CRC, SHARED_SECRET};
use peerhost_core::models::{
    EncryptedRecipientTransferInstructionSet, FileMetadata, FileSystemType, FilterAction,
    HostTransitResponse, MultipartPart, OdinId, TargetDrive, TransferFileType, TransferInboxItem,
};
use peerhost_core::AppError;
use peerhost_storage::{DriveFileSystem, LocalDriveFileSystem};
use peerhost_transit::{
    EventBus, FilterPipeline, InboxStorage, KeyExchange, SharedSecretKeyExchange, SqliteInbox,
    TransferStateTracker, TransitFileWriter, TransitPerimeterService, WriteOutcome,
};
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

/// A receiving host backed by a temp directory and an in-memory inbox.
pub struct TestHost {
    dir: TempDir,
    pub drives: Arc<LocalDriveFileSystem>,
    pub inbox: Arc<SqliteInbox>,
    pub events: EventBus,
    pub key_exchange: Arc<SharedSecretKeyExchange>,
    pub perimeter: TransitPerimeterService,
    pub writer: TransitFileWriter,
    pub target_drive: TargetDrive,
    pub drive_id: Uuid,
}

pub async fn setup_host() -> TestHost {
    setup_host_with(FilterPipeline::new(), false).await
}

pub async fn setup_host_with(pipeline: FilterPipeline, retain_quarantined: bool) -> TestHost {
    let dir = tempfile::tempdir().unwrap();
    let drives = Arc::new(LocalDriveFileSystem::new(dir.path()).await.unwrap());
    let target_drive = target_drive();
    let drive_id = drives.create_drive(target_drive).await.unwrap();

    let inbox = Arc::new(SqliteInbox::in_memory().await.unwrap());
    let events = EventBus::new();
    let key_exchange = Arc::new(
        SharedSecretKeyExchange::new(&SHARED_SECRET, vec![CURRENT_CRC, PREVIOUS_CRC]).unwrap(),
    );

    let perimeter = TransitPerimeterService::new(
        Arc::new(TransferStateTracker::new()),
        pipeline,
        key_exchange.clone(),
        drives.clone(),
        inbox.clone(),
        events.clone(),
    )
    .with_retain_quarantined(retain_quarantined);
    let writer = TransitFileWriter::new(drives.clone(), events.clone());

    TestHost {
        dir,
        drives,
        inbox,
        events,
        key_exchange,
        perimeter,
        writer,
        target_drive,
        drive_id,
    }
}

impl TestHost {
    pub fn instruction_set(
        &self,
        file_system_type: FileSystemType,
        transfer_file_type: TransferFileType,
    ) -> EncryptedRecipientTransferInstructionSet {
        EncryptedRecipientTransferInstructionSet {
            public_key_crc: CURRENT_CRC,
            target_drive: self.target_drive,
            file_system_type,
            transfer_file_type,
            shared_secret_encrypted_key_header: self
                .key_exchange
                .encrypt_key_header(&key_header())
                .unwrap(),
        }
    }

    /// Initialize a standard transfer from `sender`.
    pub async fn begin(&self, sender: &OdinId) -> Uuid {
        self.begin_with(sender, FileSystemType::Standard, TransferFileType::Normal)
            .await
    }

    pub async fn begin_with(
        &self,
        sender: &OdinId,
        file_system_type: FileSystemType,
        transfer_file_type: TransferFileType,
    ) -> Uuid {
        self.perimeter
            .initialize_incoming_transfer(
                sender,
                self.instruction_set(file_system_type, transfer_file_type),
            )
            .await
            .unwrap()
    }

    pub async fn send_part(
        &self,
        transfer_id: Uuid,
        part: MultipartPart,
        bytes: Vec<u8>,
    ) -> Result<FilterAction, AppError> {
        self.perimeter
            .apply_first_stage_filtering(transfer_id, part, Box::pin(std::io::Cursor::new(bytes)))
            .await
    }

    /// Run a complete transfer through the perimeter.
    pub async fn send_file(
        &self,
        sender: &OdinId,
        file_system_type: FileSystemType,
        transfer_file_type: TransferFileType,
        metadata: &FileMetadata,
        payload: &[u8],
    ) -> Result<HostTransitResponse, AppError> {
        let instruction_set = self.instruction_set(file_system_type, transfer_file_type);
        let transfer_id = self
            .perimeter
            .initialize_incoming_transfer(sender, instruction_set.clone())
            .await?;

        self.send_part(
            transfer_id,
            MultipartPart::TransferKeyHeader,
            serde_json::to_vec(&instruction_set).unwrap(),
        )
        .await?;
        self.send_part(
            transfer_id,
            MultipartPart::Metadata,
            serde_json::to_vec(metadata).unwrap(),
        )
        .await?;
        self.send_part(transfer_id, MultipartPart::Payload, payload.to_vec())
            .await?;

        self.perimeter.finalize_transfer(transfer_id).await
    }

    /// Pop the next inbox item and write it, the way the inbox worker does.
    pub async fn process_next(&self) -> Result<WriteOutcome, AppError> {
        let item = self.pop_one().await;
        let result = self.write(&item).await;
        self.inbox
            .mark_complete(item.id, item.popstamp.unwrap())
            .await
            .unwrap();
        self.drives
            .delete_temp_files(&peerhost_core::models::InternalDriveFileId::new(
                item.drive_id,
                item.file_id,
            ))
            .await
            .unwrap();
        result
    }

    pub async fn pop_one(&self) -> TransferInboxItem {
        let mut items = self.inbox.pop(1).await.unwrap();
        assert_eq!(items.len(), 1, "expected one inbox item");
        items.remove(0)
    }

    pub async fn write(&self, item: &TransferInboxItem) -> Result<WriteOutcome, AppError> {
        let instruction_set = item.instruction_set.as_ref().unwrap();
        let key_header = self
            .key_exchange
            .decrypt_key_header(&instruction_set.shared_secret_encrypted_key_header)
            .await?;
        self.writer.handle_file(item, key_header).await
    }

    /// Receive a standard file end to end: perimeter, inbox, writer.
    pub async fn receive(
        &self,
        sender: &OdinId,
        metadata: &FileMetadata,
        payload: &[u8],
    ) -> Result<WriteOutcome, AppError> {
        let response = self
            .send_file(
                sender,
                FileSystemType::Standard,
                TransferFileType::Normal,
                metadata,
                payload,
            )
            .await?;
        assert_eq!(
            response.code,
            peerhost_core::models::TransitResponseCode::Accepted
        );
        self.process_next().await
    }

    pub async fn inbox_len(&self) -> u64 {
        self.inbox.status(None).await.unwrap().total_items
    }

    pub async fn temp_exists(&self, file_id: Uuid) -> bool {
        self.drives
            .temp_file_exists(&peerhost_core::models::InternalDriveFileId::new(
                self.drive_id,
                file_id,
            ))
            .await
            .unwrap()
    }

    /// Number of temp entries left on the drive.
    pub async fn temp_count(&self) -> usize {
        let dir = self.dir.path().join("drives").join(self.drive_id.to_string()).join("temp");
        match tokio::fs::read_dir(&dir).await {
            Ok(mut entries) => {
                let mut count = 0;
                while let Some(_entry) = entries.next_entry().await.unwrap() {
                    count += 1;
                }
                count
            }
            Err(_) => 0,
        }
    }
}
