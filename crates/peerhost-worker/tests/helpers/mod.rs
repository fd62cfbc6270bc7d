#![allow(dead_code)]

pub mod fixtures;

use fixtures::{key_header, metadata, target_drive, CURRENT_CRC, SHARED_SECRET};
use peerhost_core::models::{
    DeleteLinkedFileRequest, EncryptedRecipientTransferInstructionSet, FileMetadata,
    FileSystemType, InternalDriveFileId, MarkFileAsReadRequest, MultipartPart, OdinId,
    ServerFileHeader, TargetDrive, TransferFileType, TransitResponseCode,
};
use peerhost_storage::{DriveFileSystem, LocalDriveFileSystem};
use peerhost_transit::{
    EventBus, FilterPipeline, InboxStorage, KeyExchange, SharedSecretKeyExchange, SqliteInbox,
    TransferStateTracker, TransitFileWriter, TransitPerimeterService,
};
use peerhost_worker::InboxProcessor;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// A receiving host with everything the inbox worker needs.
pub struct WorkerHost {
    _dir: TempDir,
    pub drives: Arc<LocalDriveFileSystem>,
    pub inbox: Arc<SqliteInbox>,
    pub events: EventBus,
    pub key_exchange: Arc<SharedSecretKeyExchange>,
    pub perimeter: TransitPerimeterService,
    pub writer: Arc<TransitFileWriter>,
    pub target_drive: TargetDrive,
    pub drive_id: Uuid,
}

pub async fn setup_host() -> WorkerHost {
    let dir = tempfile::tempdir().unwrap();
    let drives = Arc::new(LocalDriveFileSystem::new(dir.path()).await.unwrap());
    let target_drive = target_drive();
    let drive_id = drives.create_drive(target_drive).await.unwrap();

    let inbox = Arc::new(SqliteInbox::in_memory().await.unwrap());
    let events = EventBus::new();
    let key_exchange =
        Arc::new(SharedSecretKeyExchange::new(&SHARED_SECRET, vec![CURRENT_CRC]).unwrap());

    let perimeter = TransitPerimeterService::new(
        Arc::new(TransferStateTracker::new()),
        FilterPipeline::new(),
        key_exchange.clone(),
        drives.clone(),
        inbox.clone(),
        events.clone(),
    );
    let writer = Arc::new(TransitFileWriter::new(drives.clone(), events.clone()));

    WorkerHost {
        _dir: dir,
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

impl WorkerHost {
    pub fn processor(&self, max_attempts: u32) -> InboxProcessor {
        self.processor_with_keys(self.key_exchange.clone(), max_attempts)
    }

    pub fn processor_with_keys(
        &self,
        key_exchange: Arc<dyn KeyExchange>,
        max_attempts: u32,
    ) -> InboxProcessor {
        InboxProcessor::new(
            self.inbox.clone(),
            self.writer.clone(),
            key_exchange,
            self.drives.clone(),
            max_attempts,
        )
    }

    fn instruction_set(&self) -> EncryptedRecipientTransferInstructionSet {
        EncryptedRecipientTransferInstructionSet {
            public_key_crc: CURRENT_CRC,
            target_drive: self.target_drive,
            file_system_type: FileSystemType::Standard,
            transfer_file_type: TransferFileType::Normal,
            shared_secret_encrypted_key_header: self
                .key_exchange
                .encrypt_key_header(&key_header())
                .unwrap(),
        }
    }

    /// Run a transfer through the perimeter with raw metadata bytes.
    /// Returns the temp file id.
    pub async fn send_raw(&self, sender: &OdinId, metadata_bytes: Vec<u8>, payload: &[u8]) -> Uuid {
        let instruction_set = self.instruction_set();
        let transfer_id = self
            .perimeter
            .initialize_incoming_transfer(sender, instruction_set.clone())
            .await
            .unwrap();
        let file_id = self
            .perimeter
            .tracker()
            .get(transfer_id)
            .await
            .unwrap()
            .temp_file
            .file_id;

        let parts = [
            (MultipartPart::TransferKeyHeader, serde_json::to_vec(&instruction_set).unwrap()),
            (MultipartPart::Metadata, metadata_bytes),
            (MultipartPart::Payload, payload.to_vec()),
        ];
        for (part, bytes) in parts {
            self.perimeter
                .apply_first_stage_filtering(transfer_id, part, Box::pin(std::io::Cursor::new(bytes)))
                .await
                .unwrap();
        }

        let response = self.perimeter.finalize_transfer(transfer_id).await.unwrap();
        assert_eq!(response.code, TransitResponseCode::Accepted);
        file_id
    }

    pub async fn send(&self, sender: &OdinId, metadata: &FileMetadata, payload: &[u8]) -> Uuid {
        self.send_raw(sender, serde_json::to_vec(metadata).unwrap(), payload)
            .await
    }

    pub async fn send_unique(&self, sender: &OdinId, unique_id: Uuid) -> Uuid {
        self.send(sender, &metadata(Some(unique_id), None), b"payload")
            .await
    }

    pub async fn request_delete(&self, sender: &OdinId, global_transit_id: Uuid) {
        let response = self
            .perimeter
            .accept_delete_linked_file_request(
                sender,
                DeleteLinkedFileRequest {
                    target_drive: self.target_drive,
                    global_transit_id,
                    file_system_type: FileSystemType::Standard,
                },
            )
            .await;
        assert_eq!(response.code, TransitResponseCode::Accepted);
    }

    pub async fn request_mark_read(&self, reader: &OdinId, global_transit_id: Uuid) {
        let response = self
            .perimeter
            .accept_mark_file_as_read_request(
                reader,
                MarkFileAsReadRequest {
                    target_drive: self.target_drive,
                    global_transit_id,
                    file_system_type: FileSystemType::Standard,
                },
            )
            .await;
        assert_eq!(response.code, TransitResponseCode::Accepted);
    }

    pub async fn inbox_len(&self) -> u64 {
        self.inbox.status(None).await.unwrap().total_items
    }

    pub async fn temp_exists(&self, file_id: Uuid) -> bool {
        self.drives
            .temp_file_exists(&InternalDriveFileId::new(self.drive_id, file_id))
            .await
            .unwrap()
    }

    pub async fn file_by_unique_id(&self, unique_id: Uuid) -> Option<ServerFileHeader> {
        self.drives
            .get_file_by_client_unique_id(self.drive_id, unique_id)
            .await
            .unwrap()
    }

    /// Wait until the inbox is empty, panicking after `timeout`.
    pub async fn wait_for_empty_inbox(&self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            while self.inbox_len().await > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("inbox was not drained in time");
    }
}
