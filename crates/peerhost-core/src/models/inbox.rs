use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{
    EncryptedRecipientTransferInstructionSet, FileSystemType, OdinId, TransferFileType,
    TransferInstructionType,
};

/// Durable record of a transfer the perimeter accepted, waiting for the inbox worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInboxItem {
    pub id: Uuid,
    pub added_timestamp: DateTime<Utc>,
    pub sender: OdinId,
    pub public_key_crc: u32,
    pub instruction_type: TransferInstructionType,
    pub drive_id: Uuid,
    /// Temp file holding the received parts (`SaveFile`).
    pub file_id: Uuid,
    /// File to delete (`DeleteLinkedFile`) or mark read (`ReadReceipt`).
    pub global_transit_id: Option<Uuid>,
    pub file_system_type: FileSystemType,
    pub transfer_file_type: TransferFileType,
    pub instruction_set: Option<EncryptedRecipientTransferInstructionSet>,
    /// Set while a worker holds the item.
    #[serde(default)]
    pub popstamp: Option<Uuid>,
    #[serde(default)]
    pub attempts: u32,
}

impl TransferInboxItem {
    pub fn save_file(
        sender: OdinId,
        drive_id: Uuid,
        file_id: Uuid,
        instruction_set: EncryptedRecipientTransferInstructionSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            added_timestamp: Utc::now(),
            sender,
            public_key_crc: instruction_set.public_key_crc,
            instruction_type: TransferInstructionType::SaveFile,
            drive_id,
            file_id,
            global_transit_id: None,
            file_system_type: instruction_set.file_system_type,
            transfer_file_type: instruction_set.transfer_file_type,
            instruction_set: Some(instruction_set),
            popstamp: None,
            attempts: 0,
        }
    }

    pub fn delete_linked_file(
        sender: OdinId,
        drive_id: Uuid,
        global_transit_id: Uuid,
        file_system_type: FileSystemType,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            added_timestamp: Utc::now(),
            sender,
            public_key_crc: 0,
            instruction_type: TransferInstructionType::DeleteLinkedFile,
            drive_id,
            file_id: Uuid::new_v4(),
            global_transit_id: Some(global_transit_id),
            file_system_type,
            transfer_file_type: TransferFileType::Normal,
            instruction_set: None,
            popstamp: None,
            attempts: 0,
        }
    }

    /// `file_id` is random: several readers may acknowledge the same file.
    pub fn read_receipt(
        sender: OdinId,
        drive_id: Uuid,
        global_transit_id: Uuid,
        file_system_type: FileSystemType,
    ) -> Self {
        Self {
            instruction_type: TransferInstructionType::ReadReceipt,
            ..Self::delete_linked_file(sender, drive_id, global_transit_id, file_system_type)
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxStatus {
    pub total_items: u64,
    pub popped_count: u64,
    pub oldest_item_timestamp: Option<DateTime<Utc>>,
}
