//! Test fixtures: identities, drives and metadata.

use peerhost_core::models::{AppData, FileMetadata, KeyHeader, OdinId, TargetDrive};
use uuid::Uuid;

pub const SHARED_SECRET: [u8; 32] = [9u8; 32];
pub const CURRENT_CRC: u32 = 0xFACE;

pub fn sam() -> OdinId {
    "sam.dotyou.cloud".parse().expect("valid odin id")
}

pub fn merry() -> OdinId {
    "merry.dotyou.cloud".parse().expect("valid odin id")
}

pub fn target_drive() -> TargetDrive {
    TargetDrive {
        alias: Uuid::new_v4(),
        drive_type: Uuid::new_v4(),
    }
}

pub fn key_header() -> KeyHeader {
    KeyHeader {
        iv: vec![0x33; 16],
        aes_key: vec![0x44; 32],
    }
}

pub fn metadata(unique_id: Option<Uuid>, global_transit_id: Option<Uuid>) -> FileMetadata {
    FileMetadata {
        global_transit_id,
        app_data: AppData {
            unique_id,
            file_type: 7,
            ..Default::default()
        },
        is_encrypted: true,
        ..Default::default()
    }
}
