//! Test fixtures: identities, drives, instruction sets and metadata.

use peerhost_core::models::{
    AppData, FileMetadata, FileSystemType, GlobalTransitIdFileIdentifier, KeyHeader, OdinId,
    TargetDrive,
};
use uuid::Uuid;

pub const SHARED_SECRET: [u8; 32] = [7u8; 32];
pub const CURRENT_CRC: u32 = 0xC0FFEE;
pub const PREVIOUS_CRC: u32 = 0xBEEF;

pub fn odin(name: &str) -> OdinId {
    name.parse().expect("valid odin id")
}

pub fn sam() -> OdinId {
    odin("sam.dotyou.cloud")
}

pub fn merry() -> OdinId {
    odin("merry.dotyou.cloud")
}

pub fn target_drive() -> TargetDrive {
    TargetDrive {
        alias: Uuid::new_v4(),
        drive_type: Uuid::new_v4(),
    }
}

pub fn key_header() -> KeyHeader {
    KeyHeader {
        iv: vec![0x11; 16],
        aes_key: vec![0x22; 32],
    }
}

pub fn metadata(unique_id: Option<Uuid>, global_transit_id: Option<Uuid>) -> FileMetadata {
    FileMetadata {
        global_transit_id,
        app_data: AppData {
            unique_id,
            file_type: 100,
            content: Some("hello".to_string()),
            ..Default::default()
        },
        is_encrypted: true,
        ..Default::default()
    }
}

pub fn comment_metadata(reference: Option<GlobalTransitIdFileIdentifier>, is_encrypted: bool) -> FileMetadata {
    FileMetadata {
        global_transit_id: Some(Uuid::new_v4()),
        referenced_file: reference,
        is_encrypted,
        ..Default::default()
    }
}

pub fn comment() -> FileSystemType {
    FileSystemType::Comment
}
