//! Test fixtures: identities, drives and multipart bodies.

use axum_test::multipart::{MultipartForm, Part};
use peerhost_core::models::{
    AppData, EncryptedRecipientTransferInstructionSet, FileMetadata, KeyHeader, TargetDrive,
};
use uuid::Uuid;

pub const SHARED_SECRET: [u8; 32] = [5u8; 32];
pub const CURRENT_CRC: u32 = 4242;
pub const SENDER_HEADER: &str = "x-odin-sender";
pub const SAM: &str = "sam.dotyou.cloud";

pub fn target_drive() -> TargetDrive {
    TargetDrive {
        alias: Uuid::new_v4(),
        drive_type: Uuid::new_v4(),
    }
}

pub fn key_header() -> KeyHeader {
    KeyHeader {
        iv: vec![0x55; 16],
        aes_key: vec![0x66; 32],
    }
}

pub fn metadata(unique_id: Option<Uuid>) -> FileMetadata {
    FileMetadata {
        app_data: AppData {
            unique_id,
            file_type: 1,
            ..Default::default()
        },
        is_encrypted: true,
        ..Default::default()
    }
}

fn part(bytes: Vec<u8>) -> Part {
    Part::bytes(bytes::Bytes::from(bytes)).mime_type("application/octet-stream")
}

/// A complete transfer body: key header, metadata, payload.
pub fn transfer_form(
    instruction_set: &EncryptedRecipientTransferInstructionSet,
    metadata: &FileMetadata,
    payload: &[u8],
) -> MultipartForm {
    MultipartForm::new()
        .add_part("transferkeyheader", part(serde_json::to_vec(instruction_set).unwrap()))
        .add_part("metadata", part(serde_json::to_vec(metadata).unwrap()))
        .add_part("payload", part(payload.to_vec()))
}

/// A body with arbitrary sections, in the given order.
pub fn sections_form(sections: Vec<(&'static str, Vec<u8>)>) -> MultipartForm {
    sections
        .into_iter()
        .fold(MultipartForm::new(), |form, (name, bytes)| {
            form.add_part(name, part(bytes))
        })
}
