//! Test helpers: build the router over a temp data directory.
//!
//! Run from workspace root: `cargo test -p peerhost-api --test transit_api_test`.

#![allow(dead_code)]

pub mod fixtures;

use axum_test::TestServer;
use base64::{engine::general_purpose, Engine as _};
use fixtures::{key_header, CURRENT_CRC, SHARED_SECRET};
use peerhost_api::setup::{build_services, routes};
use peerhost_api::state::AppState;
use peerhost_core::models::{
    EncryptedRecipientTransferInstructionSet, FileSystemType, TargetDrive, TransferFileType,
};
use peerhost_core::Config;
use peerhost_storage::DriveFileSystem;
use peerhost_transit::SharedSecretKeyExchange;
use peerhost_worker::InboxProcessor;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

pub fn api_path(path: &str) -> String {
    format!("{}{}", routes::TRANSIT_PREFIX, path)
}

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub processor: Arc<InboxProcessor>,
    pub key_exchange: SharedSecretKeyExchange,
    pub target_drive: TargetDrive,
    pub drive_id: Uuid,
    _temp_dir: TempDir,
}

pub async fn setup_app() -> TestApp {
    setup_app_with(&[]).await
}

/// Build the app with extra configuration variables.
pub async fn setup_app_with(overrides: &[(&'static str, &str)]) -> TestApp {
    let temp_dir = tempfile::tempdir().unwrap();

    let mut vars: HashMap<&'static str, String> = HashMap::new();
    vars.insert("TENANT_ODIN_ID", "frodo.dotyou.cloud".to_string());
    vars.insert(
        "TRANSIT_SHARED_SECRET",
        general_purpose::STANDARD.encode(SHARED_SECRET),
    );
    vars.insert("TRANSIT_PUBLIC_KEY_CRCS", CURRENT_CRC.to_string());
    vars.insert("DATA_DIR", temp_dir.path().display().to_string());
    for (key, value) in overrides {
        vars.insert(*key, value.to_string());
    }

    let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();
    config.validate().unwrap();

    let services = build_services(&config).await.unwrap();
    let target_drive = fixtures::target_drive();
    let drive_id = services.state.drives.create_drive(target_drive).await.unwrap();

    let app = routes::setup_routes(&config, services.state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state: services.state,
        processor: services.processor,
        key_exchange: SharedSecretKeyExchange::new(&SHARED_SECRET, vec![CURRENT_CRC]).unwrap(),
        target_drive,
        drive_id,
        _temp_dir: temp_dir,
    }
}

impl TestApp {
    pub fn instruction_set(&self, public_key_crc: u32) -> EncryptedRecipientTransferInstructionSet {
        EncryptedRecipientTransferInstructionSet {
            public_key_crc,
            target_drive: self.target_drive,
            file_system_type: FileSystemType::Standard,
            transfer_file_type: TransferFileType::Normal,
            shared_secret_encrypted_key_header: self
                .key_exchange
                .encrypt_key_header(&key_header())
                .unwrap(),
        }
    }

    pub async fn inbox_len(&self) -> u64 {
        self.state.inbox.status(None).await.unwrap().total_items
    }

    /// Temp entries left on the test drive.
    pub fn temp_count(&self) -> usize {
        let dir = self
            ._temp_dir
            .path()
            .join("drives")
            .join(self.drive_id.to_string())
            .join("temp");
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }
}
