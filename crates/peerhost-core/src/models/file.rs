use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::{FileSystemType, InternalDriveFileId, OdinId, TargetDrive};

pub const KEY_HEADER_IV_LEN: usize = 16;
pub const KEY_HEADER_AES_KEY_LEN: usize = 32;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SecurityGroupType {
    Anonymous,
    Authenticated,
    Connected,
    #[default]
    Owner,
}

impl Display for SecurityGroupType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SecurityGroupType::Anonymous => write!(f, "anonymous"),
            SecurityGroupType::Authenticated => write!(f, "authenticated"),
            SecurityGroupType::Connected => write!(f, "connected"),
            SecurityGroupType::Owner => write!(f, "owner"),
        }
    }
}

impl FromStr for SecurityGroupType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anonymous" => Ok(SecurityGroupType::Anonymous),
            "authenticated" => Ok(SecurityGroupType::Authenticated),
            "connected" => Ok(SecurityGroupType::Connected),
            "owner" => Ok(SecurityGroupType::Owner),
            _ => Err(anyhow::anyhow!("Invalid security group: {}", s)),
        }
    }
}

/// Who may read a file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessControlList {
    pub required_security_group: SecurityGroupType,
    #[serde(default)]
    pub circle_id_list: Vec<Uuid>,
    #[serde(default)]
    pub odin_id_list: Vec<OdinId>,
}

impl AccessControlList {
    pub fn owner_only() -> Self {
        Self::default()
    }
}

/// Application-level data the client attaches to a file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    #[serde(default)]
    pub unique_id: Option<Uuid>,
    #[serde(default)]
    pub file_type: i32,
    #[serde(default)]
    pub data_type: i32,
    #[serde(default)]
    pub group_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<Uuid>,
    #[serde(default)]
    pub content: Option<String>,
}

/// Points at a file on another drive (or identity) by its global transit id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalTransitIdFileIdentifier {
    pub target_drive: TargetDrive,
    pub global_transit_id: Uuid,
}

/// Client-visible metadata of a file, as carried in the `metadata` part of a transfer.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    #[serde(default)]
    pub global_transit_id: Option<Uuid>,
    #[serde(default)]
    pub app_data: AppData,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub sender_odin_id: Option<OdinId>,
    #[serde(default)]
    pub version_tag: Option<Uuid>,
    #[serde(default)]
    pub referenced_file: Option<GlobalTransitIdFileIdentifier>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

impl FileMetadata {
    pub fn unique_id(&self) -> Option<Uuid> {
        self.app_data.unique_id
    }
}

/// Server-only metadata: access control and system flags.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMetadata {
    pub access_control_list: AccessControlList,
    #[serde(default)]
    pub file_system_type: FileSystemType,
    #[serde(default)]
    pub do_not_index: bool,
    #[serde(default)]
    pub allow_distribution: bool,
    /// When each recipient reported reading the file.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub read_receipts: BTreeMap<OdinId, DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileState {
    #[default]
    Active,
    Deleted,
}

impl Display for FileState {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileState::Active => write!(f, "active"),
            FileState::Deleted => write!(f, "deleted"),
        }
    }
}

/// The symmetric key and IV protecting one file's payload.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyHeader {
    #[serde(with = "super::base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "super::base64_bytes")]
    pub aes_key: Vec<u8>,
}

impl KeyHeader {
    /// Key header used for files that are not encrypted.
    pub fn empty() -> Self {
        Self {
            iv: vec![0u8; KEY_HEADER_IV_LEN],
            aes_key: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.aes_key.is_empty()
    }

    /// Split a decrypted `iv || aes_key` buffer.
    pub fn from_combined(bytes: &[u8]) -> Result<Self, anyhow::Error> {
        if bytes.len() != KEY_HEADER_IV_LEN + KEY_HEADER_AES_KEY_LEN {
            return Err(anyhow::anyhow!(
                "Key header must be {} bytes, got {}",
                KEY_HEADER_IV_LEN + KEY_HEADER_AES_KEY_LEN,
                bytes.len()
            ));
        }
        let (iv, aes_key) = bytes.split_at(KEY_HEADER_IV_LEN);
        Ok(Self {
            iv: iv.to_vec(),
            aes_key: aes_key.to_vec(),
        })
    }

    pub fn combined(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.iv.len() + self.aes_key.len());
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.aes_key);
        out
    }
}

impl Debug for KeyHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("KeyHeader")
            .field("iv_len", &self.iv.len())
            .field("aes_key", &"[REDACTED]")
            .finish()
    }
}

/// Everything the drive stores about one long-term file, minus its payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerFileHeader {
    pub file: InternalDriveFileId,
    pub file_state: FileState,
    pub key_header: KeyHeader,
    pub file_metadata: FileMetadata,
    pub server_metadata: ServerMetadata,
    pub payload_size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ServerFileHeader {
    pub fn is_active(&self) -> bool {
        self.file_state == FileState::Active
    }

    pub fn version_tag(&self) -> Option<Uuid> {
        self.file_metadata.version_tag
    }

    pub fn original_sender(&self) -> Option<&OdinId> {
        self.file_metadata.sender_odin_id.as_ref()
    }
}
