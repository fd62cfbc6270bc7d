//! Transit wire protocol types.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

use super::{FileSystemType, TargetDrive};

/// Multipart sections of an incoming transfer, in the order they must arrive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MultipartPart {
    TransferKeyHeader,
    Metadata,
    Payload,
}

impl MultipartPart {
    pub const ORDER: [MultipartPart; 3] = [
        MultipartPart::TransferKeyHeader,
        MultipartPart::Metadata,
        MultipartPart::Payload,
    ];

    /// The part expected after `previous`; `None` once the terminal part has arrived.
    pub fn next_after(previous: Option<MultipartPart>) -> Option<MultipartPart> {
        match previous {
            None => Some(MultipartPart::TransferKeyHeader),
            Some(MultipartPart::TransferKeyHeader) => Some(MultipartPart::Metadata),
            Some(MultipartPart::Metadata) => Some(MultipartPart::Payload),
            Some(MultipartPart::Payload) => None,
        }
    }

    /// Extension used for the part's temp file.
    pub fn extension(&self) -> &'static str {
        match self {
            MultipartPart::TransferKeyHeader => "transferkeyheader",
            MultipartPart::Metadata => "metadata",
            MultipartPart::Payload => "payload",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MultipartPart::Payload)
    }
}

impl Display for MultipartPart {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.extension())
    }
}

impl FromStr for MultipartPart {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "transferkeyheader" => Ok(MultipartPart::TransferKeyHeader),
            "metadata" => Ok(MultipartPart::Metadata),
            "payload" => Ok(MultipartPart::Payload),
            _ => Err(anyhow::anyhow!("Unknown multipart section: {}", s)),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransferFileType {
    #[default]
    Normal,
    CommandMessage,
}

impl Display for TransferFileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransferFileType::Normal => write!(f, "normal"),
            TransferFileType::CommandMessage => write!(f, "command_message"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferInstructionType {
    SaveFile,
    DeleteLinkedFile,
    ReadReceipt,
}

impl Display for TransferInstructionType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransferInstructionType::SaveFile => write!(f, "save_file"),
            TransferInstructionType::DeleteLinkedFile => write!(f, "delete_linked_file"),
            TransferInstructionType::ReadReceipt => write!(f, "read_receipt"),
        }
    }
}

impl FromStr for TransferInstructionType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "save_file" => Ok(TransferInstructionType::SaveFile),
            "delete_linked_file" => Ok(TransferInstructionType::DeleteLinkedFile),
            "read_receipt" => Ok(TransferInstructionType::ReadReceipt),
            _ => Err(anyhow::anyhow!("Invalid instruction type: {}", s)),
        }
    }
}

/// Recommendation of a filter (and recorded outcome of a part).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterAction {
    Accept,
    Quarantine,
    Reject,
}

impl Display for FilterAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FilterAction::Accept => write!(f, "accept"),
            FilterAction::Quarantine => write!(f, "quarantine"),
            FilterAction::Reject => write!(f, "reject"),
        }
    }
}

/// Disposition of a transfer reported back to the sending identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitResponseCode {
    Accepted,
    QuarantinedPayload,
    Rejected,
}

impl Display for TransitResponseCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            TransitResponseCode::Accepted => write!(f, "accepted"),
            TransitResponseCode::QuarantinedPayload => write!(f, "quarantinedPayload"),
            TransitResponseCode::Rejected => write!(f, "rejected"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostTransitResponse {
    pub code: TransitResponseCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl HostTransitResponse {
    pub fn new(code: TransitResponseCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: TransitResponseCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// A key header encrypted under the transfer's shared secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedKeyHeader {
    #[serde(with = "super::base64_bytes")]
    pub iv: Vec<u8>,
    #[serde(with = "super::base64_bytes")]
    pub encrypted_aes_key: Vec<u8>,
}

impl std::fmt::Debug for EncryptedKeyHeader {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("EncryptedKeyHeader")
            .field("iv_len", &self.iv.len())
            .field("encrypted_aes_key_len", &self.encrypted_aes_key.len())
            .finish()
    }
}

/// Content of the `transferKeyHeader` section: how to open the transfer and where it goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecipientTransferInstructionSet {
    pub public_key_crc: u32,
    pub target_drive: TargetDrive,
    #[serde(default)]
    pub file_system_type: FileSystemType,
    #[serde(default)]
    pub transfer_file_type: TransferFileType,
    pub shared_secret_encrypted_key_header: EncryptedKeyHeader,
}

/// Body of the delete-linked-file side channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLinkedFileRequest {
    pub target_drive: TargetDrive,
    pub global_transit_id: Uuid,
    #[serde(default)]
    pub file_system_type: FileSystemType,
}

/// Body of the read-receipt side channel: the caller has read the file we sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkFileAsReadRequest {
    pub target_drive: TargetDrive,
    pub global_transit_id: Uuid,
    #[serde(default)]
    pub file_system_type: FileSystemType,
}
