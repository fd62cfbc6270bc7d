use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

/// The (alias, type) pair identifying a drive across identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDrive {
    pub alias: Uuid,
    #[serde(rename = "type")]
    pub drive_type: Uuid,
}

impl Display for TargetDrive {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.alias, self.drive_type)
    }
}

/// A file addressed by its local drive id and file id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalDriveFileId {
    pub drive_id: Uuid,
    pub file_id: Uuid,
}

impl InternalDriveFileId {
    pub fn new(drive_id: Uuid, file_id: Uuid) -> Self {
        Self { drive_id, file_id }
    }
}

impl Display for InternalDriveFileId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}/{}", self.drive_id, self.file_id)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileSystemType {
    #[default]
    Standard,
    Comment,
}

impl Display for FileSystemType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            FileSystemType::Standard => write!(f, "standard"),
            FileSystemType::Comment => write!(f, "comment"),
        }
    }
}

impl FromStr for FileSystemType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "standard" => Ok(FileSystemType::Standard),
            "comment" => Ok(FileSystemType::Comment),
            _ => Err(anyhow::anyhow!("Invalid file system type: {}", s)),
        }
    }
}
