//! In-flight transfer state.
//!
//! One [`IncomingTransferStateItem`] exists per transfer between initialization and
//! finalization (or discard). The tracker is sharded so operations on different
//! transfer ids rarely contend on the same lock.

use chrono::{DateTime, Utc};
use peerhost_core::models::{
    EncryptedRecipientTransferInstructionSet, FileSystemType, FilterAction, InternalDriveFileId,
    MultipartPart, OdinId, TargetDrive, TransferFileType,
};
use peerhost_core::AppError;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_SHARD_COUNT: usize = 16;

/// Recorded outcome of one part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartState {
    pub outcome: FilterAction,
    pub extension: &'static str,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct IncomingTransferStateItem {
    pub id: Uuid,
    pub sender: OdinId,
    pub public_key_crc: u32,
    pub target_drive: TargetDrive,
    /// Temp storage owned by this transfer until it is finalized or discarded.
    pub temp_file: InternalDriveFileId,
    pub transfer_file_system_type: FileSystemType,
    pub transfer_file_type: TransferFileType,
    pub instruction_set: EncryptedRecipientTransferInstructionSet,
    pub created_at: DateTime<Utc>,
    parts: BTreeMap<MultipartPart, PartState>,
}

impl IncomingTransferStateItem {
    pub fn new(
        sender: OdinId,
        temp_file: InternalDriveFileId,
        instruction_set: EncryptedRecipientTransferInstructionSet,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            public_key_crc: instruction_set.public_key_crc,
            target_drive: instruction_set.target_drive,
            temp_file,
            transfer_file_system_type: instruction_set.file_system_type,
            transfer_file_type: instruction_set.transfer_file_type,
            instruction_set,
            created_at: Utc::now(),
            parts: BTreeMap::new(),
        }
    }

    pub fn part(&self, part: MultipartPart) -> Option<&PartState> {
        self.parts.get(&part)
    }

    pub fn parts(&self) -> impl Iterator<Item = (&MultipartPart, &PartState)> {
        self.parts.iter()
    }

    /// The part the wire protocol expects next, `None` once the payload arrived.
    pub fn expected_next_part(&self) -> Option<MultipartPart> {
        MultipartPart::next_after(self.parts.keys().next_back().copied())
    }

    pub fn has_rejected_part(&self) -> bool {
        self.parts
            .values()
            .any(|p| p.outcome == FilterAction::Reject)
    }

    pub fn has_quarantined_part(&self) -> bool {
        self.parts
            .values()
            .any(|p| p.outcome == FilterAction::Quarantine)
    }

    /// All required parts are present and accepted.
    pub fn is_complete_and_valid(&self) -> bool {
        self.parts.len() == MultipartPart::ORDER.len()
            && MultipartPart::ORDER.iter().all(|p| {
                self.parts
                    .get(p)
                    .map(|s| s.outcome == FilterAction::Accept)
                    .unwrap_or(false)
            })
    }

    /// Record a part outcome. Outcomes are never overwritten.
    pub fn record_part(&mut self, part: MultipartPart, state: PartState) -> Result<(), AppError> {
        if self.parts.contains_key(&part) {
            return Err(AppError::Protocol(format!(
                "Part {} already received for transfer {}",
                part, self.id
            )));
        }
        self.parts.insert(part, state);
        Ok(())
    }
}

/// Sharded map of in-flight transfers keyed by transfer id.
pub struct TransferStateTracker {
    shards: Vec<Mutex<HashMap<Uuid, IncomingTransferStateItem>>>,
}

impl TransferStateTracker {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARD_COUNT)
    }

    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &Uuid) -> &Mutex<HashMap<Uuid, IncomingTransferStateItem>> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % self.shards.len()]
    }

    /// Store a new item and return its id.
    pub async fn insert(&self, item: IncomingTransferStateItem) -> Uuid {
        let id = item.id;
        self.shard(&id).lock().await.insert(id, item);
        id
    }

    /// Snapshot of the item.
    pub async fn get(&self, id: Uuid) -> Option<IncomingTransferStateItem> {
        self.shard(&id).lock().await.get(&id).cloned()
    }

    pub async fn record_part(
        &self,
        id: Uuid,
        part: MultipartPart,
        state: PartState,
    ) -> Result<(), AppError> {
        let mut shard = self.shard(&id).lock().await;
        let item = shard
            .get_mut(&id)
            .ok_or_else(|| AppError::TransferNotFound(id.to_string()))?;
        item.record_part(part, state)
    }

    /// Evict the item, handing ownership of its temp storage to the caller.
    pub async fn remove(&self, id: Uuid) -> Option<IncomingTransferStateItem> {
        self.shard(&id).lock().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.lock().await.len();
        }
        total
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for TransferStateTracker {
    fn default() -> Self {
        Self::new()
    }
}
