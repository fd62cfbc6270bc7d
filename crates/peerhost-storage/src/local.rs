use crate::traits::{DriveFileSystem, PartReader, StorageError, StorageResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerhost_core::models::{
    FileMetadata, FileState, InternalDriveFileId, KeyHeader, OdinId, ServerFileHeader,
    ServerMetadata, TargetDrive,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

const DRIVE_REGISTRY_FILE: &str = "drives.json";
const HEADER_SUFFIX: &str = ".header.json";
const PAYLOAD_SUFFIX: &str = ".payload";
const STAGED_PAYLOAD_SUFFIX: &str = ".payload.new";
const MAX_EXTENSION_LEN: usize = 32;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveRecord {
    target_drive: TargetDrive,
    drive_id: Uuid,
}

/// Per-drive lookup tables over the committed headers.
#[derive(Debug, Default)]
struct DriveIndex {
    headers: HashMap<Uuid, ServerFileHeader>,
    by_unique_id: HashMap<Uuid, Uuid>,
    by_global_transit_id: HashMap<Uuid, Uuid>,
}

impl DriveIndex {
    fn insert(&mut self, header: ServerFileHeader) {
        let file_id = header.file.file_id;
        self.remove_keys(file_id);
        if let Some(uid) = header.file_metadata.unique_id() {
            self.by_unique_id.insert(uid, file_id);
        }
        if let Some(gtid) = header.file_metadata.global_transit_id {
            self.by_global_transit_id.insert(gtid, file_id);
        }
        self.headers.insert(file_id, header);
    }

    fn remove_keys(&mut self, file_id: Uuid) {
        if let Some(existing) = self.headers.get(&file_id) {
            if let Some(uid) = existing.file_metadata.unique_id() {
                if self.by_unique_id.get(&uid) == Some(&file_id) {
                    self.by_unique_id.remove(&uid);
                }
            }
            if let Some(gtid) = existing.file_metadata.global_transit_id {
                if self.by_global_transit_id.get(&gtid) == Some(&file_id) {
                    self.by_global_transit_id.remove(&gtid);
                }
            }
        }
    }

    /// Dedup ids must not already belong to a different file.
    fn ensure_keys_free(&self, file_id: Uuid, metadata: &FileMetadata) -> StorageResult<()> {
        if let Some(uid) = metadata.unique_id() {
            if let Some(owner) = self.by_unique_id.get(&uid) {
                if *owner != file_id {
                    return Err(StorageError::DuplicateKey(format!(
                        "unique id {} already used by file {}",
                        uid, owner
                    )));
                }
            }
        }
        if let Some(gtid) = metadata.global_transit_id {
            if let Some(owner) = self.by_global_transit_id.get(&gtid) {
                if *owner != file_id {
                    return Err(StorageError::DuplicateKey(format!(
                        "global transit id {} already used by file {}",
                        gtid, owner
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Local filesystem drive storage
///
/// Headers are kept as JSON next to the payload and mirrored in an in-memory
/// index that is rebuilt from disk on startup. Mutations of one drive are
/// serialized by that drive's lock; the index lock is only held for lookups and
/// in-memory updates.
pub struct LocalDriveFileSystem {
    base_path: PathBuf,
    drives: RwLock<HashMap<TargetDrive, Uuid>>,
    index: RwLock<HashMap<Uuid, DriveIndex>>,
    drive_locks: RwLock<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl LocalDriveFileSystem {
    /// Open (or create) drive storage rooted at `base_path`.
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let storage = LocalDriveFileSystem {
            base_path,
            drives: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            drive_locks: RwLock::new(HashMap::new()),
        };
        storage.load().await?;
        Ok(storage)
    }

    async fn load(&self) -> StorageResult<()> {
        let registry_path = self.base_path.join(DRIVE_REGISTRY_FILE);
        if !fs::try_exists(&registry_path).await.unwrap_or(false) {
            return Ok(());
        }

        let raw = fs::read(&registry_path).await?;
        let records: Vec<DriveRecord> = serde_json::from_slice(&raw)
            .map_err(|e| StorageError::CorruptHeader(format!("drive registry: {}", e)))?;

        let mut drives = self.drives.write().await;
        let mut index = self.index.write().await;
        let mut drive_locks = self.drive_locks.write().await;
        let mut header_count = 0usize;

        for record in records {
            drives.insert(record.target_drive, record.drive_id);
            drive_locks.entry(record.drive_id).or_default();
            let drive_index = index.entry(record.drive_id).or_default();

            let files_dir = self.files_dir(record.drive_id);
            if !fs::try_exists(&files_dir).await.unwrap_or(false) {
                continue;
            }
            let mut entries = fs::read_dir(&files_dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let name = entry.file_name().to_string_lossy().to_string();
                if !name.ends_with(HEADER_SUFFIX) {
                    continue;
                }
                let raw = fs::read(entry.path()).await?;
                let header: ServerFileHeader = serde_json::from_slice(&raw)
                    .map_err(|e| StorageError::CorruptHeader(format!("{}: {}", name, e)))?;
                drive_index.insert(header);
                header_count += 1;
            }
        }

        tracing::info!(
            path = %self.base_path.display(),
            drives = drives.len(),
            files = header_count,
            "Drive storage index loaded"
        );

        Ok(())
    }

    async fn persist_registry(&self, drives: &HashMap<TargetDrive, Uuid>) -> StorageResult<()> {
        let records: Vec<DriveRecord> = drives
            .iter()
            .map(|(target_drive, drive_id)| DriveRecord {
                target_drive: *target_drive,
                drive_id: *drive_id,
            })
            .collect();
        let json = serde_json::to_vec_pretty(&records)
            .map_err(|e| StorageError::WriteFailed(format!("drive registry: {}", e)))?;
        write_atomic(&self.base_path.join(DRIVE_REGISTRY_FILE), &json).await
    }

    fn drive_dir(&self, drive_id: Uuid) -> PathBuf {
        self.base_path.join("drives").join(drive_id.to_string())
    }

    fn temp_dir(&self, drive_id: Uuid) -> PathBuf {
        self.drive_dir(drive_id).join("temp")
    }

    fn files_dir(&self, drive_id: Uuid) -> PathBuf {
        self.drive_dir(drive_id).join("files")
    }

    fn temp_path(&self, file: &InternalDriveFileId, extension: &str) -> StorageResult<PathBuf> {
        validate_extension(extension)?;
        Ok(self
            .temp_dir(file.drive_id)
            .join(format!("{}.{}", file.file_id, extension)))
    }

    fn payload_path(&self, file: &InternalDriveFileId) -> PathBuf {
        self.files_dir(file.drive_id)
            .join(format!("{}{}", file.file_id, PAYLOAD_SUFFIX))
    }

    fn header_path(&self, file: &InternalDriveFileId) -> PathBuf {
        self.files_dir(file.drive_id)
            .join(format!("{}{}", file.file_id, HEADER_SUFFIX))
    }

    async fn ensure_drive(&self, drive_id: Uuid) -> StorageResult<()> {
        if self.index.read().await.contains_key(&drive_id) {
            Ok(())
        } else {
            Err(StorageError::DriveNotFound(drive_id.to_string()))
        }
    }

    async fn write_header(&self, header: &ServerFileHeader) -> StorageResult<()> {
        let json = serde_json::to_vec_pretty(header)
            .map_err(|e| StorageError::WriteFailed(format!("header {}: {}", header.file, e)))?;
        write_atomic(&self.header_path(&header.file), &json).await
    }

    fn staged_payload_path(&self, file: &InternalDriveFileId) -> PathBuf {
        self.files_dir(file.drive_id)
            .join(format!("{}{}", file.file_id, STAGED_PAYLOAD_SUFFIX))
    }

    async fn lock_drive(&self, drive_id: Uuid) -> StorageResult<OwnedMutexGuard<()>> {
        let lock = self
            .drive_locks
            .read()
            .await
            .get(&drive_id)
            .cloned()
            .ok_or_else(|| StorageError::DriveNotFound(drive_id.to_string()))?;
        Ok(lock.lock_owned().await)
    }

    async fn indexed_header(&self, file: &InternalDriveFileId) -> StorageResult<ServerFileHeader> {
        let index = self.index.read().await;
        let drive_index = index
            .get(&file.drive_id)
            .ok_or_else(|| StorageError::DriveNotFound(file.drive_id.to_string()))?;
        drive_index
            .headers
            .get(&file.file_id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(file.to_string()))
    }

    async fn index_header(&self, header: ServerFileHeader) {
        self.index
            .write()
            .await
            .entry(header.file.drive_id)
            .or_default()
            .insert(header);
    }

    /// Move a temp part next to the payload slot of `target` without replacing
    /// the current payload. Returns the staged path and its size.
    async fn stage_temp_payload(
        &self,
        temp_file: &InternalDriveFileId,
        target: &InternalDriveFileId,
        payload_extension: &str,
    ) -> StorageResult<(PathBuf, u64)> {
        let from = self.temp_path(temp_file, payload_extension)?;
        if !fs::try_exists(&from).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!(
                "temp part {}.{}",
                temp_file, payload_extension
            )));
        }
        let to = self.staged_payload_path(target);
        ensure_parent_dir(&to).await?;
        fs::rename(&from, &to).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to move {} to {}: {}",
                from.display(),
                to.display(),
                e
            ))
        })?;
        let size = fs::metadata(&to).await?.len();
        Ok((to, size))
    }

    /// Put a staged payload back into temp storage so the commit can be retried.
    async fn restore_staged_payload(
        &self,
        staged: &Path,
        temp_file: &InternalDriveFileId,
        payload_extension: &str,
    ) {
        let restored = match self.temp_path(temp_file, payload_extension) {
            Ok(temp) => fs::rename(staged, &temp).await.map_err(StorageError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            tracing::error!(
                staged = %staged.display(),
                temp_file = %temp_file,
                error = %e,
                "Failed to restore staged payload, removing it"
            );
            let _ = fs::remove_file(staged).await;
        }
    }

    /// Write `header`, then move the staged payload into place.
    ///
    /// On failure the stored file is left as `previous` (or absent) and the
    /// payload is back in temp storage.
    async fn publish_staged(
        &self,
        header: &ServerFileHeader,
        previous: Option<&ServerFileHeader>,
        staged: &Path,
        temp_file: &InternalDriveFileId,
        payload_extension: &str,
    ) -> StorageResult<()> {
        if let Err(e) = self.write_header(header).await {
            self.restore_staged_payload(staged, temp_file, payload_extension)
                .await;
            return Err(e);
        }

        let payload = self.payload_path(&header.file);
        if let Err(e) = fs::rename(staged, &payload).await {
            let rollback = match previous {
                Some(previous) => self.write_header(previous).await,
                None => fs::remove_file(self.header_path(&header.file))
                    .await
                    .map_err(StorageError::from),
            };
            if let Err(rollback_error) = rollback {
                tracing::error!(
                    file = %header.file,
                    error = %rollback_error,
                    "Failed to roll back header after payload move failed"
                );
            }
            self.restore_staged_payload(staged, temp_file, payload_extension)
                .await;
            return Err(StorageError::WriteFailed(format!(
                "Failed to move {} to {}: {}",
                staged.display(),
                payload.display(),
                e
            )));
        }
        Ok(())
    }
}

fn validate_extension(extension: &str) -> StorageResult<()> {
    let valid = !extension.is_empty()
        && extension.len() <= MAX_EXTENSION_LEN
        && extension.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidExtension(extension.to_string()))
    }
}

async fn ensure_parent_dir(path: &Path) -> StorageResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
    ensure_parent_dir(path).await?;
    let tmp = path.with_extension("tmp");

    let mut file = fs::File::create(&tmp).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to create file {}: {}", tmp.display(), e))
    })?;
    file.write_all(data).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to write file {}: {}", tmp.display(), e))
    })?;
    file.sync_all().await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to sync file {}: {}", tmp.display(), e))
    })?;

    fs::rename(&tmp, path).await.map_err(|e| {
        StorageError::WriteFailed(format!("Failed to rename to {}: {}", path.display(), e))
    })?;
    Ok(())
}

#[async_trait]
impl DriveFileSystem for LocalDriveFileSystem {
    async fn get_drive_id(&self, target_drive: &TargetDrive) -> StorageResult<Option<Uuid>> {
        Ok(self.drives.read().await.get(target_drive).copied())
    }

    async fn create_drive(&self, target_drive: TargetDrive) -> StorageResult<Uuid> {
        let mut drives = self.drives.write().await;
        if let Some(drive_id) = drives.get(&target_drive) {
            return Ok(*drive_id);
        }

        let drive_id = Uuid::new_v4();
        fs::create_dir_all(self.temp_dir(drive_id)).await?;
        fs::create_dir_all(self.files_dir(drive_id)).await?;

        drives.insert(target_drive, drive_id);
        self.persist_registry(&drives).await?;
        self.drive_locks.write().await.entry(drive_id).or_default();
        self.index.write().await.entry(drive_id).or_default();

        tracing::info!(
            drive_id = %drive_id,
            target_drive = %target_drive,
            "Drive created"
        );

        Ok(drive_id)
    }

    async fn write_temp_stream(
        &self,
        file: &InternalDriveFileId,
        extension: &str,
        mut reader: PartReader,
    ) -> StorageResult<u64> {
        self.ensure_drive(file.drive_id).await?;
        let path = self.temp_path(file, extension)?;
        let start = std::time::Instant::now();

        ensure_parent_dir(&path).await?;

        let mut out = fs::File::create(&path).await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        let bytes_copied = tokio::io::copy(&mut reader, &mut out).await.map_err(|e| {
            StorageError::WriteFailed(format!(
                "Failed to write stream to file {}: {}",
                path.display(),
                e
            ))
        })?;

        out.sync_all().await.map_err(|e| {
            StorageError::WriteFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            path = %path.display(),
            size_bytes = bytes_copied,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Temp part written"
        );

        Ok(bytes_copied)
    }

    async fn get_temp_stream(
        &self,
        file: &InternalDriveFileId,
        extension: &str,
    ) -> StorageResult<PartReader> {
        let path = self.temp_path(file, extension)?;
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(format!("temp part {}.{}", file, extension)));
        }
        let handle = fs::File::open(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;
        Ok(Box::pin(handle))
    }

    async fn delete_temp_files(&self, file: &InternalDriveFileId) -> StorageResult<()> {
        let dir = self.temp_dir(file.drive_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(());
        }

        let prefix = format!("{}.", file.file_id);
        let mut removed = 0usize;
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_name().to_string_lossy().starts_with(&prefix) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(StorageError::DeleteFailed(format!(
                        "Failed to delete {}: {}",
                        entry.path().display(),
                        e
                    )))
                }
            }
        }

        if removed > 0 {
            tracing::debug!(file = %file, parts = removed, "Temp parts deleted");
        }
        Ok(())
    }

    async fn temp_file_exists(&self, file: &InternalDriveFileId) -> StorageResult<bool> {
        let dir = self.temp_dir(file.drive_id);
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(false);
        }
        let prefix = format!("{}.", file.file_id);
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn commit_new_file(
        &self,
        file: &InternalDriveFileId,
        key_header: KeyHeader,
        mut metadata: FileMetadata,
        server_metadata: ServerMetadata,
        payload_extension: &str,
    ) -> StorageResult<ServerFileHeader> {
        let start = std::time::Instant::now();
        let _drive = self.lock_drive(file.drive_id).await?;

        {
            let index = self.index.read().await;
            let drive_index = index
                .get(&file.drive_id)
                .ok_or_else(|| StorageError::DriveNotFound(file.drive_id.to_string()))?;
            if drive_index.headers.contains_key(&file.file_id) {
                return Err(StorageError::DuplicateKey(format!("file {} already exists", file)));
            }
            drive_index.ensure_keys_free(file.file_id, &metadata)?;
        }

        let (staged, payload_size) = self
            .stage_temp_payload(file, file, payload_extension)
            .await?;

        let now = Utc::now();
        metadata.version_tag = Some(Uuid::new_v4());
        metadata.created = Some(now);
        metadata.updated = Some(now);

        let header = ServerFileHeader {
            file: *file,
            file_state: FileState::Active,
            key_header,
            file_metadata: metadata,
            server_metadata,
            payload_size,
            created_at: now,
            updated_at: now,
        };
        self.publish_staged(&header, None, &staged, file, payload_extension)
            .await?;
        self.index_header(header.clone()).await;

        tracing::info!(
            file = %file,
            size_bytes = payload_size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "New file committed"
        );

        Ok(header)
    }

    async fn overwrite_file(
        &self,
        temp_file: &InternalDriveFileId,
        target_file: &InternalDriveFileId,
        key_header: KeyHeader,
        mut metadata: FileMetadata,
        server_metadata: ServerMetadata,
        payload_extension: &str,
    ) -> StorageResult<ServerFileHeader> {
        let start = std::time::Instant::now();
        let _drive = self.lock_drive(target_file.drive_id).await?;

        let existing = {
            let index = self.index.read().await;
            let drive_index = index
                .get(&target_file.drive_id)
                .ok_or_else(|| StorageError::DriveNotFound(target_file.drive_id.to_string()))?;
            let existing = drive_index
                .headers
                .get(&target_file.file_id)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(target_file.to_string()))?;

            if existing.file_metadata.version_tag != metadata.version_tag {
                return Err(StorageError::VersionTagMismatch {
                    file: *target_file,
                    expected: existing.file_metadata.version_tag,
                    found: metadata.version_tag,
                });
            }
            drive_index.ensure_keys_free(target_file.file_id, &metadata)?;
            existing
        };

        let (staged, payload_size) = self
            .stage_temp_payload(temp_file, target_file, payload_extension)
            .await?;

        let now = Utc::now();
        metadata.version_tag = Some(Uuid::new_v4());
        metadata.created = existing.file_metadata.created;
        metadata.updated = Some(now);

        let header = ServerFileHeader {
            file: *target_file,
            file_state: FileState::Active,
            key_header,
            file_metadata: metadata,
            server_metadata,
            payload_size,
            created_at: existing.created_at,
            updated_at: now,
        };
        self.publish_staged(&header, Some(&existing), &staged, temp_file, payload_extension)
            .await?;
        self.index_header(header.clone()).await;

        tracing::info!(
            file = %target_file,
            temp_file = %temp_file,
            size_bytes = payload_size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "File overwritten"
        );

        Ok(header)
    }

    async fn soft_delete_long_term_file(&self, file: &InternalDriveFileId) -> StorageResult<()> {
        let _drive = self.lock_drive(file.drive_id).await?;
        let mut header = self.indexed_header(file).await?;

        if header.file_state == FileState::Deleted {
            return Ok(());
        }

        let now = Utc::now();
        header.file_state = FileState::Deleted;
        header.payload_size = 0;
        header.updated_at = now;
        header.file_metadata.updated = Some(now);
        header.file_metadata.version_tag = Some(Uuid::new_v4());
        self.write_header(&header).await?;
        self.index_header(header).await;

        let payload = self.payload_path(file);
        match fs::remove_file(&payload).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete {}: {}",
                    payload.display(),
                    e
                )))
            }
        }

        tracing::info!(file = %file, "File soft deleted");
        Ok(())
    }

    async fn record_read_receipt(
        &self,
        file: &InternalDriveFileId,
        reader: &OdinId,
        read_at: DateTime<Utc>,
    ) -> StorageResult<ServerFileHeader> {
        let _drive = self.lock_drive(file.drive_id).await?;
        let mut header = self.indexed_header(file).await?;

        // First receipt wins; a repeated one must not move the read time.
        if header.server_metadata.read_receipts.contains_key(reader) {
            return Ok(header);
        }
        header
            .server_metadata
            .read_receipts
            .insert(reader.clone(), read_at);
        self.write_header(&header).await?;
        self.index_header(header.clone()).await;

        tracing::info!(file = %file, reader = %reader, "Read receipt recorded");
        Ok(header)
    }

    async fn get_file_by_client_unique_id(
        &self,
        drive_id: Uuid,
        unique_id: Uuid,
    ) -> StorageResult<Option<ServerFileHeader>> {
        let index = self.index.read().await;
        let drive_index = index
            .get(&drive_id)
            .ok_or_else(|| StorageError::DriveNotFound(drive_id.to_string()))?;
        Ok(drive_index
            .by_unique_id
            .get(&unique_id)
            .and_then(|file_id| drive_index.headers.get(file_id))
            .cloned())
    }

    async fn get_file_by_global_transit_id(
        &self,
        drive_id: Uuid,
        global_transit_id: Uuid,
    ) -> StorageResult<Option<ServerFileHeader>> {
        let index = self.index.read().await;
        let drive_index = index
            .get(&drive_id)
            .ok_or_else(|| StorageError::DriveNotFound(drive_id.to_string()))?;
        Ok(drive_index
            .by_global_transit_id
            .get(&global_transit_id)
            .and_then(|file_id| drive_index.headers.get(file_id))
            .cloned())
    }

    async fn file_exists(&self, file: &InternalDriveFileId) -> StorageResult<bool> {
        Ok(self
            .index
            .read()
            .await
            .get(&file.drive_id)
            .map(|d| d.headers.contains_key(&file.file_id))
            .unwrap_or(false))
    }

    async fn get_server_file_header(
        &self,
        file: &InternalDriveFileId,
    ) -> StorageResult<Option<ServerFileHeader>> {
        Ok(self
            .index
            .read()
            .await
            .get(&file.drive_id)
            .and_then(|d| d.headers.get(&file.file_id))
            .cloned())
    }

    async fn get_payload(&self, file: &InternalDriveFileId) -> StorageResult<Vec<u8>> {
        let path = self.payload_path(file);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(file.to_string()));
        }
        fs::read(&path).await.map_err(|e| {
            StorageError::ReadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })
    }
}
