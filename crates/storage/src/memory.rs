//! In-memory storage backends
//!
//! Used by the test suites and local dry runs. Semantics match the real
//! backends: object keys are flat strings, analysis writes are
//! last-write-wins upserts, prompt reads miss with `NotFound`.

use std::collections::HashMap;
use std::path::Path;

use tokio::sync::RwLock;
use video_narrative_common::VideoId;

use crate::{
    AnalysisRecord, AnalysisStore, ObjectStorage, PromptRecord, PromptStore, StorageError,
    StorageResult,
};

/// In-memory object storage
#[derive(Debug, Default)]
pub struct MemoryObjectStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryObjectStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    /// True when nothing has been stored
    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl ObjectStorage for MemoryObjectStorage {
    async fn store_file(&self, key: &str, data: &[u8]) -> StorageResult<String> {
        self.objects
            .write()
            .await
            .insert(key.to_string(), data.to_vec());
        Ok(key.to_string())
    }

    async fn store_file_from_path(&self, key: &str, path: &Path) -> StorageResult<String> {
        let data = tokio::fs::read(path).await?;
        self.store_file(key, &data).await
    }

    async fn retrieve_file(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn retrieve_file_to_path(&self, key: &str, path: &Path) -> StorageResult<()> {
        let data = self.retrieve_file(key).await?;
        tokio::fs::write(path, data).await?;
        Ok(())
    }

    async fn list_files(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .objects
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// In-memory analysis store
#[derive(Debug, Default)]
pub struct MemoryAnalysisStore {
    records: RwLock<HashMap<(String, String), AnalysisRecord>>,
}

impl MemoryAnalysisStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total record count across all videos
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// True when no record has been written
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl AnalysisStore for MemoryAnalysisStore {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn put(&self, record: &AnalysisRecord) -> StorageResult<()> {
        let key = (
            record.video_id.as_str().to_string(),
            record.record_key.clone(),
        );
        self.records.write().await.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, video_id: &VideoId, record_key: &str) -> StorageResult<AnalysisRecord> {
        let key = (video_id.as_str().to_string(), record_key.to_string());
        self.records
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{video_id}/{record_key}")))
    }

    async fn list_for_video(
        &self,
        video_id: &VideoId,
        key_prefix: &str,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let mut records: Vec<AnalysisRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.video_id == *video_id && r.record_key.starts_with(key_prefix))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.record_key.cmp(&b.record_key));
        Ok(records)
    }
}

/// In-memory prompt store
#[derive(Debug, Default)]
pub struct MemoryPromptStore {
    records: RwLock<HashMap<(String, String), PromptRecord>>,
}

impl MemoryPromptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PromptStore for MemoryPromptStore {
    async fn init_schema(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn put(&self, record: &PromptRecord) -> StorageResult<()> {
        let key = (record.prompt_id.clone(), record.version_id.clone());
        self.records.write().await.insert(key, record.clone());
        Ok(())
    }

    async fn get(&self, prompt_id: &str, version_id: &str) -> StorageResult<PromptRecord> {
        let key = (prompt_id.to_string(), version_id.to_string());
        self.records
            .read()
            .await
            .get(&key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{prompt_id}/{version_id}")))
    }
}
