//! Storage layer for the video narrative pipeline
//!
//! This crate provides interfaces and implementations for the pipeline's
//! three persistence concerns:
//! - **Object Storage (S3/MinIO)**: source videos and extracted still frames
//! - **Analysis Store (`PostgreSQL`)**: per-batch and aggregate analysis records
//! - **Prompt Store (`PostgreSQL`)**: versioned prompt templates with a latest pointer
//!
//! Every backend is reachable through a trait so the pipeline stages stay
//! backend-agnostic; `memory` carries in-process implementations used by
//! tests and local runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use video_narrative_common::{SequenceId, VideoId, AGGREGATE_RECORD_MARKER};

pub mod analysis_storage;
pub mod memory;
pub mod object_storage;
pub mod prompt_storage;

pub use analysis_storage::{AnalysisStore, PostgresAnalysisStore, PostgresConfig};
pub use memory::{MemoryAnalysisStore, MemoryObjectStorage, MemoryPromptStore};
pub use object_storage::{ObjectStorage, S3Config, S3ObjectStorage};
pub use prompt_storage::{PostgresPromptStore, PromptStore};

/// Storage layer errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for all backends
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// S3/MinIO configuration for the video and image buckets
    #[serde(default)]
    pub s3: S3Config,

    /// `PostgreSQL` configuration for the analysis and prompt stores
    #[serde(default)]
    pub postgres: PostgresConfig,
}

/// A persisted analysis fact: one per described batch, plus one aggregate
/// per video.
///
/// `record_key` embeds the prompt version so re-runs under a new prompt
/// coexist with earlier results; writes for the same key overwrite
/// (idempotent retries).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub video_id: VideoId,
    /// `"<promptVersion>#<sequenceId>"` for batch records,
    /// `"<promptVersion>#full"` for the aggregate
    pub record_key: String,
    pub analysis: String,
    /// Source video URI; written by the aggregate record only
    pub video_s3_uri: Option<String>,
    /// User-facing video URL; written by the aggregate record only
    pub video_url: Option<String>,
    pub created: DateTime<Utc>,
}

/// Record key for one described batch
#[must_use]
pub fn batch_record_key(prompt_version: &str, sequence_id: SequenceId) -> String {
    format!("{prompt_version}#{sequence_id}")
}

/// Record key for the aggregate summary of a video
#[must_use]
pub fn aggregate_record_key(prompt_version: &str) -> String {
    format!("{prompt_version}#{AGGREGATE_RECORD_MARKER}")
}

/// One version of a prompt template as stored.
///
/// The reserved version `"v0"` is a pointer record: its `latest` field
/// names the current version number and its sections are empty. Real
/// versions are written once and never edited; staging a new prompt means
/// writing `v<N+1>` and then advancing the pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptRecord {
    pub prompt_id: String,
    pub version_id: String,
    /// Latest-version pointer; only meaningful on the `"v0"` record
    pub latest: Option<u32>,
    pub task_context: String,
    pub tone_context: String,
    pub task_description: String,
    pub examples: String,
    pub input_data: String,
    pub immediate_task: String,
    pub precognition: String,
    pub output_formatting: String,
    pub prefill: String,
}

impl PromptRecord {
    /// Empty record scaffold for a given id/version
    #[must_use]
    pub fn empty(prompt_id: &str, version_id: &str) -> Self {
        Self {
            prompt_id: prompt_id.to_string(),
            version_id: version_id.to_string(),
            latest: None,
            task_context: String::new(),
            tone_context: String::new(),
            task_description: String::new(),
            examples: String::new(),
            input_data: String::new(),
            immediate_task: String::new(),
            precognition: String::new(),
            output_formatting: String::new(),
            prefill: String::new(),
        }
    }

    /// The `"v0"` pointer record naming the latest version
    #[must_use]
    pub fn pointer(prompt_id: &str, latest: u32) -> Self {
        let mut record = Self::empty(prompt_id, "v0");
        record.latest = Some(latest);
        record
    }

    /// A content record for version `n`
    #[must_use]
    pub fn version(prompt_id: &str, n: u32) -> Self {
        Self::empty(prompt_id, &format!("v{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_config_default() {
        let config = StorageConfig::default();
        assert_eq!(config.s3.video_bucket, "video-narrative-videos");
        assert_eq!(config.s3.image_bucket, "video-narrative-images");
        assert_eq!(config.postgres.database, "video_narrative");
    }

    #[test]
    fn test_record_keys() {
        assert_eq!(
            batch_record_key("analysis-v2", SequenceId::new(3)),
            "analysis-v2#sequence-3"
        );
        assert_eq!(aggregate_record_key("aggregate-v1"), "aggregate-v1#full");
    }

    #[test]
    fn test_prompt_record_constructors() {
        let pointer = PromptRecord::pointer("analysis-prompt", 4);
        assert_eq!(pointer.version_id, "v0");
        assert_eq!(pointer.latest, Some(4));
        assert!(pointer.task_context.is_empty());

        let version = PromptRecord::version("analysis-prompt", 4);
        assert_eq!(version.version_id, "v4");
        assert_eq!(version.latest, None);
    }
}
