//! Prompt template storage implementation using `PostgreSQL`
//!
//! Templates are keyed `(prompt_id, version_id)`. The reserved version
//! `"v0"` carries the latest-version pointer; advancing it is the only
//! write that touches an existing row, so new prompt versions can be
//! staged without affecting in-flight runs.

use crate::{PromptRecord, StorageError, StorageResult};
use tokio_postgres::{Client, NoTls};

use crate::analysis_storage::PostgresConfig;

/// Prompt template storage trait
#[async_trait::async_trait]
pub trait PromptStore: Send + Sync {
    /// Initialize storage (create tables if not exist)
    async fn init_schema(&self) -> StorageResult<()>;

    /// Write one record (pointer advance or new version)
    async fn put(&self, record: &PromptRecord) -> StorageResult<()>;

    /// Retrieve one record by exact `(prompt_id, version_id)` key
    async fn get(&self, prompt_id: &str, version_id: &str) -> StorageResult<PromptRecord>;
}

/// `PostgreSQL` prompt store implementation
pub struct PostgresPromptStore {
    client: Client,
}

impl PostgresPromptStore {
    /// Create a new `PostgreSQL` prompt store client
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl PromptStore for PostgresPromptStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS prompt_templates (
                    prompt_id TEXT NOT NULL,
                    version_id TEXT NOT NULL,
                    latest INTEGER,
                    task_context TEXT NOT NULL DEFAULT '',
                    tone_context TEXT NOT NULL DEFAULT '',
                    task_description TEXT NOT NULL DEFAULT '',
                    examples TEXT NOT NULL DEFAULT '',
                    input_data TEXT NOT NULL DEFAULT '',
                    immediate_task TEXT NOT NULL DEFAULT '',
                    precognition TEXT NOT NULL DEFAULT '',
                    output_formatting TEXT NOT NULL DEFAULT '',
                    prefill TEXT NOT NULL DEFAULT '',
                    PRIMARY KEY (prompt_id, version_id)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("Prompt store schema initialized");

        Ok(())
    }

    async fn put(&self, record: &PromptRecord) -> StorageResult<()> {
        let latest = record.latest.map(|n| n as i32);

        self.client
            .execute(
                r"
                INSERT INTO prompt_templates
                (prompt_id, version_id, latest, task_context, tone_context,
                 task_description, examples, input_data, immediate_task,
                 precognition, output_formatting, prefill)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (prompt_id, version_id) DO UPDATE SET
                    latest = EXCLUDED.latest,
                    task_context = EXCLUDED.task_context,
                    tone_context = EXCLUDED.tone_context,
                    task_description = EXCLUDED.task_description,
                    examples = EXCLUDED.examples,
                    input_data = EXCLUDED.input_data,
                    immediate_task = EXCLUDED.immediate_task,
                    precognition = EXCLUDED.precognition,
                    output_formatting = EXCLUDED.output_formatting,
                    prefill = EXCLUDED.prefill
                ",
                &[
                    &record.prompt_id,
                    &record.version_id,
                    &latest,
                    &record.task_context,
                    &record.tone_context,
                    &record.task_description,
                    &record.examples,
                    &record.input_data,
                    &record.immediate_task,
                    &record.precognition,
                    &record.output_formatting,
                    &record.prefill,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, prompt_id: &str, version_id: &str) -> StorageResult<PromptRecord> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT prompt_id, version_id, latest, task_context, tone_context,
                       task_description, examples, input_data, immediate_task,
                       precognition, output_formatting, prefill
                FROM prompt_templates
                WHERE prompt_id = $1 AND version_id = $2
                ",
                &[&prompt_id, &version_id],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("{prompt_id}/{version_id}")))?;

        Ok(PromptRecord {
            prompt_id: row.get(0),
            version_id: row.get(1),
            latest: row.get::<_, Option<i32>>(2).map(|n| n as u32),
            task_context: row.get(3),
            tone_context: row.get(4),
            task_description: row.get(5),
            examples: row.get(6),
            input_data: row.get(7),
            immediate_task: row.get(8),
            precognition: row.get(9),
            output_formatting: row.get(10),
            prefill: row.get(11),
        })
    }
}
