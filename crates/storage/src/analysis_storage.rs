//! Analysis record storage implementation using `PostgreSQL`
//!
//! Batch descriptions and aggregate summaries land here, keyed by
//! `(video_id, record_key)`. Writing an existing key overwrites it so a
//! re-processed video replaces its earlier results instead of duplicating
//! them.

use crate::{AnalysisRecord, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use tokio_postgres::{Client, NoTls};
use video_narrative_common::VideoId;

/// `PostgreSQL` configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Database user
    pub user: String,

    /// Database password
    pub password: String,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("POSTGRES_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("POSTGRES_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(5432),
            database: std::env::var("POSTGRES_DB")
                .unwrap_or_else(|_| "video_narrative".to_string()),
            user: std::env::var("POSTGRES_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("POSTGRES_PASSWORD").unwrap_or_default(),
        }
    }
}

impl PostgresConfig {
    /// Build connection string
    #[must_use]
    pub fn connection_string(&self) -> String {
        format!(
            "host={} port={} dbname={} user={} password={}",
            self.host, self.port, self.database, self.user, self.password
        )
    }
}

/// Analysis record storage trait
#[async_trait::async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Initialize storage (create tables if not exist)
    async fn init_schema(&self) -> StorageResult<()>;

    /// Upsert one record; last write wins for an existing key
    async fn put(&self, record: &AnalysisRecord) -> StorageResult<()>;

    /// Retrieve one record by exact key
    async fn get(&self, video_id: &VideoId, record_key: &str) -> StorageResult<AnalysisRecord>;

    /// Range query: all records of a video whose key starts with the given
    /// prefix, ordered by key. The review viewer reads through this; the
    /// pipeline itself never does.
    async fn list_for_video(
        &self,
        video_id: &VideoId,
        key_prefix: &str,
    ) -> StorageResult<Vec<AnalysisRecord>>;
}

/// `PostgreSQL` analysis store implementation
pub struct PostgresAnalysisStore {
    client: Client,
}

impl PostgresAnalysisStore {
    /// Create a new `PostgreSQL` analysis store client
    pub async fn new(config: PostgresConfig) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(&config.connection_string(), NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        // Spawn connection in background
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self { client })
    }

    fn row_to_record(row: &tokio_postgres::Row) -> AnalysisRecord {
        AnalysisRecord {
            video_id: VideoId::new(row.get::<_, String>(0)),
            record_key: row.get(1),
            analysis: row.get(2),
            video_s3_uri: row.get(3),
            video_url: row.get(4),
            created: row.get(5),
        }
    }
}

#[async_trait::async_trait]
impl AnalysisStore for PostgresAnalysisStore {
    async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .execute(
                r"
                CREATE TABLE IF NOT EXISTS analysis_records (
                    video_id TEXT NOT NULL,
                    record_key TEXT NOT NULL,
                    analysis TEXT NOT NULL,
                    video_s3_uri TEXT,
                    video_url TEXT,
                    created TIMESTAMP WITH TIME ZONE NOT NULL,
                    PRIMARY KEY (video_id, record_key)
                )
                ",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        self.client
            .execute(
                "CREATE INDEX IF NOT EXISTS idx_analysis_video_id ON analysis_records(video_id)",
                &[],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tracing::info!("Analysis store schema initialized");

        Ok(())
    }

    async fn put(&self, record: &AnalysisRecord) -> StorageResult<()> {
        self.client
            .execute(
                r"
                INSERT INTO analysis_records
                (video_id, record_key, analysis, video_s3_uri, video_url, created)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (video_id, record_key) DO UPDATE SET
                    analysis = EXCLUDED.analysis,
                    video_s3_uri = EXCLUDED.video_s3_uri,
                    video_url = EXCLUDED.video_url,
                    created = EXCLUDED.created
                ",
                &[
                    &record.video_id.as_str(),
                    &record.record_key,
                    &record.analysis,
                    &record.video_s3_uri,
                    &record.video_url,
                    &record.created,
                ],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, video_id: &VideoId, record_key: &str) -> StorageResult<AnalysisRecord> {
        let row = self
            .client
            .query_opt(
                r"
                SELECT video_id, record_key, analysis, video_s3_uri, video_url, created
                FROM analysis_records
                WHERE video_id = $1 AND record_key = $2
                ",
                &[&video_id.as_str(), &record_key],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?
            .ok_or_else(|| StorageError::NotFound(format!("{video_id}/{record_key}")))?;

        Ok(Self::row_to_record(&row))
    }

    async fn list_for_video(
        &self,
        video_id: &VideoId,
        key_prefix: &str,
    ) -> StorageResult<Vec<AnalysisRecord>> {
        let pattern = format!("{key_prefix}%");
        let rows = self
            .client
            .query(
                r"
                SELECT video_id, record_key, analysis, video_s3_uri, video_url, created
                FROM analysis_records
                WHERE video_id = $1 AND record_key LIKE $2
                ORDER BY record_key
                ",
                &[&video_id.as_str(), &pattern],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows.iter().map(Self::row_to_record).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_postgres_config_default() {
        let config = PostgresConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.database, "video_narrative");
        assert_eq!(config.user, "postgres");
    }

    #[test]
    fn test_postgres_connection_string() {
        let config = PostgresConfig {
            host: "localhost".to_string(),
            port: 5432,
            database: "testdb".to_string(),
            user: "testuser".to_string(),
            password: "testpass".to_string(),
        };

        let conn_str = config.connection_string();
        assert!(conn_str.contains("host=localhost"));
        assert!(conn_str.contains("dbname=testdb"));
        assert!(conn_str.contains("user=testuser"));
    }
}
