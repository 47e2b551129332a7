//! Pipeline orchestrator
//!
//! Drives one video end-to-end: a single extraction call, a
//! bounded-concurrency fan-out of batch descriptions, and one aggregation
//! call over the results re-sorted into sequence order. The orchestrator
//! only sequences and fans out — every stage owns its own failure
//! containment, and only extraction failures abort a run.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use video_narrative_aggregator::Aggregator;
use video_narrative_common::{
    AnalysisOutcome, BatchDescription, FrameBatch, PipelineObserver, RunOutcome, RunStatus,
    VideoSource,
};
use video_narrative_describer::BatchDescriber;
use video_narrative_frames::FrameSource;

pub mod event;

pub use event::{video_source_from_event, ObjectEvent, ObjectEventKind};

/// Explicit pipeline configuration, passed in at construction instead of
/// being read ambiently by each stage
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Model identity for per-batch description
    pub model_for_describe: String,
    /// Model identity for aggregation
    pub model_for_aggregate: String,
    /// Maximum frames per batch
    pub batch_size: usize,
    /// Maximum concurrent describe calls per run
    pub concurrency_limit: usize,
    /// Wall-clock budget for each external call
    pub time_budget_per_call: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_for_describe: std::env::var("ANALYSIS_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-haiku-20240307-v1:0".to_string()),
            model_for_aggregate: std::env::var("AGGREGATE_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-sonnet-20240229-v1:0".to_string()),
            batch_size: 20,
            concurrency_limit: 20,
            time_budget_per_call: Duration::from_secs(900),
        }
    }
}

/// States of one pipeline run. No state is ever skipped; a zero-batch
/// extraction passes through `Describing` with an empty fan-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Extracting,
    Describing,
    Aggregating,
    Done,
}

impl RunState {
    /// Get human-readable state name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Extracting => "extracting",
            Self::Describing => "describing",
            Self::Aggregating => "aggregating",
            Self::Done => "done",
        }
    }
}

/// Orchestrates the extraction → description → aggregation pipeline for
/// single videos
pub struct Pipeline {
    config: PipelineConfig,
    frames: Arc<dyn FrameSource>,
    describer: Arc<BatchDescriber>,
    aggregator: Arc<Aggregator>,
    observer: Arc<dyn PipelineObserver>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        frames: Arc<dyn FrameSource>,
        describer: Arc<BatchDescriber>,
        aggregator: Arc<Aggregator>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        Self {
            config,
            frames,
            describer,
            aggregator,
            observer,
        }
    }

    /// Process one video end-to-end. Always returns an outcome: extraction
    /// failures terminate the run early, everything else degrades in place.
    pub async fn run(&self, video: VideoSource) -> RunOutcome {
        info!(
            "Run for video '{}' entering state '{}'",
            video.id,
            RunState::Extracting.name()
        );

        let extraction = tokio::time::timeout(
            self.config.time_budget_per_call,
            self.frames.extract(&video),
        )
        .await;

        let batches = match extraction {
            Ok(Ok(batches)) => batches,
            Ok(Err(e)) => return self.abort_run(&video, e.to_string()),
            Err(_) => {
                return self.abort_run(
                    &video,
                    format!(
                        "frame extraction exceeded {:?}",
                        self.config.time_budget_per_call
                    ),
                )
            }
        };

        info!(
            "Run for video '{}' entering state '{}' with {} batches",
            video.id,
            RunState::Describing.name(),
            batches.len()
        );

        let mut descriptions = self.describe_all(batches).await;

        // Completion order must never leak into aggregation order: the
        // summary model reconstructs chronology from the sequence
        descriptions.sort_by_key(|d| d.sequence_id);

        info!(
            "Run for video '{}' entering state '{}'",
            video.id,
            RunState::Aggregating.name()
        );

        let summary = self.aggregator.aggregate(&video, &descriptions).await;

        info!(
            "Run for video '{}' entering state '{}'",
            video.id,
            RunState::Done.name()
        );

        let failed_batches = descriptions.iter().filter(|d| d.outcome.is_failed()).count();
        let message = match (&summary, failed_batches) {
            (AnalysisOutcome::Ok { .. }, 0) => "Analyses aggregated!".to_string(),
            (AnalysisOutcome::Ok { .. }, n) => {
                format!("Analyses aggregated ({n} of {} batches degraded)", descriptions.len())
            }
            (AnalysisOutcome::Failed { .. }, _) => {
                "Aggregation degraded - summary recorded as sentinel".to_string()
            }
        };

        let outcome = RunOutcome {
            video_id: video.id,
            status: RunStatus::Completed,
            message,
            summary: Some(summary),
            batches: descriptions,
        };
        self.observer.on_run_complete(&outcome);
        outcome
    }

    /// Fan out one describe call per batch, at most `concurrency_limit` in
    /// flight. Waits for every batch to settle; sentinel failures count as
    /// settled and never block siblings.
    async fn describe_all(&self, batches: Vec<FrameBatch>) -> Vec<BatchDescription> {
        let mut descriptions = Vec::with_capacity(batches.len());
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency_limit.max(1)));
        let mut tasks = JoinSet::new();

        for batch in batches {
            let describer = self.describer.clone();
            let observer = self.observer.clone();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                // The semaphore outlives the fan-out and is never closed,
                // so a permit is always granted eventually
                let _permit = semaphore.acquire_owned().await.ok();
                let description = describer.describe(&batch).await;
                observer.on_batch_complete(
                    &batch.video.id,
                    batch.sequence_id,
                    &description.outcome,
                );
                description
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(description) => descriptions.push(description),
                Err(e) => {
                    // A panicked describe task loses its batch; record the
                    // gap and keep collecting siblings
                    self.observer.on_error("describe-task", &e.to_string());
                    warn!("Describe task failed to join: {e}");
                }
            }
        }

        descriptions
    }

    fn abort_run(&self, video: &VideoSource, detail: String) -> RunOutcome {
        self.observer.on_error("extract", &detail);
        let outcome = RunOutcome::extraction_failed(video.id.clone(), detail);
        self.observer.on_run_complete(&outcome);
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use video_narrative_common::{
        CountingObserver, FrameBatch, SequenceId, TracingObserver,
    };
    use video_narrative_describer::DescriberConfig;
    use video_narrative_aggregator::AggregatorConfig;
    use video_narrative_frames::ExtractError;
    use video_narrative_model::{InferenceParams, MockModelClient};
    use video_narrative_prompts::PromptResolver;
    use video_narrative_storage::{
        AnalysisStore, MemoryAnalysisStore, MemoryObjectStorage, MemoryPromptStore, ObjectStorage,
        PromptRecord, PromptStore,
    };

    struct FixedFrames(Vec<FrameBatch>);

    #[async_trait::async_trait]
    impl FrameSource for FixedFrames {
        async fn extract(&self, _video: &VideoSource) -> Result<Vec<FrameBatch>, ExtractError> {
            Ok(self.0.clone())
        }
    }

    struct CorruptVideo;

    #[async_trait::async_trait]
    impl FrameSource for CorruptVideo {
        async fn extract(&self, _video: &VideoSource) -> Result<Vec<FrameBatch>, ExtractError> {
            Err(ExtractError::Ffmpeg("moov atom not found".to_string()))
        }
    }

    async fn seeded_prompts() -> Arc<MemoryPromptStore> {
        let store = Arc::new(MemoryPromptStore::new());
        for (prompt_id, context) in [
            ("analysis-prompt", "Describe the frames."),
            ("aggregate-prompt", "Merge the analyses."),
        ] {
            store.put(&PromptRecord::pointer(prompt_id, 1)).await.unwrap();
            let mut v1 = PromptRecord::version(prompt_id, 1);
            v1.task_context = context.to_string();
            store.put(&v1).await.unwrap();
        }
        store
    }

    async fn pipeline_with(
        frames: Arc<dyn FrameSource>,
        analyses: Arc<MemoryAnalysisStore>,
        images: Arc<MemoryObjectStorage>,
        observer: Arc<CountingObserver>,
    ) -> Pipeline {
        let resolver = Arc::new(PromptResolver::new(seeded_prompts().await));
        let model = Arc::new(MockModelClient::new());
        let config = PipelineConfig {
            model_for_describe: "describe-model".to_string(),
            model_for_aggregate: "aggregate-model".to_string(),
            batch_size: 20,
            concurrency_limit: 20,
            time_budget_per_call: Duration::from_secs(900),
        };

        let describer = Arc::new(BatchDescriber::new(
            images,
            analyses.clone(),
            resolver.clone(),
            model.clone(),
            observer.clone(),
            DescriberConfig {
                model_id: config.model_for_describe.clone(),
                params: InferenceParams::deterministic(),
                call_timeout: config.time_budget_per_call,
            },
        ));
        let aggregator = Arc::new(Aggregator::new(
            analyses,
            resolver,
            model,
            observer.clone(),
            AggregatorConfig {
                model_id: config.model_for_aggregate.clone(),
                params: InferenceParams::deterministic(),
                call_timeout: config.time_budget_per_call,
            },
        ));

        Pipeline::new(config, frames, describer, aggregator, observer)
    }

    fn batch(video: &VideoSource, sequence: u32, image: &str) -> FrameBatch {
        FrameBatch {
            video: video.clone(),
            sequence_id: SequenceId::new(sequence),
            image_path: video.object_key.clone(),
            image_keys: vec![image.to_string()],
        }
    }

    #[test]
    fn test_run_state_name() {
        assert_eq!(RunState::Extracting.name(), "extracting");
        assert_eq!(RunState::Describing.name(), "describing");
        assert_eq!(RunState::Aggregating.name(), "aggregating");
        assert_eq!(RunState::Done.name(), "done");
    }

    #[test]
    fn test_pipeline_config_default() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.concurrency_limit, 20);
        assert_eq!(config.time_budget_per_call, Duration::from_secs(900));
    }

    #[tokio::test]
    async fn test_run_completes_and_sorts_batches() {
        let video = VideoSource::new("videos", "us-east-1", "demo.mp4");
        let images = Arc::new(MemoryObjectStorage::new());
        for name in ["00001.png", "00002.png", "00003.png"] {
            images.store_file(&format!("demo.mp4/{name}"), b"png").await.unwrap();
        }

        let batches = vec![
            batch(&video, 3, "00003.png"),
            batch(&video, 1, "00001.png"),
            batch(&video, 2, "00002.png"),
        ];

        let analyses = Arc::new(MemoryAnalysisStore::new());
        let observer = Arc::new(CountingObserver::new());
        let pipeline = pipeline_with(
            Arc::new(FixedFrames(batches)),
            analyses.clone(),
            images,
            observer.clone(),
        )
        .await;

        let outcome = pipeline.run(video.clone()).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        let sequences: Vec<u32> = outcome.batches.iter().map(|d| d.sequence_id.number()).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert!(outcome.summary.is_some_and(|s| !s.is_failed()));

        // three batch records plus one aggregate record
        assert_eq!(analyses.len().await, 4);
        assert_eq!(
            observer.batches_ok.load(std::sync::atomic::Ordering::SeqCst),
            3
        );
        assert_eq!(
            observer.runs_completed.load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_extraction_failure_aborts_before_any_stage() {
        let video = VideoSource::new("videos", "us-east-1", "corrupt.mp4");
        let analyses = Arc::new(MemoryAnalysisStore::new());
        let observer = Arc::new(CountingObserver::new());
        let pipeline = pipeline_with(
            Arc::new(CorruptVideo),
            analyses.clone(),
            Arc::new(MemoryObjectStorage::new()),
            observer.clone(),
        )
        .await;

        let outcome = pipeline.run(video.clone()).await;

        assert_eq!(outcome.status, RunStatus::ExtractionFailed);
        assert!(outcome.message.contains("moov atom"));
        assert!(outcome.summary.is_none());
        assert!(outcome.batches.is_empty());

        // no records of any kind were written
        assert!(analyses.is_empty().await);
        let all = analyses.list_for_video(&video.id, "").await.unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_zero_batches_still_aggregates_a_sentinel() {
        let video = VideoSource::new("videos", "us-east-1", "empty.webm");
        let analyses = Arc::new(MemoryAnalysisStore::new());
        let pipeline = pipeline_with(
            Arc::new(FixedFrames(Vec::new())),
            analyses.clone(),
            Arc::new(MemoryObjectStorage::new()),
            Arc::new(CountingObserver::new()),
        )
        .await;

        let outcome = pipeline.run(video.clone()).await;

        assert_eq!(outcome.status, RunStatus::Completed);
        assert!(outcome.batches.is_empty());
        assert!(outcome.summary.as_ref().is_some_and(AnalysisOutcome::is_failed));

        // exactly the one aggregate record exists
        assert_eq!(analyses.len().await, 1);
        let record = analyses.get(&video.id, "aggregate-v1#full").await.unwrap();
        assert!(record.analysis.starts_with("Empty summary due to"));
    }

    // TracingObserver is exercised for coverage of the default wiring
    #[tokio::test]
    async fn test_run_with_default_observer() {
        let video = VideoSource::new("videos", "us-east-1", "demo.mp4");
        let images = Arc::new(MemoryObjectStorage::new());
        images.store_file("demo.mp4/00001.png", b"png").await.unwrap();

        let resolver = Arc::new(PromptResolver::new(seeded_prompts().await));
        let model = Arc::new(MockModelClient::new());
        let analyses = Arc::new(MemoryAnalysisStore::new());
        let observer: Arc<dyn PipelineObserver> = Arc::new(TracingObserver);

        let pipeline = Pipeline::new(
            PipelineConfig::default(),
            Arc::new(FixedFrames(vec![batch(&video, 1, "00001.png")])),
            Arc::new(BatchDescriber::new(
                images,
                analyses.clone(),
                resolver.clone(),
                model.clone(),
                observer.clone(),
                DescriberConfig::default(),
            )),
            Arc::new(Aggregator::new(
                analyses,
                resolver,
                model,
                observer.clone(),
                AggregatorConfig::default(),
            )),
            observer,
        );

        let outcome = pipeline.run(video).await;
        assert_eq!(outcome.status, RunStatus::Completed);
    }
}
