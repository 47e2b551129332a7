//! Aggregation stage
//!
//! Collects the per-batch descriptions of one video — already sorted by
//! sequence, since the order reconstructs the narrative chronology — and
//! reduces them into a single summary with one model call. The aggregate
//! record is the only one carrying the video's source URI and URL.
//!
//! Failure containment mirrors the describer: nothing escapes `aggregate`,
//! degraded outcomes persist a `"Empty summary due to ..."` sentinel. A
//! zero-batch input is not an error path worth a model call; it persists a
//! deterministic empty-input sentinel so a zero-frame video still leaves
//! an auditable trace.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use video_narrative_common::{
    AnalysisOutcome, BatchDescription, FailureKind, PipelineObserver, VideoSource,
    SUMMARY_FAILURE_PREFIX,
};
use video_narrative_model::{ContentItem, InferenceParams, ModelClient};
use video_narrative_prompts::{PromptError, PromptName, PromptResolver};
use video_narrative_storage::{aggregate_record_key, AnalysisRecord, AnalysisStore};

/// Aggregator configuration
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Model identity for aggregation (typically larger than the
    /// per-batch one)
    pub model_id: String,
    /// Inference parameters sent with the call
    pub params: InferenceParams,
    /// Wall-clock budget for the model call
    pub call_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            model_id: std::env::var("AGGREGATE_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-sonnet-20240229-v1:0".to_string()),
            params: InferenceParams::deterministic(),
            call_timeout: Duration::from_secs(900),
        }
    }
}

/// Reduces ordered batch descriptions into one narrative summary
pub struct Aggregator {
    analyses: Arc<dyn AnalysisStore>,
    resolver: Arc<PromptResolver>,
    model: Arc<dyn ModelClient>,
    observer: Arc<dyn PipelineObserver>,
    config: AggregatorConfig,
}

impl Aggregator {
    #[must_use]
    pub fn new(
        analyses: Arc<dyn AnalysisStore>,
        resolver: Arc<PromptResolver>,
        model: Arc<dyn ModelClient>,
        observer: Arc<dyn PipelineObserver>,
        config: AggregatorConfig,
    ) -> Self {
        Self {
            analyses,
            resolver,
            model,
            observer,
            config,
        }
    }

    /// Summarize the video's batch descriptions. `descriptions` must be in
    /// ascending sequence order; the orchestrator sorts before calling.
    pub async fn aggregate(
        &self,
        video: &VideoSource,
        descriptions: &[BatchDescription],
    ) -> AnalysisOutcome {
        debug_assert!(
            descriptions.windows(2).all(|w| w[0].sequence_id < w[1].sequence_id),
            "aggregation input must be sorted by sequence"
        );

        let (outcome, prompt_version) = match self.resolver.resolve(PromptName::Aggregate).await {
            Err(PromptError::Unavailable(detail)) => (
                self.fail(video, FailureKind::PromptUnavailable, detail),
                String::new(),
            ),
            Ok(prompt) => {
                let version = prompt.version.clone();
                let outcome = if descriptions.is_empty() {
                    self.fail(
                        video,
                        FailureKind::EmptyInput,
                        "no batch descriptions to aggregate".to_string(),
                    )
                } else {
                    self.summarize(video, descriptions, &prompt.text, &version).await
                };
                (outcome, version)
            }
        };

        self.persist(video, &prompt_version, outcome.record_text()).await;
        outcome
    }

    async fn summarize(
        &self,
        video: &VideoSource,
        descriptions: &[BatchDescription],
        prompt_text: &str,
        prompt_version: &str,
    ) -> AnalysisOutcome {
        // Each description is its own content item; sentinel texts of
        // failed batches travel along so the audit trail stays coherent
        let content: Vec<ContentItem> = descriptions
            .iter()
            .map(|d| ContentItem::Text(d.outcome.record_text().to_string()))
            .collect();

        debug!(
            "Aggregating {} descriptions for video '{}' with model '{}'",
            content.len(),
            video.id,
            self.config.model_id
        );

        let invocation = tokio::time::timeout(
            self.config.call_timeout,
            self.model
                .invoke(&self.config.model_id, prompt_text, &content, &self.config.params),
        )
        .await;

        match invocation {
            Ok(Ok(text)) => {
                info!("Full analysis produced for video '{}'", video.id);
                AnalysisOutcome::Ok {
                    text,
                    prompt_version: prompt_version.to_string(),
                }
            }
            Ok(Err(e)) => self.fail(video, FailureKind::ModelInvocation, e.to_string()),
            Err(_) => self.fail(
                video,
                FailureKind::Timeout,
                format!("aggregate call exceeded {:?}", self.config.call_timeout),
            ),
        }
    }

    fn fail(&self, video: &VideoSource, kind: FailureKind, detail: String) -> AnalysisOutcome {
        self.observer.on_error("aggregate", &detail);
        warn!("Aggregation for video '{}' failed ({kind}): {detail}", video.id);
        AnalysisOutcome::Failed {
            sentinel: sentinel_text(kind),
            kind,
            detail,
        }
    }

    async fn persist(&self, video: &VideoSource, prompt_version: &str, analysis: &str) {
        let record = AnalysisRecord {
            video_id: video.id.clone(),
            record_key: aggregate_record_key(prompt_version),
            analysis: analysis.to_string(),
            video_s3_uri: Some(video.s3_uri.clone()),
            video_url: Some(video.url.clone()),
            created: Utc::now(),
        };

        if let Err(e) = self.analyses.put(&record).await {
            self.observer.on_error("aggregate-persist", &e.to_string());
            warn!("Error storing full analysis for video '{}': {e}", video.id);
        }
    }
}

/// Marker-prefixed text persisted in place of a real summary
fn sentinel_text(kind: FailureKind) -> String {
    match kind {
        FailureKind::EmptyInput => format!(
            "{SUMMARY_FAILURE_PREFIX} empty analysis history - no frames were extracted from the video"
        ),
        FailureKind::PromptUnavailable => {
            format!("{SUMMARY_FAILURE_PREFIX} prompt resolution error - check the pipeline logs")
        }
        FailureKind::Timeout => {
            format!("{SUMMARY_FAILURE_PREFIX} aggregation timeout - check the pipeline logs")
        }
        FailureKind::ModelInvocation | FailureKind::ImageLoad => {
            format!("{SUMMARY_FAILURE_PREFIX} aggregation error - check the pipeline logs")
        }
    }
}
