//! Batch description stage
//!
//! For one frame batch: load the frame bytes, resolve the analysis prompt,
//! submit a single model request with the prompt and all frames as ordered
//! content, and persist the returned description keyed by video and
//! sequence.
//!
//! Nothing escapes `describe` as an error. Every failure is converted at
//! this boundary into a tagged outcome whose persisted text carries the
//! `"Empty analysis due to ..."` marker, so one bad batch degrades the run
//! instead of aborting it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use video_narrative_common::{
    AnalysisOutcome, BatchDescription, FailureKind, FrameBatch, PipelineObserver,
    ANALYSIS_FAILURE_PREFIX,
};
use video_narrative_model::{ContentItem, InferenceParams, ModelClient};
use video_narrative_prompts::{PromptError, PromptName, PromptResolver, ResolvedPrompt};
use video_narrative_storage::{batch_record_key, AnalysisRecord, AnalysisStore, ObjectStorage};

/// Batch describer configuration
#[derive(Debug, Clone)]
pub struct DescriberConfig {
    /// Model identity for per-batch description (the cheaper/faster one)
    pub model_id: String,
    /// Inference parameters sent with every call
    pub params: InferenceParams,
    /// Wall-clock budget for one model call
    pub call_timeout: Duration,
}

impl Default for DescriberConfig {
    fn default() -> Self {
        Self {
            model_id: std::env::var("ANALYSIS_MODEL_ID")
                .unwrap_or_else(|_| "anthropic.claude-3-haiku-20240307-v1:0".to_string()),
            params: InferenceParams::deterministic(),
            call_timeout: Duration::from_secs(900),
        }
    }
}

/// Describes one frame batch with a vision-language model
pub struct BatchDescriber {
    images: Arc<dyn ObjectStorage>,
    analyses: Arc<dyn AnalysisStore>,
    resolver: Arc<PromptResolver>,
    model: Arc<dyn ModelClient>,
    observer: Arc<dyn PipelineObserver>,
    config: DescriberConfig,
}

impl BatchDescriber {
    #[must_use]
    pub fn new(
        images: Arc<dyn ObjectStorage>,
        analyses: Arc<dyn AnalysisStore>,
        resolver: Arc<PromptResolver>,
        model: Arc<dyn ModelClient>,
        observer: Arc<dyn PipelineObserver>,
        config: DescriberConfig,
    ) -> Self {
        Self {
            images,
            analyses,
            resolver,
            model,
            observer,
            config,
        }
    }

    /// Describe one batch. Infallible by contract: failures come back as
    /// tagged outcomes with the persisted sentinel text.
    pub async fn describe(&self, batch: &FrameBatch) -> BatchDescription {
        // Records written after a resolution failure carry an empty
        // version prefix, matching what the original system persisted in
        // that state.
        let (outcome, prompt_version) = match self.resolver.resolve(PromptName::Analysis).await {
            Err(PromptError::Unavailable(detail)) => (
                self.fail(batch, FailureKind::PromptUnavailable, detail),
                String::new(),
            ),
            Ok(prompt) => {
                let version = prompt.version.clone();
                (self.describe_with_prompt(batch, &prompt).await, version)
            }
        };

        // The record's presence (or absence, on a persistence failure) is
        // the audit trail; the run itself never fails over a write.
        self.persist(batch, &prompt_version, outcome.record_text()).await;

        BatchDescription {
            sequence_id: batch.sequence_id,
            outcome,
        }
    }

    async fn describe_with_prompt(
        &self,
        batch: &FrameBatch,
        prompt: &ResolvedPrompt,
    ) -> AnalysisOutcome {
        let content = match self.load_content(batch).await {
            Ok(content) => content,
            Err(detail) => return self.fail(batch, FailureKind::ImageLoad, detail),
        };

        debug!(
            "Analyzing {} frames of '{}' with model '{}'",
            batch.image_keys.len(),
            batch.sequence_id,
            self.config.model_id
        );

        let invocation = tokio::time::timeout(
            self.config.call_timeout,
            self.model
                .invoke(&self.config.model_id, &prompt.text, &content, &self.config.params),
        )
        .await;

        match invocation {
            Ok(Ok(text)) => {
                info!(
                    "Analysis done for '{}' of video '{}'",
                    batch.sequence_id, batch.video.id
                );
                AnalysisOutcome::Ok {
                    text,
                    prompt_version: prompt.version.clone(),
                }
            }
            Ok(Err(e)) => self.fail(batch, FailureKind::ModelInvocation, e.to_string()),
            Err(_) => self.fail(
                batch,
                FailureKind::Timeout,
                format!("model call exceeded {:?}", self.config.call_timeout),
            ),
        }
    }

    /// Load the bytes of every frame in batch order, prefixed by the text
    /// item naming the images being read
    async fn load_content(&self, batch: &FrameBatch) -> Result<Vec<ContentItem>, String> {
        let mut content = Vec::with_capacity(batch.image_keys.len() + 1);
        content.push(ContentItem::Text(format!(
            "reading images in '{}'",
            batch.image_keys.join(",")
        )));

        for image in &batch.image_keys {
            let key = batch.frame_key(image);
            let bytes = self
                .images
                .retrieve_file(&key)
                .await
                .map_err(|e| format!("frame '{key}': {e}"))?;
            content.push(ContentItem::PngImage(bytes));
        }

        Ok(content)
    }

    fn fail(&self, batch: &FrameBatch, kind: FailureKind, detail: String) -> AnalysisOutcome {
        self.observer.on_error("describe", &detail);
        warn!(
            "Describing '{}' of video '{}' failed ({kind}): {detail}",
            batch.sequence_id, batch.video.id
        );
        AnalysisOutcome::Failed {
            sentinel: sentinel_text(kind),
            kind,
            detail,
        }
    }

    async fn persist(&self, batch: &FrameBatch, prompt_version: &str, analysis: &str) {
        let record = AnalysisRecord {
            video_id: batch.video.id.clone(),
            record_key: batch_record_key(prompt_version, batch.sequence_id),
            analysis: analysis.to_string(),
            video_s3_uri: None,
            video_url: None,
            created: Utc::now(),
        };

        if let Err(e) = self.analyses.put(&record).await {
            self.observer.on_error("describe-persist", &e.to_string());
            warn!(
                "Error storing analysis for '{}' of video '{}': {e}",
                batch.sequence_id, batch.video.id
            );
        }
    }
}

/// Marker-prefixed text persisted in place of a real description
fn sentinel_text(kind: FailureKind) -> String {
    match kind {
        FailureKind::PromptUnavailable => {
            format!("{ANALYSIS_FAILURE_PREFIX} prompt resolution error - check the pipeline logs")
        }
        FailureKind::ImageLoad => {
            format!("{ANALYSIS_FAILURE_PREFIX} image loading error - check the pipeline logs")
        }
        FailureKind::Timeout => {
            format!("{ANALYSIS_FAILURE_PREFIX} image analysis timeout - check the pipeline logs")
        }
        FailureKind::ModelInvocation | FailureKind::EmptyInput => {
            format!("{ANALYSIS_FAILURE_PREFIX} image analysis error - check the pipeline logs")
        }
    }
}
