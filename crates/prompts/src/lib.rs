//! Prompt resolution for the video narrative pipeline
//!
//! A prompt template is a versioned sequence of labeled sections stored in
//! the prompt store. Resolution is a two-step read: the reserved `"v0"`
//! record names the latest version, then that version is fetched and its
//! non-empty sections are assembled into one instruction string.
//!
//! The two reads are deliberately not guarded against a concurrent pointer
//! advance: prompt versions are updated out-of-band and rarely, so a run
//! that races an update uses a stale-but-consistent version. Callers only
//! see the single `resolve` call, which leaves room to slot a cache behind
//! it later.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;
use video_narrative_storage::{PromptRecord, PromptStore};

/// The two prompt purposes the pipeline resolves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptName {
    /// Per-batch frame description
    Analysis,
    /// Aggregate narrative summary
    Aggregate,
}

impl PromptName {
    /// Identifier of this prompt in the prompt store
    #[must_use]
    pub fn prompt_id(self) -> &'static str {
        match self {
            Self::Analysis => "analysis-prompt",
            Self::Aggregate => "aggregate-prompt",
        }
    }

    /// Version tag recorded alongside persisted analyses
    #[must_use]
    pub fn version_tag(self, latest: u32) -> String {
        match self {
            Self::Analysis => format!("analysis-v{latest}"),
            Self::Aggregate => format!("aggregate-v{latest}"),
        }
    }
}

/// An assembled prompt together with the version it was resolved at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrompt {
    pub text: String,
    pub version: String,
}

/// Prompt resolution errors
#[derive(Error, Debug)]
pub enum PromptError {
    /// Pointer or version record missing, unreadable, or malformed.
    /// Fatal for the calling stage; never retried automatically.
    #[error("Prompt unavailable: {0}")]
    Unavailable(String),
}

/// Assemble the nine labeled sections into one instruction string.
///
/// Sections keep their fixed order; non-empty sections are separated by a
/// blank line and empty sections are skipped entirely.
#[must_use]
pub fn assemble(record: &PromptRecord) -> String {
    let sections = [
        &record.task_context,
        &record.tone_context,
        &record.task_description,
        &record.examples,
        &record.input_data,
        &record.immediate_task,
        &record.precognition,
        &record.output_formatting,
        &record.prefill,
    ];

    let mut prompt = String::new();
    for section in sections {
        if section.is_empty() {
            continue;
        }
        if !prompt.is_empty() {
            prompt.push_str("\n\n");
        }
        prompt.push_str(section);
    }
    prompt
}

/// Resolves the current version of a named prompt from the prompt store
pub struct PromptResolver {
    store: Arc<dyn PromptStore>,
}

impl PromptResolver {
    #[must_use]
    pub fn new(store: Arc<dyn PromptStore>) -> Self {
        Self { store }
    }

    /// Resolve the latest version of `name` into an assembled prompt.
    pub async fn resolve(&self, name: PromptName) -> Result<ResolvedPrompt, PromptError> {
        let prompt_id = name.prompt_id();

        let pointer = self
            .store
            .get(prompt_id, "v0")
            .await
            .map_err(|e| PromptError::Unavailable(format!("{prompt_id} pointer read failed: {e}")))?;

        let latest = pointer.latest.ok_or_else(|| {
            PromptError::Unavailable(format!("{prompt_id} pointer record carries no latest version"))
        })?;

        let record = self
            .store
            .get(prompt_id, &format!("v{latest}"))
            .await
            .map_err(|e| {
                PromptError::Unavailable(format!("{prompt_id} v{latest} read failed: {e}"))
            })?;

        let text = assemble(&record);
        if text.is_empty() {
            return Err(PromptError::Unavailable(format!(
                "{prompt_id} v{latest} has no non-empty sections"
            )));
        }

        let version = name.version_tag(latest);
        debug!("Resolved prompt '{prompt_id}' at version '{version}'");

        Ok(ResolvedPrompt { text, version })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_narrative_storage::MemoryPromptStore;

    fn analysis_v2() -> PromptRecord {
        let mut record = PromptRecord::version("analysis-prompt", 2);
        record.task_context = "You are a video analyst describing still frames.".to_string();
        record.task_description = "Describe the actions visible across the frames.".to_string();
        record.output_formatting = "Wrap the result in <analysis> tags.".to_string();
        record
    }

    #[test]
    fn test_assemble_separates_with_blank_lines_and_skips_empty() {
        let assembled = assemble(&analysis_v2());
        assert_eq!(
            assembled,
            "You are a video analyst describing still frames.\n\n\
             Describe the actions visible across the frames.\n\n\
             Wrap the result in <analysis> tags."
        );
        // no leading/trailing separators from the skipped sections
        assert!(!assembled.starts_with('\n'));
        assert!(!assembled.ends_with('\n'));
    }

    #[test]
    fn test_assemble_all_empty_is_empty() {
        let record = PromptRecord::version("analysis-prompt", 1);
        assert!(assemble(&record).is_empty());
    }

    #[test]
    fn test_version_tags() {
        assert_eq!(PromptName::Analysis.version_tag(2), "analysis-v2");
        assert_eq!(PromptName::Aggregate.version_tag(7), "aggregate-v7");
    }

    #[tokio::test]
    async fn test_resolve_follows_latest_pointer() {
        let store = Arc::new(MemoryPromptStore::new());
        store.put(&PromptRecord::pointer("analysis-prompt", 2)).await.unwrap();

        let mut v1 = PromptRecord::version("analysis-prompt", 1);
        v1.task_context = "old version".to_string();
        store.put(&v1).await.unwrap();
        store.put(&analysis_v2()).await.unwrap();

        let resolver = PromptResolver::new(store);
        let resolved = resolver.resolve(PromptName::Analysis).await.unwrap();

        assert_eq!(resolved.version, "analysis-v2");
        assert!(resolved.text.starts_with("You are a video analyst"));
        assert!(!resolved.text.contains("old version"));
    }

    #[tokio::test]
    async fn test_resolve_missing_pointer_is_unavailable() {
        let resolver = PromptResolver::new(Arc::new(MemoryPromptStore::new()));
        let err = resolver.resolve(PromptName::Aggregate).await.unwrap_err();
        assert!(matches!(err, PromptError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_pointer_without_latest_is_unavailable() {
        let store = Arc::new(MemoryPromptStore::new());
        // pointer row exists but carries no Latest value
        store.put(&PromptRecord::empty("analysis-prompt", "v0")).await.unwrap();

        let resolver = PromptResolver::new(store);
        let err = resolver.resolve(PromptName::Analysis).await.unwrap_err();
        assert!(matches!(err, PromptError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_resolve_dangling_version_is_unavailable() {
        let store = Arc::new(MemoryPromptStore::new());
        store.put(&PromptRecord::pointer("analysis-prompt", 3)).await.unwrap();
        // v3 was never written

        let resolver = PromptResolver::new(store);
        let err = resolver.resolve(PromptName::Analysis).await.unwrap_err();
        assert!(matches!(err, PromptError::Unavailable(_)));
    }
}
