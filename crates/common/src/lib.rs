/// Common types and utilities for the video narrative pipeline
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod observer;

pub use observer::{CountingObserver, PipelineObserver, TracingObserver};

/// Marker prefix persisted when a single batch description fails
pub const ANALYSIS_FAILURE_PREFIX: &str = "Empty analysis due to";

/// Marker prefix persisted when the aggregate summary fails
pub const SUMMARY_FAILURE_PREFIX: &str = "Empty summary due to";

/// Record-key suffix for the aggregate summary record
pub const AGGREGATE_RECORD_MARKER: &str = "full";

/// Stable video identifier derived from the source object key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoId(String);

impl VideoId {
    /// Derive the identifier from an object key. Deterministic: the same
    /// key always maps to the same id ('/' is not a valid key character
    /// in the analysis store, so it is folded to '-').
    #[must_use]
    pub fn from_object_key(key: &str) -> Self {
        Self(key.replace('/', "-"))
    }

    /// Rehydrate an id that was previously persisted
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Source video metadata, denormalized onto every batch so downstream
/// stages need no extra lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSource {
    pub id: VideoId,
    /// Key of the video object in the video bucket
    pub object_key: String,
    /// Canonical s3:// URI of the source object
    pub s3_uri: String,
    /// User-facing HTTPS URL of the source object
    pub url: String,
}

impl VideoSource {
    /// Build a video source from its bucket coordinates.
    #[must_use]
    pub fn new(bucket: &str, region: &str, object_key: &str) -> Self {
        let s3_uri = format!("s3://{bucket}/{object_key}");
        // us-east-1 URLs carry no region segment
        let url = if region == "us-east-1" {
            format!("https://{bucket}.s3.amazonaws.com/{object_key}")
        } else {
            format!("https://{bucket}.s3.{region}.amazonaws.com/{object_key}")
        };

        Self {
            id: VideoId::from_object_key(object_key),
            object_key: object_key.to_string(),
            s3_uri,
            url,
        }
    }
}

/// Monotonic 1-based batch sequence identifier.
///
/// Ordering is numeric. The rendered `sequence-<n>` form is presentation
/// and persistence only: it does not sort correctly past nine batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceId(u32);

impl SequenceId {
    #[must_use]
    pub fn new(n: u32) -> Self {
        debug_assert!(n >= 1, "sequence ids are 1-based");
        Self(n)
    }

    #[must_use]
    pub fn number(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sequence-{}", self.0)
    }
}

/// An ordered group of frame images belonging to one video.
///
/// Created once by the frame extractor and never mutated; the frame
/// objects themselves outlive the batch in the image bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameBatch {
    pub video: VideoSource,
    pub sequence_id: SequenceId,
    /// Key prefix under which the frame objects live in the image bucket
    pub image_path: String,
    /// Frame file names in temporal order, relative to `image_path`
    pub image_keys: Vec<String>,
}

impl FrameBatch {
    /// Full object-store key for one frame of this batch
    #[must_use]
    pub fn frame_key(&self, image: &str) -> String {
        format!("{}/{}", self.image_path, image)
    }
}

/// Classification of a contained stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// Prompt pointer/record could not be read or was malformed
    PromptUnavailable,
    /// The model call failed (throttling, malformed response, transport)
    ModelInvocation,
    /// One or more frame objects could not be loaded
    ImageLoad,
    /// The call exceeded its wall-clock budget
    Timeout,
    /// Aggregation received zero batch descriptions (zero-frame video)
    EmptyInput,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PromptUnavailable => "prompt unavailable",
            Self::ModelInvocation => "model invocation",
            Self::ImageLoad => "image load",
            Self::Timeout => "timeout",
            Self::EmptyInput => "empty input",
        };
        f.write_str(name)
    }
}

/// Tagged outcome of one description or aggregation stage.
///
/// Failures are detected through this tag; the sentinel string inside
/// `Failed` is what gets persisted for audit, never what callers match on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisOutcome {
    Ok {
        text: String,
        prompt_version: String,
    },
    Failed {
        kind: FailureKind,
        detail: String,
        /// Marker-prefixed text persisted in place of a real result
        sentinel: String,
    },
}

impl AnalysisOutcome {
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Text as persisted to the analysis store: the model output on
    /// success, the sentinel on failure
    #[must_use]
    pub fn record_text(&self) -> &str {
        match self {
            Self::Ok { text, .. } => text,
            Self::Failed { sentinel, .. } => sentinel,
        }
    }
}

/// Result of describing one frame batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDescription {
    pub sequence_id: SequenceId,
    pub outcome: AnalysisOutcome,
}

/// Terminal status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// The run reached `Done`; individual stages may still have degraded
    /// to sentinel content
    Completed,
    /// Frame extraction failed; no batch or aggregate records exist
    ExtractionFailed,
}

/// Structured result returned to whatever invoked the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub video_id: VideoId,
    pub status: RunStatus,
    pub message: String,
    /// Aggregate summary outcome; `None` only when extraction failed
    pub summary: Option<AnalysisOutcome>,
    /// Per-batch results in ascending sequence order
    pub batches: Vec<BatchDescription>,
}

impl RunOutcome {
    #[must_use]
    pub fn extraction_failed(video_id: VideoId, detail: String) -> Self {
        Self {
            video_id,
            status: RunStatus::ExtractionFailed,
            message: format!("Video processing failed: {detail}"),
            summary: None,
            batches: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_video_id_from_object_key() {
        let id = VideoId::from_object_key("demos/hello-world/demo.mp4");
        assert_eq!(id.as_str(), "demos-hello-world-demo.mp4");

        // deterministic
        let again = VideoId::from_object_key("demos/hello-world/demo.mp4");
        assert_eq!(id, again);
    }

    #[test]
    fn test_video_source_urls() {
        let video = VideoSource::new("videos", "eu-central-1", "demo.mp4");
        assert_eq!(video.s3_uri, "s3://videos/demo.mp4");
        assert_eq!(video.url, "https://videos.s3.eu-central-1.amazonaws.com/demo.mp4");

        let us = VideoSource::new("videos", "us-east-1", "demo.mp4");
        assert_eq!(us.url, "https://videos.s3.amazonaws.com/demo.mp4");
    }

    #[test]
    fn test_sequence_id_renders_and_orders_numerically() {
        assert_eq!(SequenceId::new(3).to_string(), "sequence-3");

        // "sequence-10" < "sequence-2" lexicographically; numeric ordering
        // must not fall into that trap
        assert!(SequenceId::new(2) < SequenceId::new(10));

        let mut ids: Vec<SequenceId> = (1..=12).rev().map(SequenceId::new).collect();
        ids.sort();
        assert_eq!(ids.first().copied(), Some(SequenceId::new(1)));
        assert_eq!(ids.last().copied(), Some(SequenceId::new(12)));
    }

    #[test]
    fn test_frame_key_joins_path() {
        let batch = FrameBatch {
            video: VideoSource::new("videos", "us-east-1", "demo.mp4"),
            sequence_id: SequenceId::new(1),
            image_path: "demo.mp4".to_string(),
            image_keys: vec!["00001.png".to_string()],
        };
        assert_eq!(batch.frame_key("00001.png"), "demo.mp4/00001.png");
    }

    #[test]
    fn test_outcome_record_text() {
        let ok = AnalysisOutcome::Ok {
            text: "a narrative".to_string(),
            prompt_version: "analysis-v2".to_string(),
        };
        assert!(!ok.is_failed());
        assert_eq!(ok.record_text(), "a narrative");

        let failed = AnalysisOutcome::Failed {
            kind: FailureKind::ModelInvocation,
            detail: "throttled".to_string(),
            sentinel: format!("{ANALYSIS_FAILURE_PREFIX} image analysis error"),
        };
        assert!(failed.is_failed());
        assert!(failed.record_text().starts_with(ANALYSIS_FAILURE_PREFIX));
    }
}
