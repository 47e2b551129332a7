//! Injected observer capability for pipeline telemetry
//!
//! Components report stage completions and errors through this interface
//! instead of talking to a metrics backend directly.

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{info, warn};

use crate::{AnalysisOutcome, RunOutcome, RunStatus, SequenceId, VideoId};

/// Observer notified at the pipeline's side-effect points
pub trait PipelineObserver: Send + Sync {
    /// One batch finished describing (success or contained failure)
    fn on_batch_complete(&self, video_id: &VideoId, sequence_id: SequenceId, outcome: &AnalysisOutcome);

    /// A run reached its terminal state
    fn on_run_complete(&self, outcome: &RunOutcome);

    /// A stage-local error occurred (already contained or about to be)
    fn on_error(&self, stage: &str, detail: &str);
}

/// Default observer: structured log events, one per counter the
/// operations dashboard tracks
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn on_batch_complete(&self, video_id: &VideoId, sequence_id: SequenceId, outcome: &AnalysisOutcome) {
        if outcome.is_failed() {
            warn!(
                counter = "ImageAnalysisError",
                "Image analysis for video '{video_id}' is incomplete, failed analysis of '{sequence_id}'"
            );
        } else {
            info!("Analysis done for '{sequence_id}' of video '{video_id}'");
        }
    }

    fn on_run_complete(&self, outcome: &RunOutcome) {
        match outcome.status {
            RunStatus::Completed => {
                if outcome.summary.as_ref().is_some_and(AnalysisOutcome::is_failed) {
                    warn!(
                        counter = "AggregationError",
                        "Analysis for video '{}' could not be aggregated",
                        outcome.video_id
                    );
                } else {
                    info!(
                        counter = "FullAnalysis",
                        "Full analysis for video '{}' is now available",
                        outcome.video_id
                    );
                }
            }
            RunStatus::ExtractionFailed => {
                warn!(
                    counter = "ExtractionError",
                    "Run for video '{}' aborted: {}",
                    outcome.video_id,
                    outcome.message
                );
            }
        }
    }

    fn on_error(&self, stage: &str, detail: &str) {
        warn!("{stage} error: {detail}");
    }
}

/// Counting observer for tests
#[derive(Debug, Default)]
pub struct CountingObserver {
    pub batches_ok: AtomicUsize,
    pub batches_failed: AtomicUsize,
    pub runs_completed: AtomicUsize,
    pub errors: AtomicUsize,
}

impl CountingObserver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl PipelineObserver for CountingObserver {
    fn on_batch_complete(&self, _video_id: &VideoId, _sequence_id: SequenceId, outcome: &AnalysisOutcome) {
        if outcome.is_failed() {
            self.batches_failed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.batches_ok.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn on_run_complete(&self, _outcome: &RunOutcome) {
        self.runs_completed.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&self, _stage: &str, _detail: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FailureKind;

    #[test]
    fn test_counting_observer_tallies() {
        let observer = CountingObserver::new();
        let video_id = VideoId::from_object_key("demo.mp4");

        observer.on_batch_complete(
            &video_id,
            SequenceId::new(1),
            &AnalysisOutcome::Ok {
                text: "ok".to_string(),
                prompt_version: "analysis-v1".to_string(),
            },
        );
        observer.on_batch_complete(
            &video_id,
            SequenceId::new(2),
            &AnalysisOutcome::Failed {
                kind: FailureKind::Timeout,
                detail: "deadline".to_string(),
                sentinel: "Empty analysis due to timeout".to_string(),
            },
        );
        observer.on_error("describe", "boom");

        assert_eq!(observer.batches_ok.load(Ordering::SeqCst), 1);
        assert_eq!(observer.batches_failed.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
    }
}
