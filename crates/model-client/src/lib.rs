//! Vision/text model capability for the video narrative pipeline
//!
//! The pipeline talks to exactly one model operation: "given a system
//! instruction and an ordered list of content items (text and/or PNG
//! images), return free text". Two model identities are used per run — a
//! cheaper one for per-batch description and a larger one for aggregation —
//! both reached through the same [`ModelClient`] trait.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod bedrock;
pub mod mock;

pub use bedrock::{BedrockModelClient, ModelConfig};
pub use mock::{MockModelClient, RecordedInvocation};

/// One item of a model request payload, in submission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text(String),
    /// Raw PNG bytes of one still frame
    PngImage(Vec<u8>),
}

/// Inference parameters passed with every model call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InferenceParams {
    pub max_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
    /// Sampling cutoff for model families that accept it; ignored elsewhere
    pub top_k: i32,
}

impl InferenceParams {
    /// Deterministic generation: bounded output, zero temperature,
    /// near-zero nucleus width
    #[must_use]
    pub fn deterministic() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.0,
            top_p: 0.0,
            top_k: 250,
        }
    }

    /// Whether `top_k` should be sent for this model identity. Only the
    /// Claude family accepts the parameter.
    #[must_use]
    pub fn top_k_applies(model_id: &str) -> bool {
        model_id.contains("anthropic.claude")
    }
}

impl Default for InferenceParams {
    fn default() -> Self {
        Self::deterministic()
    }
}

/// Model invocation errors
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Model invocation failed: {0}")]
    Invocation(String),

    #[error("Model returned no text content")]
    EmptyResponse,

    #[error("Invalid model request: {0}")]
    InvalidRequest(String),
}

/// A model capable of describing ordered text/image content
#[async_trait::async_trait]
pub trait ModelClient: Send + Sync {
    /// Submit one request and return the first text item of the response.
    async fn invoke(
        &self,
        model_id: &str,
        system_prompt: &str,
        content: &[ContentItem],
        params: &InferenceParams,
    ) -> Result<String, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_params() {
        let params = InferenceParams::deterministic();
        assert_eq!(params.max_tokens, 4096);
        assert_eq!(params.temperature, 0.0);
        assert_eq!(params.top_p, 0.0);
        assert_eq!(params.top_k, 250);
    }

    #[test]
    fn test_top_k_only_for_claude_family() {
        assert!(InferenceParams::top_k_applies(
            "anthropic.claude-3-haiku-20240307-v1:0"
        ));
        assert!(!InferenceParams::top_k_applies("meta.llama3-70b-instruct-v1:0"));
        assert!(!InferenceParams::top_k_applies("ai21.jamba-instruct-v1:0"));
    }
}
