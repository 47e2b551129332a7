//! Deterministic mock model for tests and local dry runs

use std::sync::Mutex;

use crate::{ContentItem, InferenceParams, ModelClient, ModelError};

/// One recorded model call, kept for assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedInvocation {
    pub model_id: String,
    pub system_prompt: String,
    /// Text items in submission order
    pub texts: Vec<String>,
    pub image_count: usize,
}

/// Mock model client.
///
/// Responses are pure functions of the request, so a given ordered input
/// always produces the same output — the ordering tests depend on that.
/// An optional trigger substring makes matching calls fail, which is how
/// the failure-containment tests inject model errors.
#[derive(Debug, Default)]
pub struct MockModelClient {
    fail_when_contains: Option<String>,
    invocations: Mutex<Vec<RecordedInvocation>>,
}

impl MockModelClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call whose text content contains `trigger`
    #[must_use]
    pub fn failing_on(trigger: impl Into<String>) -> Self {
        Self {
            fail_when_contains: Some(trigger.into()),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// All calls recorded so far, in invocation order
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.invocations.lock().map(|i| i.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ModelClient for MockModelClient {
    async fn invoke(
        &self,
        model_id: &str,
        system_prompt: &str,
        content: &[ContentItem],
        _params: &InferenceParams,
    ) -> Result<String, ModelError> {
        let texts: Vec<String> = content
            .iter()
            .filter_map(|item| match item {
                ContentItem::Text(text) => Some(text.clone()),
                ContentItem::PngImage(_) => None,
            })
            .collect();
        let image_count = content
            .iter()
            .filter(|item| matches!(item, ContentItem::PngImage(_)))
            .count();

        if let Ok(mut invocations) = self.invocations.lock() {
            invocations.push(RecordedInvocation {
                model_id: model_id.to_string(),
                system_prompt: system_prompt.to_string(),
                texts: texts.clone(),
                image_count,
            });
        }

        if let Some(trigger) = &self.fail_when_contains {
            if texts.iter().any(|t| t.contains(trigger.as_str())) {
                return Err(ModelError::Invocation(format!(
                    "mock failure triggered by '{trigger}'"
                )));
            }
        }

        if image_count > 0 {
            // Per-batch description: fold the image listing back so each
            // batch yields a distinct, order-revealing text
            Ok(format!(
                "Observed {image_count} frames: {}",
                texts.first().map_or("", String::as_str)
            ))
        } else {
            // Aggregation: join the section texts in received order
            Ok(format!(
                "Summary of {} sections: {}",
                texts.len(),
                texts.join(" | ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let client = MockModelClient::new();
        let content = vec![
            ContentItem::Text("reading images in '00001.png,00002.png'".to_string()),
            ContentItem::PngImage(vec![1, 2, 3]),
            ContentItem::PngImage(vec![4, 5, 6]),
        ];
        let params = InferenceParams::deterministic();

        let first = client.invoke("model-a", "prompt", &content, &params).await.unwrap();
        let second = client.invoke("model-a", "prompt", &content, &params).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "Observed 2 frames: reading images in '00001.png,00002.png'");
    }

    #[tokio::test]
    async fn test_mock_aggregation_preserves_order() {
        let client = MockModelClient::new();
        let content = vec![
            ContentItem::Text("first".to_string()),
            ContentItem::Text("second".to_string()),
        ];
        let params = InferenceParams::deterministic();

        let out = client.invoke("model-b", "prompt", &content, &params).await.unwrap();
        assert_eq!(out, "Summary of 2 sections: first | second");
    }

    #[tokio::test]
    async fn test_mock_failure_trigger() {
        let client = MockModelClient::failing_on("poison");
        let params = InferenceParams::deterministic();

        let err = client
            .invoke(
                "model-a",
                "prompt",
                &[ContentItem::Text("poison pill".to_string())],
                &params,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Invocation(_)));

        // untriggered calls still succeed
        let ok = client
            .invoke(
                "model-a",
                "prompt",
                &[ContentItem::Text("fine".to_string())],
                &params,
            )
            .await;
        assert!(ok.is_ok());

        assert_eq!(client.invocations().len(), 2);
    }
}
