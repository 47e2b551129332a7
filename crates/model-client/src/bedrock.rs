//! Converse API implementation of the model capability

use std::collections::HashMap;

use aws_sdk_bedrockruntime::{
    config::{Credentials, Region},
    types::{
        ContentBlock, ConversationRole, ImageBlock, ImageFormat, ImageSource,
        InferenceConfiguration, Message, SystemContentBlock,
    },
    Client,
};
use aws_smithy_types::{Blob, Document, Number};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{ContentItem, InferenceParams, ModelClient, ModelError};

/// Model backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// AWS region hosting the model runtime
    pub region: String,

    /// AWS access key ID
    pub access_key_id: String,

    /// AWS secret access key
    pub secret_access_key: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            region: std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
            access_key_id: std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default(),
            secret_access_key: std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default(),
        }
    }
}

/// Model client backed by the Bedrock Converse API
pub struct BedrockModelClient {
    client: Client,
}

impl BedrockModelClient {
    /// Create a new Converse client
    #[must_use]
    pub fn new(config: &ModelConfig) -> Self {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "video-narrative-model",
        );

        let runtime_config = aws_sdk_bedrockruntime::Config::builder()
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .behavior_version_latest()
            .build();

        Self {
            client: Client::from_conf(runtime_config),
        }
    }

    fn build_content(content: &[ContentItem]) -> Result<Vec<ContentBlock>, ModelError> {
        let mut blocks = Vec::with_capacity(content.len());
        for item in content {
            match item {
                ContentItem::Text(text) => blocks.push(ContentBlock::Text(text.clone())),
                ContentItem::PngImage(bytes) => {
                    let image = ImageBlock::builder()
                        .format(ImageFormat::Png)
                        .source(ImageSource::Bytes(Blob::new(bytes.clone())))
                        .build()
                        .map_err(|e| ModelError::InvalidRequest(e.to_string()))?;
                    blocks.push(ContentBlock::Image(image));
                }
            }
        }
        Ok(blocks)
    }
}

#[async_trait::async_trait]
impl ModelClient for BedrockModelClient {
    async fn invoke(
        &self,
        model_id: &str,
        system_prompt: &str,
        content: &[ContentItem],
        params: &InferenceParams,
    ) -> Result<String, ModelError> {
        let blocks = Self::build_content(content)?;

        let message = Message::builder()
            .role(ConversationRole::User)
            .set_content(Some(blocks))
            .build()
            .map_err(|e| ModelError::InvalidRequest(e.to_string()))?;

        let inference_config = InferenceConfiguration::builder()
            .max_tokens(params.max_tokens)
            .temperature(params.temperature)
            .top_p(params.top_p)
            .build();

        let mut request = self
            .client
            .converse()
            .model_id(model_id)
            .messages(message)
            .system(SystemContentBlock::Text(system_prompt.to_string()))
            .inference_config(inference_config);

        if InferenceParams::top_k_applies(model_id) {
            let fields = Document::Object(HashMap::from([(
                "top_k".to_string(),
                Document::Number(Number::PosInt(params.top_k as u64)),
            )]));
            request = request.additional_model_request_fields(fields);
        }

        debug!(
            "Sending {} content items to model '{model_id}'",
            content.len()
        );

        let response = request
            .send()
            .await
            .map_err(|e| ModelError::Invocation(e.to_string()))?;

        let output = response.output().ok_or(ModelError::EmptyResponse)?;
        let message = output.as_message().map_err(|_| ModelError::EmptyResponse)?;

        message
            .content()
            .iter()
            .find_map(|block| block.as_text().ok())
            .cloned()
            .ok_or(ModelError::EmptyResponse)
    }
}
