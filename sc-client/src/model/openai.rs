use anyhow::anyhow;
use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessage,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ImageDetail,
        ImageUrlArgs,
    },
    Client,
};
use async_trait::async_trait;

use super::{Availability, LanguageModel, ModelSession, PromptInput};
use crate::config::ModelConfig;
use crate::photo::to_data_url;

/// Any OpenAI-compatible chat completion endpoint.
#[derive(Clone)]
pub struct OpenAiModel {
    client: Client<OpenAIConfig>,
    model: String,
    has_key: bool,
}

impl OpenAiModel {
    /// Build a client from config. The API key is read from the environment
    /// (or `.env`) under the configured variable name.
    pub fn from_config(config: &ModelConfig) -> Self {
        let api_key = dotenvy::var(&config.api_key_env).unwrap_or_default();
        if api_key.is_empty() {
            tracing::warn!(
                "{} is not set; the model will report itself unavailable",
                config.api_key_env
            );
        }
        Self {
            has_key: !api_key.is_empty(),
            client: Client::with_config(
                OpenAIConfig::new()
                    .with_api_key(api_key)
                    .with_api_base(&config.api_base),
            ),
            model: config.model.clone(),
        }
    }
}

#[async_trait]
impl LanguageModel for OpenAiModel {
    async fn availability(&self) -> Result<Availability> {
        Ok(if self.has_key {
            Availability::Available
        } else {
            Availability::Unavailable
        })
    }

    async fn create(&self) -> Result<Box<dyn ModelSession>> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl ModelSession for OpenAiModel {
    /// Calls the chat API one-shot with the given input.
    async fn prompt(&mut self, input: PromptInput) -> Result<String> {
        let message: ChatCompletionRequestMessage = match input {
            PromptInput::Text(text) => {
                ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                    content: text.into(),
                    name: None,
                })
            }
            // The API takes images as data URLs, so the photo rides along base64-encoded.
            PromptInput::WithImage { text, image } => ChatCompletionRequestUserMessageArgs::default()
                .content(vec![
                    ChatCompletionRequestMessageContentPartTextArgs::default()
                        .text(text)
                        .build()?
                        .into(),
                    ChatCompletionRequestMessageContentPartImageArgs::default()
                        .image_url(
                            ImageUrlArgs::default()
                                .url(to_data_url(&image))
                                .detail(ImageDetail::High)
                                .build()?,
                        )
                        .build()?
                        .into(),
                ])
                .build()?
                .into(),
        };
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([message])
            .build()?;
        self.client
            .chat()
            .create(request)
            .await?
            .choices
            .first()
            .ok_or(anyhow!("No response from model"))?
            .message
            .content
            .clone()
            .ok_or(anyhow!("No message content in model response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_key_reports_unavailable() {
        let config = ModelConfig {
            api_key_env: "SC_TEST_KEY_THAT_IS_NEVER_SET".into(),
            ..ModelConfig::default()
        };
        let model = OpenAiModel::from_config(&config);
        assert_eq!(model.availability().await.unwrap(), Availability::Unavailable);
    }
}
