//! OpenAI chat completions.

use super::{ChatMessage, ChatModel, ChatRole, CompletionParams};
use crate::config::OpenAISettings;
use crate::error::{AvatarError, ProviderErrorKind, Result};
use crate::openai::{classify_error, create_client};
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// OpenAI-backed chat model.
pub struct OpenAIChatModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIChatModel {
    pub fn new(openai: &OpenAISettings) -> Result<Self> {
        Ok(Self {
            client: create_client(openai)?,
        })
    }
}

fn invalid_request(e: impl std::fmt::Display) -> AvatarError {
    AvatarError::LlmProvider {
        kind: ProviderErrorKind::InvalidRequest,
        message: e.to_string(),
    }
}

fn to_request_message(message: &ChatMessage) -> Result<ChatCompletionRequestMessage> {
    let converted = match message.role {
        ChatRole::System => ChatCompletionRequestSystemMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(invalid_request)?
            .into(),
        ChatRole::User => ChatCompletionRequestUserMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(invalid_request)?
            .into(),
        ChatRole::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
            .content(message.content.clone())
            .build()
            .map_err(invalid_request)?
            .into(),
    };
    Ok(converted)
}

#[async_trait]
impl ChatModel for OpenAIChatModel {
    #[instrument(skip(self, messages), fields(model = %params.model, messages = messages.len()))]
    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let request_messages = messages
            .iter()
            .map(to_request_message)
            .collect::<Result<Vec<_>>>()?;

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(&params.model)
            .messages(request_messages)
            .temperature(params.temperature)
            .max_completion_tokens(params.max_tokens);
        if let Some(top_p) = params.top_p {
            builder.top_p(top_p);
        }
        let request = builder.build().map_err(invalid_request)?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| AvatarError::LlmProvider {
                kind: classify_error(&e),
                message: e.to_string(),
            })?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AvatarError::LlmProvider {
                kind: ProviderErrorKind::Other,
                message: "Empty response from LLM".to_string(),
            })?;

        debug!("Completion returned {} characters", content.len());
        Ok(content)
    }
}
