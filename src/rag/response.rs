//! Persona-shaped response generation.

use super::{AssembledContext, PersonaConfig};
use crate::config::Prompts;
use crate::error::{AvatarError, ProviderErrorKind, Result};
use crate::llm::{ChatMessage, ChatModel, CompletionParams};
use crate::normalize::clean;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Turns a query and assembled context into the avatar's reply.
pub struct ResponseGenerator {
    chat: Arc<dyn ChatModel>,
    params: CompletionParams,
    prompts: Prompts,
}

impl ResponseGenerator {
    pub fn new(chat: Arc<dyn ChatModel>, params: CompletionParams) -> Self {
        Self {
            chat,
            params,
            prompts: Prompts::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn params(&self) -> &CompletionParams {
        &self.params
    }

    /// Build the message list sent to the model.
    ///
    /// The persona instruction comes first, then either the retrieved context
    /// or an explicit no-context instruction, then the user's message.
    pub fn build_messages(&self, query: &str, context: &AssembledContext, persona: &PersonaConfig) -> Vec<ChatMessage> {
        let vars = persona.template_vars();

        let mut system = self.prompts.render_with_custom(&self.prompts.persona.system, &vars);
        if persona
            .custom_instructions
            .as_deref()
            .is_some_and(|c| !c.trim().is_empty())
        {
            system.push_str("\n\n");
            system.push_str(
                &self
                    .prompts
                    .render_with_custom(&self.prompts.persona.custom_instructions, &vars),
            );
        }

        let context_message = if context.is_empty() {
            self.prompts
                .render_with_custom(&self.prompts.persona.no_context, &vars)
        } else {
            let mut vars = vars;
            vars.insert("context".to_string(), context.text.clone());
            self.prompts
                .render_with_custom(&self.prompts.persona.context, &vars)
        };

        vec![
            ChatMessage::system(system),
            ChatMessage::system(context_message),
            ChatMessage::user(query),
        ]
    }

    /// Generate the avatar's reply.
    #[instrument(skip(self, context, persona), fields(has_context = !context.is_empty()))]
    pub async fn generate(&self, query: &str, context: &AssembledContext, persona: &PersonaConfig) -> Result<String> {
        let messages = self.build_messages(query, context, persona);
        let reply = self.complete(&messages, &self.params).await?;
        debug!("Generated reply of {} characters", reply.len());
        Ok(reply)
    }

    /// Summarize auxiliary content in at most roughly `max_length` characters.
    #[instrument(skip(self, text))]
    pub async fn summarize(&self, text: &str, max_length: usize) -> Result<String> {
        let text = clean(text);
        if text.is_empty() {
            return Err(AvatarError::InvalidInput("Nothing to summarize".to_string()));
        }

        let vars = HashMap::from([
            ("text".to_string(), text),
            ("max_length".to_string(), max_length.to_string()),
        ]);
        let messages = vec![
            ChatMessage::system(self.prompts.summary.system.clone()),
            ChatMessage::user(self.prompts.render_with_custom(&self.prompts.summary.user, &vars)),
        ];

        let params = CompletionParams {
            temperature: 0.3,
            max_tokens: self.params.max_tokens.max(max_length.div_ceil(4) as u32 + 16),
            ..self.params.clone()
        };
        self.complete(&messages, &params).await
    }

    async fn complete(&self, messages: &[ChatMessage], params: &CompletionParams) -> Result<String> {
        let reply = self.chat.complete(messages, params).await?;
        let reply = reply.trim();
        if reply.is_empty() {
            return Err(AvatarError::LlmProvider {
                kind: ProviderErrorKind::Other,
                message: "Empty response from LLM".to_string(),
            });
        }
        Ok(reply.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationSettings;
    use crate::llm::ChatRole;
    use crate::test_support::ScriptedChat;
    use uuid::Uuid;

    fn generator(chat: Arc<ScriptedChat>) -> ResponseGenerator {
        ResponseGenerator::new(chat, CompletionParams::from(&GenerationSettings::default()))
    }

    fn context(text: &str) -> AssembledContext {
        AssembledContext {
            text: text.to_string(),
            included_chunk_ids: vec![Uuid::new_v4()],
            truncated: false,
            estimated_tokens: 10,
        }
    }

    #[test]
    fn test_messages_with_context() {
        let gen = generator(Arc::new(ScriptedChat::replying("ok")));
        let persona = PersonaConfig {
            name: "Maya".to_string(),
            custom_instructions: Some("Never discuss sponsorship rates.".to_string()),
            ..PersonaConfig::default()
        };

        let messages = gen.build_messages("What shoes do you wear?", &context("[1] Gear\nI wear trail shoes."), &persona);
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("You are Maya"));
        assert!(messages[0].content.contains("Never discuss sponsorship rates."));
        assert!(messages[1].content.contains("I wear trail shoes."));
        assert_eq!(messages[2], ChatMessage::user("What shoes do you wear?"));
    }

    #[test]
    fn test_messages_without_context_forbid_fabrication() {
        let gen = generator(Arc::new(ScriptedChat::replying("ok")));
        let messages = gen.build_messages("Hi", &AssembledContext::default(), &PersonaConfig::default());

        assert!(messages[1].content.contains("don't have enough information"));
        assert!(!messages[0].content.contains("Additional instructions"));
    }

    #[test]
    fn test_context_placeholders_are_kept_verbatim() {
        let gen = generator(Arc::new(ScriptedChat::replying("ok")));
        let persona = PersonaConfig {
            name: "Maya".to_string(),
            ..PersonaConfig::default()
        };
        let chunk = "My favourite quote is {{name}} and {{tone}}.";

        for _ in 0..50 {
            let messages = gen.build_messages("Quote?", &context(chunk), &persona);
            assert!(messages[1].content.contains(chunk));
            assert!(!messages[1].content.contains("Maya"));
        }
    }

    #[tokio::test]
    async fn test_summary_text_placeholders_are_kept_verbatim() {
        let chat = Arc::new(ScriptedChat::replying("ok"));
        let gen = generator(chat.clone());
        let text = "This template uses {{max_length}} literally.";

        for _ in 0..20 {
            gen.summarize(text, 120).await.unwrap();
        }
        for (messages, _) in chat.calls() {
            assert!(messages[1].content.contains(text));
            assert!(messages[1].content.contains("at most 120 characters"));
        }
    }

    #[tokio::test]
    async fn test_generate_trims_and_uses_params() {
        let chat = Arc::new(ScriptedChat::replying("  Trail shoes, always.  \n"));
        let gen = generator(chat.clone());

        let reply = gen
            .generate("Shoes?", &context("I wear trail shoes."), &PersonaConfig::default())
            .await
            .unwrap();
        assert_eq!(reply, "Trail shoes, always.");

        let calls = chat.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.model, "gpt-4o-mini");
        assert_eq!(calls[0].1.max_tokens, 500);
    }

    #[tokio::test]
    async fn test_blank_reply_is_an_error() {
        let gen = generator(Arc::new(ScriptedChat::replying("   ")));
        let result = gen.generate("Hi", &AssembledContext::default(), &PersonaConfig::default()).await;
        assert!(matches!(result, Err(AvatarError::LlmProvider { kind: ProviderErrorKind::Other, .. })));
    }

    #[tokio::test]
    async fn test_summarize() {
        let chat = Arc::new(ScriptedChat::replying("A runner's day."));
        let gen = generator(chat.clone());

        let summary = gen.summarize("Woke up.\n\n\nRan   20km.", 120).await.unwrap();
        assert_eq!(summary, "A runner's day.");

        let calls = chat.calls();
        let user = &calls[0].0[1].content;
        assert!(user.contains("at most 120 characters"));
        assert!(user.contains("Woke up.\nRan 20km."));

        assert!(matches!(gen.summarize(" \n ", 120).await, Err(AvatarError::InvalidInput(_))));
    }
}
