//! Completion provider contract

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use voice_loop_core::ChatMessage;

use crate::ProviderError;

/// Lazy sequence of token deltas. The stream ends at end-of-reply; dropping
/// it cancels the underlying request.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// A completion request message: role plus flattened text content.
#[derive(Debug, Clone)]
pub struct PromptMessage {
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

impl From<&ChatMessage> for PromptMessage {
    fn from(message: &ChatMessage) -> Self {
        // Transcript entries read as user turns to the model.
        let role = match message.role {
            voice_loop_core::Role::Assistant => "assistant",
            _ => "user",
        };
        Self {
            role: role.to_string(),
            content: message.content.clone(),
        }
    }
}

/// Streaming language-model completion provider.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Begin a streaming completion over `messages`.
    async fn stream(
        &self,
        messages: &[PromptMessage],
        max_tokens: u32,
    ) -> Result<TokenStream, ProviderError>;
}
