use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, FinishReason,
    },
    Client,
};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("the prompt was blocked by the model's safety filter")]
    Blocked,
    #[error("the model returned no text")]
    Empty,
    #[error("no answer within {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Api(#[from] OpenAIError),
}

/// Chat client for the persona, speaking the OpenAI wire format to Gemini's
/// compatibility endpoint.
pub struct LlmClient {
    chat_client: Client<OpenAIConfig>,
    chat_model: String,
    persona: String,
    timeout: Duration,
}

impl LlmClient {
    pub fn new(config: &Config) -> Self {
        let chat_config = OpenAIConfig::new()
            .with_api_base(&config.gemini_url)
            .with_api_key(config.gemini_api_key.as_deref().unwrap_or("unused"));

        Self {
            chat_client: Client::with_config(chat_config),
            chat_model: config.gemini_model.clone(),
            persona: config.persona_prompt.clone(),
            timeout: config.llm_timeout,
        }
    }

    /// Answers a question in character.
    pub async fn ask(&self, question: &str) -> Result<String, LlmError> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(self.persona.clone())
                .build()?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(question)
                .build()?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(messages)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.chat_client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout))?
            .map_err(classify_api_error)?;

        let Some(choice) = response.choices.into_iter().next() else {
            return Err(LlmError::Empty);
        };
        debug!("Persona reply finished with {:?}", choice.finish_reason);
        reply_from_choice(choice.message.content, choice.finish_reason)
    }
}

fn reply_from_choice(
    content: Option<String>,
    finish_reason: Option<FinishReason>,
) -> Result<String, LlmError> {
    let text = content.unwrap_or_default();
    if text.trim().is_empty() {
        return match finish_reason {
            Some(FinishReason::ContentFilter) => Err(LlmError::Blocked),
            _ => Err(LlmError::Empty),
        };
    }
    Ok(text)
}

/// Gemini rejects unsafe prompts with an API error rather than a filtered choice.
fn classify_api_error(err: OpenAIError) -> LlmError {
    match &err {
        OpenAIError::ApiError(api) if is_safety_rejection(&api.message) => LlmError::Blocked,
        _ => LlmError::Api(err),
    }
}

fn is_safety_rejection(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("safety") || message.contains("blocked") || message.contains("prohibited_content")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_from_choice() {
        assert_eq!(
            reply_from_choice(Some("Hi, I'm Magna".to_string()), Some(FinishReason::Stop)).unwrap(),
            "Hi, I'm Magna"
        );
        assert!(matches!(
            reply_from_choice(None, Some(FinishReason::ContentFilter)),
            Err(LlmError::Blocked)
        ));
        assert!(matches!(
            reply_from_choice(Some("  ".to_string()), Some(FinishReason::Stop)),
            Err(LlmError::Empty)
        ));
        assert!(matches!(reply_from_choice(None, None), Err(LlmError::Empty)));
    }

    #[test]
    fn test_safety_rejection_messages() {
        assert!(is_safety_rejection("Request blocked due to SAFETY"));
        assert!(is_safety_rejection("PROHIBITED_CONTENT"));
        assert!(!is_safety_rejection("API key not valid"));
    }

    #[test]
    fn test_timeout_message() {
        let err = LlmError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "no answer within 120s");
    }
}
