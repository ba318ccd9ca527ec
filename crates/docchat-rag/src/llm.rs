//! Chat LLM client implementations
//!
//! OpenAI-compatible and Ollama chat clients behind the
//! [`ChatClient`] trait. Both send the conversation as role-tagged
//! messages and surface failures as collaborator errors.

use async_trait::async_trait;
use docchat_core::{
    ChatClient, ChatMessage, DocChatError, GenerationParams, LlmConfig, LlmProvider, Result,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn llm_error(message: impl Into<String>) -> DocChatError {
    DocChatError::collaborator("llm", message)
}

fn http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| llm_error(format!("failed to build http client: {e}")))
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct WireMessage {
    role: String,
    content: String,
}

fn to_wire(messages: &[ChatMessage]) -> Vec<WireMessage> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        })
        .collect()
}

// ============================================================================
// OpenAI Client
// ============================================================================

/// Client for the OpenAI chat completions API and compatible endpoints
/// (Groq, Azure, vLLM).
pub struct OpenAiChat {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: WireMessage,
}

impl OpenAiChat {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .openai_api_key
            .as_ref()
            .ok_or_else(|| DocChatError::Config("OpenAI API key required".to_string()))?;
        let base_url = config
            .openai_base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        Self::new(
            api_key.clone(),
            base_url,
            config.model.clone(),
            config.timeout_secs,
        )
    }
}

#[async_trait]
impl ChatClient for OpenAiChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let request = OpenAiRequest {
            model: self.model.clone(),
            messages: to_wire(messages),
            max_tokens: params.max_tokens,
            temperature: params.temperature,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| llm_error(format!("chat request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(llm_error(format!("chat API returned an error: {error_text}")));
        }

        let result: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| llm_error(format!("failed to parse chat response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| llm_error("no completion returned"))
    }
}

// ============================================================================
// Ollama Client
// ============================================================================

/// Client for the Ollama chat API
pub struct OllamaChat {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: WireMessage,
}

impl OllamaChat {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        timeout_secs: u64,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            config.ollama_url.clone(),
            config.model.clone(),
            config.timeout_secs,
        )
    }
}

#[async_trait]
impl ChatClient for OllamaChat {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        params: &GenerationParams,
    ) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            messages: to_wire(messages),
            stream: false,
            options: OllamaOptions {
                num_predict: params.max_tokens,
                temperature: params.temperature,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| llm_error(format!("Ollama request failed: {e}")))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(llm_error(format!("Ollama error: {error_text}")));
        }

        let result: OllamaResponse = response
            .json()
            .await
            .map_err(|e| llm_error(format!("failed to parse Ollama response: {e}")))?;

        Ok(result.message.content)
    }
}

/// Create a chat client from config
pub fn create_chat_client(config: &LlmConfig) -> Result<Box<dyn ChatClient>> {
    match config.provider {
        LlmProvider::OpenAI => Ok(Box::new(OpenAiChat::from_config(config)?)),
        LlmProvider::Ollama => Ok(Box::new(OllamaChat::from_config(config)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_core::ChatRole;

    #[test]
    fn test_wire_roles_are_lowercase() {
        let wire = to_wire(&[
            ChatMessage::system("s"),
            ChatMessage::user("u"),
            ChatMessage::assistant("a"),
        ]);
        let roles: Vec<&str> = wire.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
        assert_eq!(ChatRole::System.to_string(), "system");
    }

    #[test]
    fn test_openai_requires_api_key() {
        let config = LlmConfig::default();
        assert!(OpenAiChat::from_config(&config).is_err());
    }

    #[test]
    fn test_factory_picks_provider() {
        let mut config = LlmConfig::default();
        config.provider = LlmProvider::Ollama;
        assert!(create_chat_client(&config).is_ok());

        config.provider = LlmProvider::OpenAI;
        config.openai_api_key = Some("key".to_string());
        assert!(create_chat_client(&config).is_ok());
    }
}
