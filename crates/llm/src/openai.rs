//! OpenAI-compatible chat provider.
//!
//! Works against any endpoint speaking the `/chat/completions` protocol.
//! HTTP status codes are mapped onto the [`LlmError`] taxonomy so the agent
//! core can classify failures without knowing the provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::{ChatMessage, ChatModel, LlmError, MessageRole, ResponseSchema};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            temperature: 0.0,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

pub struct OpenAiChatModel {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiChatModel {
    pub fn new(config: OpenAiConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| LlmError::Provider(err.to_string()))?;
        Ok(Self { config, client })
    }

    fn wire_role(role: MessageRole) -> &'static str {
        match role {
            MessageRole::System => "system",
            MessageRole::Human => "user",
            MessageRole::Ai | MessageRole::Plan => "assistant",
        }
    }

    fn map_status(status: reqwest::StatusCode, body: String) -> LlmError {
        match status.as_u16() {
            401 => LlmError::Auth(body),
            400 | 422 => LlmError::BadRequest(body),
            403 | 429 => LlmError::Forbidden(body),
            _ => LlmError::Provider(format!("HTTP {status}: {body}")),
        }
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        schema: Option<&ResponseSchema>,
    ) -> Result<Value, LlmError> {
        let wire_messages: Vec<Value> = messages
            .iter()
            .map(|m| {
                json!({
                    "role": Self::wire_role(m.role),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": wire_messages,
        });
        if let Some(schema) = schema {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                },
            });
        }

        debug!(model = %self.config.model, messages = messages.len(), "invoking chat model");

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| LlmError::Provider(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "chat completion request failed");
            return Err(Self::map_status(status, body));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|err| LlmError::Decode(err.to_string()))?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| LlmError::Decode("completion had no content".to_string()))?;

        if schema.is_some() {
            serde_json::from_str(&content).map_err(|err| LlmError::Decode(err.to_string()))
        } else {
            Ok(Value::String(content))
        }
    }
}
