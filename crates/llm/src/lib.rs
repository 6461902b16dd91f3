//! Chat-model collaborator seam for the PagePilot agent.
//!
//! The agent core only depends on [`ChatModel`]: a structured-output chat
//! invocation with a typed failure taxonomy. An OpenAI-compatible provider
//! and a scripted test double live alongside the trait so every consumer can
//! swap between them.

pub mod openai;
pub mod scripted;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use openai::{OpenAiChatModel, OpenAiConfig};
pub use scripted::ScriptedChatModel;

/// Role of one conversation message.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    Human,
    Ai,
    /// Planner output injected into the conversation; sent to providers as an
    /// assistant turn.
    Plan,
}

/// One message in the LLM context window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn human(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Human,
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Ai,
            content: content.into(),
        }
    }

    pub fn plan(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Plan,
            content: content.into(),
        }
    }
}

/// JSON schema constraining a structured response.
#[derive(Clone, Debug)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

impl ResponseSchema {
    /// Derive the schema for `T` via schemars.
    pub fn of<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schema_for!(T);
        Self {
            name: name.into(),
            schema: serde_json::to_value(root.schema)
                .unwrap_or_else(|_| serde_json::json!({"type": "object"})),
        }
    }
}

/// Typed LLM failure taxonomy.
///
/// Auth, bad-request, forbidden and cancellation are policy errors: fatal to
/// the running task. Everything else is transient and subject to the
/// consecutive-failure budget.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("malformed request: {0}")]
    BadRequest(String),

    #[error("forbidden or quota exceeded: {0}")]
    Forbidden(String),

    #[error("request cancelled: {0}")]
    Cancelled(String),

    #[error("failed to decode model output: {0}")]
    Decode(String),

    #[error("provider error: {0}")]
    Provider(String),
}

impl LlmError {
    /// Errors that must abort the task instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::BadRequest(_) | Self::Forbidden(_) | Self::Cancelled(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }
}

/// A chat model invocation returning structured output.
///
/// Implementations are stateless request/response wrappers and therefore safe
/// to share across concurrent task sessions.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send `messages` and return the model's reply. When `schema` is given
    /// the reply is the parsed JSON document conforming to it; otherwise a
    /// JSON string with the raw text.
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        schema: Option<&ResponseSchema>,
    ) -> Result<serde_json::Value, LlmError>;
}

/// Invoke `model` and deserialize the structured reply into `T`.
pub async fn invoke_structured<T>(
    model: &dyn ChatModel,
    messages: &[ChatMessage],
    schema_name: &str,
) -> Result<T, LlmError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = ResponseSchema::of::<T>(schema_name);
    let value = model.invoke(messages, Some(&schema)).await?;
    serde_json::from_value(value).map_err(|err| LlmError::Decode(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Echo {
        text: String,
    }

    #[test]
    fn fatality_classification() {
        assert!(LlmError::Auth("no key".into()).is_fatal());
        assert!(LlmError::BadRequest("bad schema".into()).is_fatal());
        assert!(LlmError::Forbidden("quota".into()).is_fatal());
        assert!(LlmError::Cancelled("user".into()).is_fatal());
        assert!(LlmError::Cancelled("user".into()).is_cancelled());
        assert!(!LlmError::Provider("502".into()).is_fatal());
        assert!(!LlmError::Decode("eof".into()).is_fatal());
    }

    #[test]
    fn schema_derivation_produces_object_schema() {
        let schema = ResponseSchema::of::<Echo>("echo");
        assert_eq!(schema.name, "echo");
        assert!(schema.schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn invoke_structured_decodes() {
        let model = ScriptedChatModel::new();
        model.push_value(serde_json::json!({"text": "hello"}));

        let echo: Echo = invoke_structured(&model, &[ChatMessage::human("hi")], "echo")
            .await
            .unwrap();
        assert_eq!(echo.text, "hello");
    }

    #[tokio::test]
    async fn invoke_structured_surfaces_decode_errors() {
        let model = ScriptedChatModel::new();
        model.push_value(serde_json::json!({"unexpected": true}));

        let result: Result<Echo, _> =
            invoke_structured(&model, &[ChatMessage::human("hi")], "echo").await;
        assert!(matches!(result, Err(LlmError::Decode(_))));
    }
}
