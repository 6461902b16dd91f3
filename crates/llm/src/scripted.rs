//! Deterministic chat model for tests and offline development.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::{ChatMessage, ChatModel, LlmError, ResponseSchema};

/// Replays queued responses in order and records every invocation.
///
/// An exhausted script returns `LlmError::Provider`, which keeps a forgotten
/// queue entry from looking like a model decision.
#[derive(Default)]
pub struct ScriptedChatModel {
    responses: Mutex<VecDeque<Result<Value, LlmError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

/// What one invocation looked like, for assertions.
#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub messages: Vec<ChatMessage>,
    pub schema_name: Option<String>,
}

impl ScriptedChatModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful structured response.
    pub fn push_value(&self, value: Value) {
        self.responses
            .lock()
            .expect("script lock poisoned")
            .push_back(Ok(value));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: LlmError) {
        self.responses
            .lock()
            .expect("script lock poisoned")
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("call lock poisoned").clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("script lock poisoned").len()
    }
}

#[async_trait]
impl ChatModel for ScriptedChatModel {
    async fn invoke(
        &self,
        messages: &[ChatMessage],
        schema: Option<&ResponseSchema>,
    ) -> Result<Value, LlmError> {
        self.calls
            .lock()
            .expect("call lock poisoned")
            .push(RecordedCall {
                messages: messages.to_vec(),
                schema_name: schema.map(|s| s.name.clone()),
            });

        self.responses
            .lock()
            .expect("script lock poisoned")
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Provider("script exhausted".to_string())))
    }
}
