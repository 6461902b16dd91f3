//! Step planner and replanner.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pagepilot_llm::{invoke_structured, ChatMessage, ChatModel, LlmError};

use crate::agent::prompts;

/// Initial plan produced before the first navigator step.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct PlannerOutput {
    /// Ordered browsing steps, executed front to back.
    pub steps: Vec<String>,
}

/// Replanner verdict after reviewing executed steps.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReplanOutput {
    /// True once the objective is met.
    #[serde(default)]
    pub done: bool,
    /// Remaining steps, replacing the previous plan. Empty iff `done`.
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Completion text, present when `done`.
    #[serde(default)]
    pub final_answer: Option<String>,
}

impl ReplanOutput {
    /// A verdict either finishes the task or supplies remaining steps,
    /// never both and never neither.
    pub fn validate(&self) -> Result<(), LlmError> {
        match (self.done, self.next_steps.is_empty()) {
            (true, true) | (false, false) => Ok(()),
            (true, false) => Err(LlmError::Decode(
                "replanner returned done together with next steps".into(),
            )),
            (false, true) => Err(LlmError::Decode(
                "replanner returned neither done nor next steps".into(),
            )),
        }
    }
}

/// One executed plan step with its outcome, fed back to the replanner.
#[derive(Clone, Debug)]
pub struct PastStep {
    pub step: String,
    pub result: String,
}

pub struct Planner {
    model: Arc<dyn ChatModel>,
}

impl Planner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn plan(&self, objective: &str) -> Result<PlannerOutput, LlmError> {
        let messages = [
            ChatMessage::system(prompts::PLANNER_SYSTEM_PROMPT),
            ChatMessage::human(prompts::planner_request(objective)),
        ];
        let output: PlannerOutput =
            invoke_structured(self.model.as_ref(), &messages, "plan").await?;
        if output.steps.is_empty() {
            return Err(LlmError::Decode("planner returned an empty plan".into()));
        }
        debug!(steps = output.steps.len(), "planner produced plan");
        Ok(output)
    }
}

pub struct Replanner {
    model: Arc<dyn ChatModel>,
}

impl Replanner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn replan(
        &self,
        objective: &str,
        plan: &[String],
        past_steps: &[PastStep],
    ) -> Result<ReplanOutput, LlmError> {
        let past: Vec<(String, String)> = past_steps
            .iter()
            .map(|p| (p.step.clone(), p.result.clone()))
            .collect();
        let messages = [
            ChatMessage::system(prompts::REPLANNER_SYSTEM_PROMPT),
            ChatMessage::human(prompts::replanner_request(objective, plan, &past)),
        ];
        let output: ReplanOutput =
            invoke_structured(self.model.as_ref(), &messages, "replan").await?;
        output.validate()?;
        debug!(done = output.done, remaining = output.next_steps.len(), "replanner verdict");
        Ok(output)
    }
}
