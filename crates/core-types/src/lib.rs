//! Shared identifiers and execution-state primitives for the PagePilot agent.
//!
//! These types cross crate boundaries: the event bus carries them, the agent
//! core produces them, and host UIs consume them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for one task session.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Which component produced an execution event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    System,
    Planner,
    Navigator,
}

/// Lifecycle states reported over the event bus.
///
/// `Task*` states are terminal for one run except `TaskPause`; `Step*` states
/// bracket one navigator turn; `Act*` states bracket a single browser action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    TaskStart,
    TaskOk,
    TaskFail,
    TaskCancel,
    TaskPause,
    StepStart,
    StepOk,
    StepFail,
    ActStart,
    ActOk,
    ActFail,
}

impl ExecutionState {
    /// True for the end-of-task states (pause is a soft, resumable outcome).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::TaskOk | Self::TaskFail | Self::TaskCancel | Self::TaskPause
        )
    }
}

/// A single execution-progress notification.
///
/// Events are immutable once constructed; they are published, delivered to
/// subscribers, and discarded.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub actor: Actor,
    pub state: ExecutionState,
    pub task_id: TaskId,
    pub step: u32,
    pub max_steps: u32,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(
        actor: Actor,
        state: ExecutionState,
        task_id: TaskId,
        step: u32,
        max_steps: u32,
        details: impl Into<String>,
    ) -> Self {
        Self {
            actor,
            state,
            task_id,
            step,
            max_steps,
            details: details.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of one browser action.
///
/// `extracted_content` and `error` are mutually exclusive in intent, though
/// the model does not enforce it; `error` results are recoverable and are
/// surfaced to the LLM as context rather than thrown up the stack.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ActionResult {
    pub extracted_content: Option<String>,
    pub error: Option<String>,
    /// True only for the terminal `done` action.
    pub is_done: bool,
    /// Whether this result is folded into conversation memory on later passes.
    pub include_in_memory: bool,
}

impl ActionResult {
    /// Successful action with content worth remembering.
    pub fn content(message: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(message.into()),
            error: None,
            is_done: false,
            include_in_memory: true,
        }
    }

    /// Recoverable failure; the message is shown to the LLM next turn.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            extracted_content: None,
            error: Some(message.into()),
            is_done: false,
            include_in_memory: false,
        }
    }

    /// Terminal `done` result carrying the completion text.
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            extracted_content: Some(message.into()),
            error: None,
            is_done: true,
            include_in_memory: true,
        }
    }

    pub fn with_memory(mut self, include: bool) -> Self {
        self.include_in_memory = include;
        self
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique() {
        assert_ne!(TaskId::new(), TaskId::new());
    }

    #[test]
    fn terminal_states() {
        assert!(ExecutionState::TaskOk.is_terminal());
        assert!(ExecutionState::TaskCancel.is_terminal());
        assert!(!ExecutionState::StepOk.is_terminal());
        assert!(!ExecutionState::ActFail.is_terminal());
    }

    #[test]
    fn action_result_constructors() {
        let ok = ActionResult::content("clicked");
        assert!(ok.is_success());
        assert!(ok.include_in_memory);
        assert!(!ok.is_done);

        let err = ActionResult::error("element missing");
        assert!(!err.is_success());
        assert!(!err.include_in_memory);

        let done = ActionResult::done("finished");
        assert!(done.is_done);
        assert_eq!(done.extracted_content.as_deref(), Some("finished"));
    }

    #[test]
    fn event_round_trips_through_json() {
        let event = ExecutionEvent::new(
            Actor::Navigator,
            ExecutionState::ActOk,
            TaskId::new(),
            3,
            100,
            "navigated",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: ExecutionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.actor, Actor::Navigator);
        assert_eq!(back.state, ExecutionState::ActOk);
        assert_eq!(back.step, 3);
    }
}
