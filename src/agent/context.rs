//! Shared per-task state and cooperative control signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pagepilot_core_types::{ActionResult, Actor, ExecutionEvent, ExecutionState, TaskId};
use pagepilot_event_bus::{EventBus, EventKind};

use crate::config::ExecutionOptions;

/// Cloneable handle for pausing, resuming, stopping and cancelling a task
/// from outside the loop.
#[derive(Debug, Clone, Default)]
pub struct ControlHandle {
    cancel: CancellationToken,
    paused: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ControlHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    /// Request a graceful stop. The loop finishes its current await point and
    /// emits a cancel event.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst) || self.cancel.is_cancelled()
    }

    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// Mutable state threaded through one task execution.
pub struct AgentContext {
    pub task_id: TaskId,
    pub options: ExecutionOptions,
    pub event_bus: Arc<EventBus>,
    pub control: ControlHandle,
    pub n_steps: u32,
    pub consecutive_failures: u32,
    pub action_results: Vec<ActionResult>,
    final_answer: Option<String>,
}

impl AgentContext {
    pub fn new(
        task_id: TaskId,
        options: ExecutionOptions,
        event_bus: Arc<EventBus>,
        control: ControlHandle,
    ) -> Self {
        Self {
            task_id,
            options,
            event_bus,
            control,
            n_steps: 0,
            consecutive_failures: 0,
            action_results: Vec::new(),
            final_answer: None,
        }
    }

    /// Records the answer reported by the first successful `done` action,
    /// kept as a fallback when the replanner gives none. Later calls are
    /// ignored.
    pub fn set_final_answer(&mut self, answer: impl Into<String>) {
        if self.final_answer.is_none() {
            self.final_answer = Some(answer.into());
        }
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    /// Clears the recorded answer when a follow-up task starts.
    pub fn clear_final_answer(&mut self) {
        self.final_answer = None;
    }

    /// Emits an execution event carrying current step counters.
    pub async fn emit(&self, actor: Actor, state: ExecutionState, details: impl Into<String>) {
        let event = ExecutionEvent {
            actor,
            state,
            task_id: self.task_id.clone(),
            step: self.n_steps,
            max_steps: self.options.max_steps,
            details: details.into(),
            timestamp: chrono::Utc::now(),
        };
        self.event_bus.emit(EventKind::Execution, event).await;
    }

    /// Drops results that asked not to be carried forward in memory.
    pub fn prune_transient_results(&mut self) {
        self.action_results.retain(|r| r.include_in_memory);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_cancels_token() {
        let control = ControlHandle::new();
        let token = control.token();
        assert!(!control.is_stopped());
        control.stop();
        assert!(control.is_stopped());
        assert!(token.is_cancelled());
    }

    #[test]
    fn pause_resume() {
        let control = ControlHandle::new();
        control.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!control.is_paused());
    }

    #[test]
    fn final_answer_write_once() {
        let mut ctx = AgentContext::new(
            TaskId::new(),
            ExecutionOptions::minimal(),
            Arc::new(EventBus::new()),
            ControlHandle::new(),
        );
        ctx.set_final_answer("first");
        ctx.set_final_answer("second");
        assert_eq!(ctx.final_answer(), Some("first"));
    }
}
