//! The navigator: turns one plan step into browser actions.

use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

use pagepilot_browser::{BrowserContext, PageState};
use pagepilot_core_types::{ActionResult, Actor, ExecutionState};
use pagepilot_llm::{invoke_structured, ChatMessage, ChatModel};

use crate::agent::actions::{ActionExecutor, NavigatorAction, NavigatorTurn};
use crate::agent::context::AgentContext;
use crate::agent::memory::{wrap_untrusted_content, MessageManager};
use crate::agent::prompts;
use crate::errors::AgentError;

/// Outcome of one navigator turn.
#[derive(Clone, Debug)]
pub struct NavigatorOutcome {
    /// The model's situation summary, or the failure message.
    pub summary: String,
    /// A `done` action was executed.
    pub done: bool,
    /// The turn counts as successful (plan advances, failure counter resets).
    pub success: bool,
    pub results: Vec<ActionResult>,
    pub executed: Vec<NavigatorAction>,
}

impl NavigatorOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            summary: message.into(),
            done: false,
            success: false,
            results: Vec::new(),
            executed: Vec::new(),
        }
    }
}

pub struct Navigator {
    model: Arc<dyn ChatModel>,
}

impl Navigator {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    /// Execute one plan step: snapshot the page, ask the model for actions,
    /// run them in order.
    ///
    /// Fatal errors (policy violations, auth failures, cancellation)
    /// propagate; everything else comes back as a failed outcome so the loop
    /// can retry against the failure budget.
    pub async fn run_step(
        &self,
        ctx: &mut AgentContext,
        memory: &mut MessageManager,
        step: &str,
        browser: &Arc<dyn BrowserContext>,
        actions: &ActionExecutor,
    ) -> Result<NavigatorOutcome, AgentError> {
        ctx.emit(Actor::Navigator, ExecutionState::StepStart, step).await;

        let snapshot = match self.page_snapshot(browser).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(error = %err, "failed to read page state");
                ctx.emit(Actor::Navigator, ExecutionState::StepFail, err.to_string())
                    .await;
                return Ok(NavigatorOutcome::failed(err.to_string()));
            }
        };

        let mut messages: Vec<ChatMessage> = memory.messages().to_vec();
        messages.push(ChatMessage::human(prompts::navigator_request(
            step,
            &wrap_untrusted_content(&snapshot),
        )));

        let turn: NavigatorTurn =
            match invoke_structured(self.model.as_ref(), &messages, "navigator_turn").await {
                Ok(turn) => turn,
                Err(err) if err.is_fatal() => return Err(AgentError::Llm(err)),
                Err(err) => {
                    warn!(error = %err, "navigator model call failed");
                    ctx.emit(Actor::Navigator, ExecutionState::StepFail, err.to_string())
                        .await;
                    return Ok(NavigatorOutcome::failed(err.to_string()));
                }
            };

        if turn.actions.is_empty() {
            let message = "navigator returned no actions";
            ctx.emit(Actor::Navigator, ExecutionState::StepFail, message).await;
            return Ok(NavigatorOutcome::failed(message));
        }

        memory.add_ai(&format!(
            "{} (actions: {})",
            turn.current_state,
            turn.actions
                .iter()
                .map(NavigatorAction::name)
                .collect::<Vec<_>>()
                .join(", ")
        ));

        let mut planned = turn.actions;
        planned.truncate(ctx.options.max_actions_per_step);

        let mut outcome = NavigatorOutcome {
            summary: turn.current_state,
            done: false,
            success: true,
            results: Vec::new(),
            executed: Vec::new(),
        };

        for (i, action) in planned.into_iter().enumerate() {
            if ctx.control.is_stopped() {
                return Err(AgentError::Cancelled);
            }
            if i > 0 && ctx.options.wait_between_actions_ms > 0 {
                sleep(Duration::from_millis(ctx.options.wait_between_actions_ms)).await;
            }

            let result = actions.execute(&action, ctx).await?;
            let succeeded = result.is_success();
            if result.is_done {
                outcome.done = true;
                if succeeded {
                    if let Some(answer) = &result.extracted_content {
                        ctx.set_final_answer(answer.clone());
                    }
                }
            }
            if result.include_in_memory {
                if let Some(content) = &result.extracted_content {
                    memory.add_state_message(content);
                }
            }
            outcome.results.push(result);
            outcome.executed.push(action);
            if !succeeded {
                outcome.success = false;
                break;
            }
            if outcome.done {
                break;
            }
        }

        ctx.action_results.extend(outcome.results.iter().cloned());
        ctx.prune_transient_results();

        if outcome.success {
            debug!(executed = outcome.executed.len(), "step completed");
            ctx.emit(Actor::Navigator, ExecutionState::StepOk, &outcome.summary)
                .await;
        } else {
            let detail = outcome
                .results
                .last()
                .and_then(|r| r.error.clone())
                .unwrap_or_else(|| outcome.summary.clone());
            ctx.emit(Actor::Navigator, ExecutionState::StepFail, detail).await;
        }

        Ok(outcome)
    }

    async fn page_snapshot(
        &self,
        browser: &Arc<dyn BrowserContext>,
    ) -> Result<String, pagepilot_browser::BrowserError> {
        let page = browser.current_page().await?;
        let state = page.state().await?;
        Ok(render_page_state(&state))
    }
}

/// Renders the page into the element listing the model navigates by.
pub fn render_page_state(state: &PageState) -> String {
    let mut out = format!("URL: {}\nTitle: {}\n", state.url, state.title);
    let mut elements: Vec<_> = state.selector_map.values().collect();
    elements.sort_by_key(|e| e.index);
    if elements.is_empty() {
        out.push_str("No interactive elements.\n");
    } else {
        out.push_str("Interactive elements:\n");
        for element in elements {
            out.push_str(&format!("[{}] {}\n", element.index, element.describe()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepilot_browser::ElementNode;
    use std::collections::HashMap;

    #[test]
    fn page_rendering_orders_by_index() {
        let mut selector_map = HashMap::new();
        for index in [3u32, 1, 2] {
            selector_map.insert(
                index,
                ElementNode {
                    index,
                    tag: "a".into(),
                    text: format!("link {index}"),
                    xpath: None,
                    is_file_uploader: false,
                },
            );
        }
        let rendered = render_page_state(&PageState {
            url: "https://example.com".into(),
            title: "Example".into(),
            selector_map,
        });
        let one = rendered.find("[1]").unwrap();
        let two = rendered.find("[2]").unwrap();
        let three = rendered.find("[3]").unwrap();
        assert!(one < two && two < three);
    }
}
