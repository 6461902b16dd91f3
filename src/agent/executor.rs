//! The task executor: the control loop tying planner, navigator and browser
//! together.
//!
//! One executor owns one task session. The loop alternates planning passes
//! with navigator steps: the planner drafts an ordered step list, the
//! navigator executes the front step as browser actions, and the replanner
//! reviews progress every `planning_interval` steps or whenever the navigator
//! declares itself done. Transient planning failures are counted against
//! `max_failures`; fatal errors and cancellation abort immediately.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use pagepilot_browser::{BrowserContext, UrlPolicy};
use pagepilot_core_types::{ActionResult, Actor, ExecutionState, TaskId};
use pagepilot_event_bus::EventBus;
use pagepilot_llm::ChatModel;

use crate::agent::actions::{ActionExecutor, NavigatorAction};
use crate::agent::context::{AgentContext, ControlHandle};
use crate::agent::history::{AgentStepHistory, HistoryItem, HistoryStore};
use crate::agent::memory::MessageManager;
use crate::agent::navigator::Navigator;
use crate::agent::planner::{PastStep, Planner, Replanner};
use crate::agent::prompts;
use crate::agent::search::{SearchBackend, SearchRunner};
use crate::config::{ExecutionOptions, ReplayOptions};
use crate::errors::AgentError;

/// The chat models backing each agent role.
#[derive(Clone)]
pub struct ModelBundle {
    pub navigator: Arc<dyn ChatModel>,
    pub planner: Arc<dyn ChatModel>,
    pub replanner: Arc<dyn ChatModel>,
    pub searcher: Arc<dyn ChatModel>,
    pub ranker: Arc<dyn ChatModel>,
    pub summarizer: Arc<dyn ChatModel>,
}

impl ModelBundle {
    /// Bundle from a navigator and a planner model; auxiliary roles default
    /// to one of the two (ranking runs on the navigator model, the rest on
    /// the planner).
    pub fn new(navigator: Arc<dyn ChatModel>, planner: Arc<dyn ChatModel>) -> Self {
        Self {
            navigator: navigator.clone(),
            replanner: planner.clone(),
            searcher: planner.clone(),
            ranker: navigator,
            summarizer: planner.clone(),
            planner,
        }
    }

    /// Every role backed by the same model.
    pub fn uniform(model: Arc<dyn ChatModel>) -> Self {
        Self::new(model.clone(), model)
    }
}

/// Search backend plus the model-driven ranking/summarization pipeline.
pub struct SearchTools {
    pub backend: Arc<dyn SearchBackend>,
    pub runner: SearchRunner,
}

impl SearchTools {
    pub fn new(backend: Arc<dyn SearchBackend>, runner: SearchRunner) -> Self {
        Self { backend, runner }
    }
}

/// How one `execute` call ended.
#[derive(Clone, Debug, PartialEq)]
pub enum TaskOutcome {
    Completed { final_answer: String },
    Failed { reason: String },
    Cancelled,
    Paused,
}

enum LoopEnd {
    Done(String),
    Paused,
}

enum PlanVerdict {
    Continue,
    Done(String),
}

/// One task session.
pub struct Executor {
    ctx: AgentContext,
    memory: MessageManager,
    planner: Planner,
    replanner: Replanner,
    navigator: Navigator,
    browser: Arc<dyn BrowserContext>,
    actions: ActionExecutor,
    search: Option<SearchTools>,
    history_store: Option<Arc<dyn HistoryStore>>,
    tasks: Vec<String>,
    plan: VecDeque<String>,
    past_steps: Vec<PastStep>,
    history: AgentStepHistory,
    planned_once: bool,
    steps_since_plan: u32,
}

impl Executor {
    pub fn new(
        task: impl Into<String>,
        models: ModelBundle,
        browser: Arc<dyn BrowserContext>,
        policy: UrlPolicy,
        options: ExecutionOptions,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let control = ControlHandle::new();
        Self {
            ctx: AgentContext::new(TaskId::new(), options, event_bus, control),
            memory: MessageManager::new(),
            planner: Planner::new(models.planner),
            replanner: Replanner::new(models.replanner),
            navigator: Navigator::new(models.navigator),
            actions: ActionExecutor::new(browser.clone(), policy),
            browser,
            search: None,
            history_store: None,
            tasks: vec![task.into()],
            plan: VecDeque::new(),
            past_steps: Vec::new(),
            history: AgentStepHistory::default(),
            planned_once: false,
            steps_since_plan: 0,
        }
    }

    pub fn with_search(mut self, tools: SearchTools) -> Self {
        self.search = Some(tools);
        self
    }

    pub fn with_history_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
        self.history_store = Some(store);
        self
    }

    pub fn task_id(&self) -> &TaskId {
        &self.ctx.task_id
    }

    /// Handle for pausing, resuming or stopping this session from outside.
    pub fn control(&self) -> ControlHandle {
        self.ctx.control.clone()
    }

    pub fn past_steps(&self) -> &[PastStep] {
        &self.past_steps
    }

    pub fn remaining_plan(&self) -> usize {
        self.plan.len()
    }

    fn objective(&self) -> String {
        self.tasks.last().cloned().unwrap_or_default()
    }

    /// Queue a follow-up task on the same session. The conversation is kept;
    /// the next `execute` call replans from scratch.
    pub fn add_follow_up_task(&mut self, task: impl Into<String>) {
        let task = task.into();
        self.memory.add_new_task(&task);
        self.tasks.push(task);
        self.plan.clear();
        self.past_steps.clear();
        self.ctx.prune_transient_results();
        self.ctx.consecutive_failures = 0;
        self.ctx.clear_final_answer();
    }

    /// Run the task to a terminal outcome.
    pub async fn execute(&mut self) -> TaskOutcome {
        if self.memory.is_empty() {
            self.memory
                .init_task_messages(prompts::NAVIGATOR_SYSTEM_PROMPT, &self.objective());
        }
        info!(task_id = %self.ctx.task_id, task = %self.objective(), "task starting");
        self.ctx
            .emit(Actor::System, ExecutionState::TaskStart, self.objective())
            .await;

        let outcome = match self.run_loop().await {
            Ok(LoopEnd::Done(answer)) => {
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskOk, &answer)
                    .await;
                TaskOutcome::Completed { final_answer: answer }
            }
            Ok(LoopEnd::Paused) => {
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskPause, "task paused")
                    .await;
                TaskOutcome::Paused
            }
            Err(err) if err.is_cancelled() => {
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskCancel, "task cancelled")
                    .await;
                TaskOutcome::Cancelled
            }
            Err(err) => {
                let reason = err.to_string();
                error!(task_id = %self.ctx.task_id, error = %reason, "task failed");
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskFail, &reason)
                    .await;
                TaskOutcome::Failed { reason }
            }
        };

        if self.ctx.options.replay_enabled {
            self.persist_history().await;
        }
        outcome
    }

    async fn run_loop(&mut self) -> Result<LoopEnd, AgentError> {
        let mut replan_requested = false;

        while self.ctx.n_steps < self.ctx.options.max_steps {
            if self.ctx.control.is_stopped() {
                return Err(AgentError::Cancelled);
            }
            if self.ctx.control.is_paused() {
                return Ok(LoopEnd::Paused);
            }

            let needs_plan = self.plan.is_empty()
                || replan_requested
                || self.steps_since_plan >= self.ctx.options.planning_interval;
            if needs_plan {
                match self.run_planning().await {
                    Ok(PlanVerdict::Done(answer)) => return Ok(LoopEnd::Done(answer)),
                    Ok(PlanVerdict::Continue) => {
                        replan_requested = false;
                        self.steps_since_plan = 0;
                        self.ctx.consecutive_failures = 0;
                    }
                    Err(err) if err.is_fatal() => return Err(err),
                    Err(err) => {
                        self.ctx.consecutive_failures += 1;
                        warn!(
                            error = %err,
                            failures = self.ctx.consecutive_failures,
                            "planning failed"
                        );
                        if self.ctx.consecutive_failures >= self.ctx.options.max_failures {
                            return Err(AgentError::MaxFailuresReached);
                        }
                        continue;
                    }
                }
            }

            let Some(step) = self.plan.front().cloned() else {
                replan_requested = true;
                continue;
            };

            self.ctx.n_steps += 1;
            self.steps_since_plan += 1;

            let outcome = self
                .navigator
                .run_step(&mut self.ctx, &mut self.memory, &step, &self.browser, &self.actions)
                .await?;

            if !outcome.executed.is_empty() {
                self.history.push(HistoryItem {
                    step: step.clone(),
                    actions: outcome.executed.clone(),
                    results: outcome.results.clone(),
                });
            }

            if outcome.success {
                self.ctx.consecutive_failures = 0;
                self.plan.pop_front();
                let result = outcome
                    .results
                    .iter()
                    .rev()
                    .find_map(|r| r.extracted_content.clone())
                    .unwrap_or_else(|| outcome.summary.clone());
                self.past_steps.push(PastStep { step, result });
                self.enrich_search_results(&outcome.executed).await;
            } else {
                self.ctx.consecutive_failures += 1;
                if self.ctx.consecutive_failures >= self.ctx.options.max_failures {
                    return Err(AgentError::MaxFailuresReached);
                }
            }

            if outcome.done {
                // Navigator completion is a claim, not a verdict; force a
                // replanner pass to confirm before finishing.
                replan_requested = true;
                if outcome.success && self.planned_once {
                    match self.run_planning().await {
                        Ok(PlanVerdict::Done(answer)) => return Ok(LoopEnd::Done(answer)),
                        Ok(PlanVerdict::Continue) => {
                            replan_requested = false;
                            self.steps_since_plan = 0;
                            self.ctx.consecutive_failures = 0;
                        }
                        Err(err) if err.is_fatal() => return Err(err),
                        Err(err) => {
                            self.ctx.consecutive_failures += 1;
                            warn!(
                                error = %err,
                                failures = self.ctx.consecutive_failures,
                                "post-completion replan failed"
                            );
                            if self.ctx.consecutive_failures >= self.ctx.options.max_failures {
                                return Err(AgentError::MaxFailuresReached);
                            }
                        }
                    }
                }
            }

            self.memory.truncate_to(self.ctx.options.max_memory_messages);
        }

        Err(AgentError::MaxStepsReached)
    }

    async fn run_planning(&mut self) -> Result<PlanVerdict, AgentError> {
        let objective = self.objective();
        self.ctx
            .emit(Actor::Planner, ExecutionState::StepStart, "planning")
            .await;

        let verdict = if !self.planned_once {
            let plan = match self.planner.plan(&objective).await {
                Ok(plan) => plan,
                Err(err) => {
                    self.ctx
                        .emit(Actor::Planner, ExecutionState::StepFail, err.to_string())
                        .await;
                    return Err(AgentError::Llm(err));
                }
            };
            self.plan = plan.steps.into();
            self.planned_once = true;
            PlanVerdict::Continue
        } else {
            let current: Vec<String> = self.plan.iter().cloned().collect();
            let verdict = match self
                .replanner
                .replan(&objective, &current, &self.past_steps)
                .await
            {
                Ok(verdict) => verdict,
                Err(err) => {
                    self.ctx
                        .emit(Actor::Planner, ExecutionState::StepFail, err.to_string())
                        .await;
                    return Err(AgentError::Llm(err));
                }
            };
            if verdict.done {
                let answer = verdict
                    .final_answer
                    .or_else(|| self.ctx.final_answer().map(str::to_owned))
                    .unwrap_or_else(|| self.ctx.task_id.to_string());
                self.ctx
                    .emit(Actor::Planner, ExecutionState::StepOk, "objective met")
                    .await;
                return Ok(PlanVerdict::Done(answer));
            }
            self.plan = verdict.next_steps.into();
            PlanVerdict::Continue
        };

        let plan_text = self
            .plan
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n");
        self.memory.add_plan(&plan_text, self.memory.len());
        debug!(steps = self.plan.len(), "plan updated");
        self.ctx
            .emit(
                Actor::Planner,
                ExecutionState::StepOk,
                format!("plan has {} step(s)", self.plan.len()),
            )
            .await;
        Ok(verdict)
    }

    /// Runs the search pipeline after a web-search action. Best effort: a
    /// failure here degrades context but never fails the step.
    async fn enrich_search_results(&mut self, executed: &[NavigatorAction]) {
        let Some(tools) = &self.search else {
            return;
        };
        let Some(query) = executed.iter().find_map(|a| match a {
            NavigatorAction::SearchGoogle { query, .. } => Some(query.clone()),
            _ => None,
        }) else {
            return;
        };

        let objective = self.objective();

        // Pages ingested by earlier searches in this session, surfaced before
        // the new fetch overwrites their recency.
        let prior = match tools.runner.retrieve_context(&query, 3).await {
            Ok(prior) => prior,
            Err(err) => {
                warn!(query = %query, error = %err, "context retrieval failed");
                Vec::new()
            }
        };

        let response = match tools.runner.run(tools.backend.as_ref(), &objective, &query).await {
            Ok(response) => response,
            Err(err) => {
                warn!(query = %query, error = %err, "search pipeline failed");
                return;
            }
        };
        if response.results.is_empty() && response.answer.is_none() && prior.is_empty() {
            return;
        }

        let mut digest = format!("Search digest for \"{}\":\n", response.query);
        for result in &response.results {
            digest.push_str(&format!("- {} ({}): {}\n", result.title, result.url, result.content));
        }
        if let Some(answer) = &response.answer {
            digest.push_str(&format!("Answer: {answer}\n"));
        }
        for (doc, _) in &prior {
            digest.push_str(&format!("Earlier finding: {}\n", doc.page_content));
        }
        self.memory.add_state_message(&digest);
        self.ctx.action_results.push(ActionResult::content(digest));
    }

    async fn persist_history(&self) {
        let Some(store) = &self.history_store else {
            return;
        };
        if self.history.is_empty() {
            return;
        }
        if let Err(err) = store
            .store(&self.ctx.task_id, &self.objective(), &self.history)
            .await
        {
            error!(task_id = %self.ctx.task_id, error = %err, "failed to persist history");
        }
    }

    /// Re-run a previously persisted task trace without consulting any model.
    pub async fn replay_history(
        &mut self,
        task_id: &TaskId,
        options: ReplayOptions,
    ) -> Result<TaskOutcome, AgentError> {
        let store = self
            .history_store
            .as_ref()
            .ok_or_else(|| AgentError::History("no history store configured".into()))?;
        let record = store
            .load(task_id)
            .await?
            .ok_or_else(|| AgentError::History(format!("no history for task {task_id}")))?;

        info!(task_id = %task_id, steps = record.history.items.len(), "replay starting");
        self.ctx
            .emit(
                Actor::System,
                ExecutionState::TaskStart,
                format!("replay:{}", record.task),
            )
            .await;

        for (index, item) in record.history.items.iter().enumerate() {
            if self.ctx.control.is_stopped() {
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskCancel, "replay:cancelled")
                    .await;
                return Ok(TaskOutcome::Cancelled);
            }

            self.ctx.n_steps = (index + 1) as u32;
            self.ctx
                .emit(
                    Actor::System,
                    ExecutionState::StepStart,
                    format!("replay:{}", item.step),
                )
                .await;

            let mut attempt = 0;
            let succeeded = loop {
                attempt += 1;
                match self.replay_step(item, &options).await {
                    Ok(true) => break true,
                    Ok(false) if attempt >= options.max_retries => break false,
                    Ok(false) => {
                        warn!(step = %item.step, attempt, "replay step failed, retrying");
                        sleep(Duration::from_millis(options.delay_between_actions_ms)).await;
                    }
                    Err(err) if err.is_cancelled() => {
                        self.ctx
                            .emit(Actor::System, ExecutionState::TaskCancel, "replay:cancelled")
                            .await;
                        return Ok(TaskOutcome::Cancelled);
                    }
                    Err(err) => return Err(err),
                }
            };

            if succeeded {
                self.ctx
                    .emit(
                        Actor::System,
                        ExecutionState::StepOk,
                        format!("replay:{}", item.step),
                    )
                    .await;
            } else if options.skip_failures {
                self.ctx
                    .emit(
                        Actor::System,
                        ExecutionState::StepFail,
                        format!("replay:skipped step: {}", item.step),
                    )
                    .await;
            } else {
                let reason = format!("replay failed at step: {}", item.step);
                self.ctx
                    .emit(Actor::System, ExecutionState::TaskFail, &reason)
                    .await;
                return Ok(TaskOutcome::Failed { reason });
            }
        }

        self.ctx
            .emit(Actor::System, ExecutionState::TaskOk, "replay:complete")
            .await;
        Ok(TaskOutcome::Completed {
            final_answer: "replay complete".to_string(),
        })
    }

    /// One replayed turn; true when every action succeeded.
    async fn replay_step(
        &mut self,
        item: &HistoryItem,
        options: &ReplayOptions,
    ) -> Result<bool, AgentError> {
        for (i, action) in item.actions.iter().enumerate() {
            if self.ctx.control.is_stopped() {
                return Err(AgentError::Cancelled);
            }
            if i > 0 && options.delay_between_actions_ms > 0 {
                sleep(Duration::from_millis(options.delay_between_actions_ms)).await;
            }
            let result = self.actions.execute(action, &self.ctx).await?;
            if !result.is_success() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
