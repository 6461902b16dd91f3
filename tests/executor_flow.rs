//! End-to-end control loop tests against scripted models and a scripted
//! browser.

use std::sync::Arc;

use futures::FutureExt;
use serde_json::json;

use pagepilot::agent::{ScriptedFetcher, ScriptedSearchBackend, SearchResult, SearchRunner};
use pagepilot::browser::mock::MockBrowser;
use pagepilot::browser::{ElementNode, UrlPolicy};
use pagepilot::core_types::{Actor, ExecutionEvent, ExecutionState};
use pagepilot::event_bus::{subscribe_channel, EventBus, EventHandler, EventKind};
use pagepilot::llm::ScriptedChatModel;
use pagepilot::{ExecutionOptions, Executor, ModelBundle, SearchTools, TaskOutcome};

fn element(index: u32) -> ElementNode {
    ElementNode {
        index,
        tag: "button".into(),
        text: format!("button {index}"),
        xpath: None,
        is_file_uploader: false,
    }
}

fn drain(rx: &mut tokio::sync::mpsc::Receiver<ExecutionEvent>) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn happy_path_completes_with_final_answer() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["go to example.com", "finish"]}));
    model.push_value(json!({
        "current_state": "blank page, navigating",
        "actions": [{"action": "go_to_url", "url": "https://example.com"}]
    }));
    model.push_value(json!({"done": false, "next_steps": ["finish"]}));
    model.push_value(json!({
        "current_state": "page loaded, task done",
        "actions": [{"action": "done", "text": "the answer", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "the answer"}));

    let browser = Arc::new(MockBrowser::new());
    let event_bus = Arc::new(EventBus::new());
    let (handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, handler);

    let mut executor = Executor::new(
        "find the answer",
        ModelBundle::uniform(model.clone()),
        browser.clone(),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        event_bus.clone(),
    );

    let outcome = executor.execute().await;
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            final_answer: "the answer".into()
        }
    );
    assert_eq!(model.remaining(), 0);
    assert_eq!(executor.past_steps().len(), 2);

    let actions = browser.actions().await;
    assert!(actions.contains(&"navigate:https://example.com".to_string()));

    let events = drain(&mut rx);
    assert_eq!(events.first().unwrap().state, ExecutionState::TaskStart);
    assert_eq!(events.last().unwrap().state, ExecutionState::TaskOk);
    assert_eq!(events.last().unwrap().details, "the answer");
    assert!(events
        .iter()
        .any(|e| e.actor == Actor::Navigator && e.state == ExecutionState::ActOk));
}

#[tokio::test]
async fn replanner_verdict_ends_the_run_after_one_turn() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["search X", "done"]}));
    model.push_value(json!({
        "current_state": "searching",
        "actions": [{"action": "go_to_url", "url": "https://example.com/search"}]
    }));
    model.push_value(json!({"done": true, "final_answer": "answer"}));

    let event_bus = Arc::new(EventBus::new());
    let (handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, handler);

    let mut executor = Executor::new(
        "search X",
        ModelBundle::uniform(model.clone()),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        event_bus,
    );

    let outcome = executor.execute().await;
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            final_answer: "answer".into()
        }
    );
    assert_eq!(model.remaining(), 0);
    assert_eq!(executor.past_steps().len(), 1);

    let events = drain(&mut rx);
    let ok_events: Vec<_> = events
        .iter()
        .filter(|e| e.state == ExecutionState::TaskOk)
        .collect();
    assert_eq!(ok_events.len(), 1);
    assert_eq!(ok_events[0].details, "answer");
    let nav_steps = events
        .iter()
        .filter(|e| e.actor == Actor::Navigator && e.state == ExecutionState::StepStart)
        .count();
    assert_eq!(nav_steps, 1);
}

#[tokio::test]
async fn missing_final_answer_falls_back_to_the_task_id() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["look around"]}));
    model.push_value(json!({
        "current_state": "looking",
        "actions": [{"action": "go_to_url", "url": "https://example.com"}]
    }));
    model.push_value(json!({"done": true}));

    let event_bus = Arc::new(EventBus::new());
    let (handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, handler);

    let mut executor = Executor::new(
        "look around",
        ModelBundle::uniform(model),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        event_bus,
    );
    let task_id = executor.task_id().to_string();

    let outcome = executor.execute().await;
    assert_eq!(outcome, TaskOutcome::Completed { final_answer: task_id.clone() });

    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().details, task_id);
}

#[tokio::test]
async fn replanner_answer_overrides_the_navigator_draft() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["finish"]}));
    model.push_value(json!({
        "current_state": "wrapping up",
        "actions": [{"action": "done", "text": "navigator draft text", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "the verified answer"}));

    let event_bus = Arc::new(EventBus::new());
    let (handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, handler);

    let mut executor = Executor::new(
        "finish the task",
        ModelBundle::uniform(model),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        event_bus,
    );

    let outcome = executor.execute().await;
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            final_answer: "the verified answer".into()
        }
    );

    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().state, ExecutionState::TaskOk);
    assert_eq!(events.last().unwrap().details, "the verified answer");
}

#[tokio::test]
async fn plan_advances_only_on_successful_turns() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["click the button", "finish"]}));
    // First attempt clicks an element whose click is scripted to fail.
    model.push_value(json!({
        "current_state": "trying the broken button",
        "actions": [{"action": "click_element", "index": 5}]
    }));
    // Retry of the same plan step succeeds.
    model.push_value(json!({
        "current_state": "clicking the working button",
        "actions": [{"action": "click_element", "index": 1}]
    }));
    model.push_value(json!({
        "current_state": "done",
        "actions": [{"action": "done", "text": "clicked it", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "clicked it"}));

    let browser = Arc::new(
        MockBrowser::new()
            .with_elements(vec![element(1), element(5)])
            .await
            .failing_click(5)
            .await,
    );

    let options = ExecutionOptions::minimal().planning_interval(10);
    let mut executor = Executor::new(
        "click the button",
        ModelBundle::uniform(model),
        browser.clone(),
        UrlPolicy::allow_all(),
        options,
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));

    // The failed turn retried the same step instead of advancing the plan.
    assert_eq!(executor.past_steps().len(), 2);
    assert_eq!(executor.past_steps()[0].step, "click the button");

    let actions = browser.actions().await;
    let failed = actions.iter().position(|a| a == "click_failed:5").unwrap();
    let clicked = actions.iter().position(|a| a == "click:1").unwrap();
    assert!(failed < clicked);
}

#[tokio::test]
async fn transient_planner_errors_exhaust_failure_budget() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_error(pagepilot::llm::LlmError::Provider("overloaded".into()));
    model.push_error(pagepilot::llm::LlmError::Provider("overloaded".into()));

    let mut executor = Executor::new(
        "anything",
        ModelBundle::uniform(model),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(), // max_failures = 2
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    match outcome {
        TaskOutcome::Failed { reason } => assert!(reason.contains("consecutive")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn post_completion_replan_errors_count_toward_the_failure_budget() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["finish"]}));
    model.push_value(json!({
        "current_state": "done",
        "actions": [{"action": "done", "text": "claimed done", "success": true}]
    }));
    model.push_error(pagepilot::llm::LlmError::Provider("overloaded".into()));
    model.push_error(pagepilot::llm::LlmError::Provider("overloaded".into()));

    let mut executor = Executor::new(
        "anything",
        ModelBundle::uniform(model.clone()),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(), // max_failures = 2
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    match outcome {
        TaskOutcome::Failed { reason } => assert!(reason.contains("consecutive")),
        other => panic!("unexpected outcome {other:?}"),
    }
    // Plan, navigator turn, then exactly two failed replan attempts.
    assert_eq!(model.calls().len(), 4);
    assert_eq!(model.remaining(), 0);
}

#[tokio::test]
async fn fatal_model_error_aborts_immediately() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_error(pagepilot::llm::LlmError::Auth("bad key".into()));
    // A second response that must never be consumed.
    model.push_value(json!({"steps": ["unreachable"]}));

    let mut executor = Executor::new(
        "anything",
        ModelBundle::uniform(model.clone()),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    match outcome {
        TaskOutcome::Failed { reason } => assert!(reason.contains("authentication")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(model.calls().len(), 1);
}

#[tokio::test]
async fn stop_request_cancels_the_task() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["click something"]}));
    model.push_value(json!({
        "current_state": "about to click",
        "actions": [{"action": "click_element", "index": 1}]
    }));

    let browser = Arc::new(MockBrowser::new().with_elements(vec![element(1)]).await);
    let event_bus = Arc::new(EventBus::new());
    let (channel_handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, channel_handler);

    let mut executor = Executor::new(
        "click something",
        ModelBundle::uniform(model),
        browser.clone(),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        event_bus.clone(),
    );

    // Stop as soon as the navigator starts its first step.
    let control = executor.control();
    let stopper = EventHandler::new(move |event| {
        let control = control.clone();
        async move {
            if event.actor == Actor::Navigator && event.state == ExecutionState::StepStart {
                control.stop();
            }
            Ok(())
        }
        .boxed()
    });
    event_bus.subscribe(EventKind::Execution, stopper);

    let outcome = executor.execute().await;
    assert_eq!(outcome, TaskOutcome::Cancelled);

    // No action ran after the stop request.
    assert!(browser.actions().await.is_empty());
    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().state, ExecutionState::TaskCancel);
}

#[tokio::test]
async fn pause_request_suspends_then_resumes_the_task() {
    use std::sync::atomic::{AtomicBool, Ordering};

    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["look around", "finish"]}));
    model.push_value(json!({
        "current_state": "looking",
        "actions": [{"action": "click_element", "index": 1}]
    }));

    let browser = Arc::new(MockBrowser::new().with_elements(vec![element(1)]).await);
    let event_bus = Arc::new(EventBus::new());
    let (channel_handler, mut rx) = subscribe_channel(&event_bus, EventKind::Execution, 128);
    event_bus.subscribe(EventKind::Execution, channel_handler);

    let mut executor = Executor::new(
        "look around then finish",
        ModelBundle::uniform(model.clone()),
        browser,
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal().planning_interval(10),
        event_bus.clone(),
    );

    // Pause when the navigator starts its first step; the step itself still
    // completes before the loop observes the flag.
    let control = executor.control();
    let paused = Arc::new(AtomicBool::new(false));
    let pauser = EventHandler::new(move |event| {
        let control = control.clone();
        let paused = paused.clone();
        async move {
            if event.actor == Actor::Navigator
                && event.state == ExecutionState::StepStart
                && !paused.swap(true, Ordering::SeqCst)
            {
                control.pause();
            }
            Ok(())
        }
        .boxed()
    });
    event_bus.subscribe(EventKind::Execution, pauser);

    let outcome = executor.execute().await;
    assert_eq!(outcome, TaskOutcome::Paused);
    assert_eq!(model.remaining(), 0);
    let events = drain(&mut rx);
    assert_eq!(events.last().unwrap().state, ExecutionState::TaskPause);

    // Resume and run the remaining plan step to completion.
    model.push_value(json!({
        "current_state": "finishing",
        "actions": [{"action": "done", "text": "resumed answer", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "resumed answer"}));
    executor.control().resume();

    let outcome = executor.execute().await;
    assert_eq!(
        outcome,
        TaskOutcome::Completed {
            final_answer: "resumed answer".into()
        }
    );
}

#[tokio::test]
async fn step_budget_exhaustion_fails_the_task() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["a", "b", "c"]}));
    for _ in 0..2 {
        model.push_value(json!({
            "current_state": "still going",
            "actions": [{"action": "click_element", "index": 1}]
        }));
    }

    let browser = Arc::new(MockBrowser::new().with_elements(vec![element(1)]).await);
    let options = ExecutionOptions::minimal().max_steps(2).planning_interval(10);
    let mut executor = Executor::new(
        "never finishes",
        ModelBundle::uniform(model),
        browser,
        UrlPolicy::allow_all(),
        options,
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    match outcome {
        TaskOutcome::Failed { reason } => assert!(reason.contains("maximum step count")),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn navigation_outside_the_allowlist_is_fatal() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["go somewhere forbidden"]}));
    model.push_value(json!({
        "current_state": "navigating",
        "actions": [{"action": "go_to_url", "url": "https://evil.test/payload"}]
    }));

    let browser = Arc::new(MockBrowser::new());
    let policy = UrlPolicy::allow_all().with_allowed(["example.com"]);
    let mut executor = Executor::new(
        "go somewhere forbidden",
        ModelBundle::uniform(model),
        browser.clone(),
        policy,
        ExecutionOptions::minimal(),
        Arc::new(EventBus::new()),
    );

    let outcome = executor.execute().await;
    match outcome {
        TaskOutcome::Failed { reason } => assert!(reason.contains("allowlist")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(browser.actions().await.is_empty());
}

#[tokio::test]
async fn search_results_are_ranked_and_summarized() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["search for rust news", "finish"]}));
    model.push_value(json!({
        "current_state": "searching",
        "actions": [{"action": "search_google", "query": "rust news"}]
    }));
    model.push_value(json!({"done": false, "next_steps": ["finish"]}));
    model.push_value(json!({
        "current_state": "finishing",
        "actions": [{"action": "done", "text": "rust 1.80 released", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "rust 1.80 released"}));

    let searcher = Arc::new(ScriptedChatModel::new());
    searcher.push_value(json!({"query": "rust latest stable release"}));
    let ranker = Arc::new(ScriptedChatModel::new());
    ranker.push_value(json!({"entries": [{"index": 0, "score": 9.0}]}));
    let summarizer = Arc::new(ScriptedChatModel::new());
    summarizer.push_value(json!({"entries": [
        {"url": "https://news.test/rust", "summary": "rust 1.80 released"}
    ]}));

    let runner = SearchRunner::new(
        searcher.clone(),
        ranker.clone(),
        summarizer.clone(),
        Arc::new(ScriptedFetcher::new().with_page("https://news.test/rust", "rust 1.80 is out")),
    );
    let backend = ScriptedSearchBackend::new(vec![SearchResult {
        title: "Rust news".into(),
        url: "https://news.test/rust".into(),
        content: "latest rust".into(),
        publisher: "news.test".into(),
        score: 0.0,
        raw_content: None,
    }]);

    let mut executor = Executor::new(
        "what is the latest rust release",
        ModelBundle::uniform(model),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        Arc::new(EventBus::new()),
    )
    .with_search(SearchTools::new(Arc::new(backend), runner));

    let outcome = executor.execute().await;
    assert!(matches!(outcome, TaskOutcome::Completed { .. }));
    assert_eq!(searcher.calls().len(), 1);
    assert_eq!(ranker.calls().len(), 1);
    assert_eq!(summarizer.calls().len(), 1);
}

#[tokio::test]
async fn follow_up_task_replans_on_the_same_session() {
    let model = Arc::new(ScriptedChatModel::new());
    model.push_value(json!({"steps": ["finish"]}));
    model.push_value(json!({
        "current_state": "done",
        "actions": [{"action": "done", "text": "first answer", "success": true}]
    }));
    model.push_value(json!({"done": true, "final_answer": "first answer"}));

    let mut executor = Executor::new(
        "first task",
        ModelBundle::uniform(model.clone()),
        Arc::new(MockBrowser::new()),
        UrlPolicy::allow_all(),
        ExecutionOptions::minimal(),
        Arc::new(EventBus::new()),
    );
    let first = executor.execute().await;
    assert!(matches!(first, TaskOutcome::Completed { .. }));

    // The follow-up goes straight to the replanner, which ends it at once.
    model.push_value(json!({"done": true, "final_answer": "second answer"}));
    executor.add_follow_up_task("second task");
    let second = executor.execute().await;
    assert_eq!(
        second,
        TaskOutcome::Completed {
            final_answer: "second answer".into()
        }
    );
}
