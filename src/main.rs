//! PagePilot command line interface.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use pagepilot::agent::FileHistoryStore;
use pagepilot::browser::mock::MockBrowser;
use pagepilot::core_types::TaskId;
use pagepilot::event_bus::{subscribe_channel, EventBus, EventKind};
use pagepilot::llm::{ChatModel, OpenAiChatModel, OpenAiConfig, ScriptedChatModel};
use pagepilot::{Executor, ExecutionOptions, ModelBundle, ReplayOptions, TaskOutcome};

#[derive(Parser)]
#[command(name = "pagepilot", version, about = "LLM-directed browser automation agent")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a browsing task.
    Run {
        /// The task objective, in natural language.
        task: String,

        /// Chat model identifier.
        #[arg(long, default_value = "gpt-4o-mini")]
        model: String,

        /// OpenAI-compatible API base URL.
        #[arg(long)]
        base_url: Option<String>,

        /// Maximum navigator steps.
        #[arg(long, default_value_t = 100)]
        max_steps: u32,

        /// Replan every N steps.
        #[arg(long, default_value_t = 3)]
        planning_interval: u32,

        /// Restrict navigation to these hosts (repeatable).
        #[arg(long = "allow")]
        allowed_hosts: Vec<String>,

        /// Refuse navigation to these hosts (repeatable).
        #[arg(long = "deny")]
        denied_hosts: Vec<String>,

        /// Persist the action trace for later replay.
        #[arg(long)]
        record: bool,

        /// Directory for persisted histories.
        #[arg(long, default_value = ".pagepilot/history")]
        history_dir: String,

        /// Run without a model API: back every role with the scripted chat
        /// model instead of OpenAI.
        #[arg(long)]
        offline: bool,
    },

    /// Replay a recorded task trace without calling any model.
    Replay {
        /// Task id of the recorded run.
        task_id: String,

        /// Directory holding persisted histories.
        #[arg(long, default_value = ".pagepilot/history")]
        history_dir: String,

        /// Attempts per step.
        #[arg(long, default_value_t = 3)]
        max_retries: u32,

        /// Abort on the first step that keeps failing.
        #[arg(long)]
        strict: bool,

        /// Delay between replayed actions, in milliseconds.
        #[arg(long, default_value_t = 2000)]
        delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            task,
            model,
            base_url,
            max_steps,
            planning_interval,
            allowed_hosts,
            denied_hosts,
            record,
            history_dir,
            offline,
        } => {
            let chat_model: Arc<dyn ChatModel> = if offline {
                Arc::new(ScriptedChatModel::new())
            } else {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .context("OPENAI_API_KEY is not set; export it or pass --offline")?;
                let mut config = OpenAiConfig::new(api_key, model);
                if let Some(base_url) = base_url {
                    config = config.with_base_url(base_url);
                }
                Arc::new(OpenAiChatModel::new(config)?)
            };

            let browser = Arc::new(MockBrowser::new());
            let policy = pagepilot::browser::UrlPolicy::allow_all()
                .with_allowed(allowed_hosts)
                .with_denied(denied_hosts);
            let options = ExecutionOptions::new()
                .max_steps(max_steps)
                .planning_interval(planning_interval)
                .replay(record);

            let event_bus = Arc::new(EventBus::new());
            let (handler, mut events) = subscribe_channel(&event_bus, EventKind::Execution, 64);
            event_bus.subscribe(EventKind::Execution, handler);
            let printer = tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    println!(
                        "[{:?}/{:?}] step {}/{}: {}",
                        event.actor, event.state, event.step, event.max_steps, event.details
                    );
                }
            });

            let mut executor = Executor::new(task, ModelBundle::uniform(chat_model), browser, policy, options, event_bus.clone())
                .with_history_store(Arc::new(FileHistoryStore::new(&history_dir)));

            info!(task_id = %executor.task_id(), "session created");
            let outcome = executor.execute().await;
            event_bus.clear(EventKind::Execution);
            drop(executor);
            let _ = printer.await;

            report_outcome(outcome)
        }

        Command::Replay {
            task_id,
            history_dir,
            max_retries,
            strict,
            delay_ms,
        } => {
            let event_bus = Arc::new(EventBus::new());
            let browser = Arc::new(MockBrowser::new());
            let mut executor = Executor::new(
                "replay",
                ModelBundle::uniform(Arc::new(ScriptedChatModel::new())),
                browser,
                pagepilot::browser::UrlPolicy::allow_all(),
                ExecutionOptions::default(),
                event_bus,
            )
            .with_history_store(Arc::new(FileHistoryStore::new(&history_dir)));

            let options = ReplayOptions {
                max_retries,
                skip_failures: !strict,
                delay_between_actions_ms: delay_ms,
            };
            let outcome = executor
                .replay_history(&TaskId(task_id), options)
                .await?;
            report_outcome(outcome)
        }
    }
}

fn report_outcome(outcome: TaskOutcome) -> Result<()> {
    match outcome {
        TaskOutcome::Completed { final_answer } => {
            println!("{final_answer}");
            Ok(())
        }
        TaskOutcome::Failed { reason } => bail!("task failed: {reason}"),
        TaskOutcome::Cancelled => bail!("task cancelled"),
        TaskOutcome::Paused => bail!("task paused before completion"),
    }
}
