//! PagePilot: an LLM-directed browser automation agent.
//!
//! The crate wires a planner/navigator/replanner loop around pluggable
//! browser, chat-model and storage seams. See [`agent::Executor`] for the
//! control loop and the `pagepilot-*` crates for the collaborator traits.

pub mod agent;
pub mod config;
pub mod errors;

pub use agent::{Executor, ModelBundle, SearchTools, TaskOutcome};
pub use config::{ExecutionOptions, ReplayOptions};
pub use errors::AgentError;

pub use pagepilot_browser as browser;
pub use pagepilot_core_types as core_types;
pub use pagepilot_doc_store as doc_store;
pub use pagepilot_event_bus as event_bus;
pub use pagepilot_llm as llm;
