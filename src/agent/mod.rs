//! The agent core: control loop, planning, navigation and memory.

pub mod actions;
pub mod context;
pub mod executor;
pub mod history;
pub mod memory;
pub mod navigator;
pub mod planner;
pub mod prompts;
pub mod search;

pub use actions::{ActionExecutor, NavigatorAction, NavigatorTurn};
pub use context::{AgentContext, ControlHandle};
pub use executor::{Executor, ModelBundle, SearchTools, TaskOutcome};
pub use history::{AgentStepHistory, FileHistoryStore, HistoryItem, HistoryStore, InMemoryHistoryStore};
pub use memory::MessageManager;
pub use navigator::{Navigator, NavigatorOutcome};
pub use planner::{PastStep, Planner, PlannerOutput, ReplanOutput, Replanner};
pub use search::{
    ContentFetcher, HttpFetcher, ScriptedFetcher, ScriptedSearchBackend, SearchBackend,
    SearchResponse, SearchResult, SearchRunner,
};
