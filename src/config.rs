//! Execution configuration for the agent control loop.

use serde::{Deserialize, Serialize};

/// Knobs for one task execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Maximum loop iterations before the task fails.
    /// Default: 100
    pub max_steps: u32,

    /// Consecutive planning failures tolerated before aborting.
    /// Default: 3
    pub max_failures: u32,

    /// Run the planner every N navigator steps (it also runs whenever the
    /// navigator self-reports completion).
    /// Default: 3
    pub planning_interval: u32,

    /// Upper bound on browser actions per navigator turn.
    /// Default: 5
    pub max_actions_per_step: usize,

    /// Minimum wait between actions in one turn, in milliseconds.
    /// Default: 250
    pub wait_between_actions_ms: u64,

    /// Whether executed steps are persisted for later replay.
    /// Default: false
    pub replay_enabled: bool,

    /// Conversation memory is truncated beyond this many messages.
    /// Default: 40
    pub max_memory_messages: usize,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            max_steps: 100,
            max_failures: 3,
            planning_interval: 3,
            max_actions_per_step: 5,
            wait_between_actions_ms: 250,
            replay_enabled: false,
            max_memory_messages: 40,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight limits for tests.
    pub fn minimal() -> Self {
        Self {
            max_steps: 10,
            max_failures: 2,
            planning_interval: 1,
            max_actions_per_step: 2,
            wait_between_actions_ms: 0,
            replay_enabled: false,
            max_memory_messages: 20,
        }
    }

    pub fn max_steps(mut self, steps: u32) -> Self {
        self.max_steps = steps;
        self
    }

    pub fn max_failures(mut self, failures: u32) -> Self {
        self.max_failures = failures;
        self
    }

    pub fn planning_interval(mut self, interval: u32) -> Self {
        self.planning_interval = interval.max(1);
        self
    }

    pub fn actions_per_step(mut self, count: usize) -> Self {
        self.max_actions_per_step = count.max(1);
        self
    }

    pub fn replay(mut self, enabled: bool) -> Self {
        self.replay_enabled = enabled;
        self
    }
}

/// Knobs for replaying a persisted step history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayOptions {
    /// Attempts per replayed step (including the first).
    /// Default: 3
    pub max_retries: u32,

    /// Continue past a step that keeps failing instead of aborting.
    /// Default: true
    pub skip_failures: bool,

    /// Delay between replayed actions, in milliseconds.
    /// Default: 2000
    pub delay_between_actions_ms: u64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            skip_failures: true,
            delay_between_actions_ms: 2_000,
        }
    }
}

impl ReplayOptions {
    pub fn fast() -> Self {
        Self {
            max_retries: 2,
            skip_failures: true,
            delay_between_actions_ms: 0,
        }
    }
}
