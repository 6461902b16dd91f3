//! Control-loop level errors.
//!
//! The loop distinguishes fatal errors, which abort the task, from transient
//! planning errors, which are counted against the failure budget, and from
//! per-action failures, which are reported inside `ActionResult` and never
//! surface here.

use pagepilot_browser::BrowserError;
use pagepilot_llm::LlmError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("maximum step count reached")]
    MaxStepsReached,

    #[error("too many consecutive planning failures")]
    MaxFailuresReached,

    #[error("task cancelled")]
    Cancelled,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Browser(#[from] BrowserError),

    #[error("history error: {0}")]
    History(String),

    #[error("{0}")]
    Other(String),
}

impl AgentError {
    /// Fatal errors abort the loop immediately instead of being retried.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::MaxStepsReached | Self::MaxFailuresReached | Self::Cancelled => true,
            Self::Llm(e) => e.is_fatal(),
            Self::Browser(e) => e.is_fatal(),
            Self::History(_) | Self::Other(_) => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled) || matches!(self, Self::Llm(e) if e.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatality_classification() {
        assert!(AgentError::MaxStepsReached.is_fatal());
        assert!(AgentError::Cancelled.is_fatal());
        assert!(!AgentError::Other("hiccup".into()).is_fatal());
        assert!(AgentError::Llm(LlmError::Auth("bad key".into())).is_fatal());
        assert!(!AgentError::Llm(LlmError::Provider("overloaded".into())).is_fatal());
        assert!(AgentError::Browser(BrowserError::UrlNotAllowed("http://x".into())).is_fatal());
    }

    #[test]
    fn cancellation_detection() {
        assert!(AgentError::Cancelled.is_cancelled());
        assert!(AgentError::Llm(LlmError::Cancelled("user".into())).is_cancelled());
        assert!(!AgentError::MaxStepsReached.is_cancelled());
    }
}
