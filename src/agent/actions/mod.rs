//! The navigator's action vocabulary.
//!
//! Each variant maps to one browser operation. The enum doubles as the JSON
//! schema handed to the navigator model, so variant and field names are part
//! of the prompt contract.

pub mod executor;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use executor::ActionExecutor;

fn default_nth() -> u32 {
    1
}

/// One browser action chosen by the navigator.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum NavigatorAction {
    /// Terminal action: the task is complete (or has conclusively failed).
    Done { text: String, success: bool },
    SearchGoogle {
        intent: Option<String>,
        query: String,
    },
    GoToUrl {
        intent: Option<String>,
        url: String,
    },
    GoBack { intent: Option<String> },
    ClickElement {
        intent: Option<String>,
        index: u32,
    },
    InputText {
        intent: Option<String>,
        index: u32,
        text: String,
    },
    SwitchTab {
        intent: Option<String>,
        tab_id: u32,
    },
    OpenTab {
        intent: Option<String>,
        url: String,
    },
    CloseTab {
        intent: Option<String>,
        tab_id: u32,
    },
    /// Stashes text the model wants to remember without touching the browser.
    CacheContent {
        intent: Option<String>,
        content: String,
    },
    ScrollToPercent {
        intent: Option<String>,
        y_percent: u8,
        index: Option<u32>,
    },
    ScrollToTop {
        intent: Option<String>,
        index: Option<u32>,
    },
    ScrollToBottom {
        intent: Option<String>,
        index: Option<u32>,
    },
    PreviousPage {
        intent: Option<String>,
        index: Option<u32>,
    },
    NextPage {
        intent: Option<String>,
        index: Option<u32>,
    },
    ScrollToText {
        intent: Option<String>,
        text: String,
        #[serde(default = "default_nth")]
        nth: u32,
    },
    SendKeys {
        intent: Option<String>,
        keys: String,
    },
    GetDropdownOptions {
        intent: Option<String>,
        index: u32,
    },
    SelectDropdownOption {
        intent: Option<String>,
        index: u32,
        text: String,
    },
}

impl NavigatorAction {
    /// Wire name, as it appears in model output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Done { .. } => "done",
            Self::SearchGoogle { .. } => "search_google",
            Self::GoToUrl { .. } => "go_to_url",
            Self::GoBack { .. } => "go_back",
            Self::ClickElement { .. } => "click_element",
            Self::InputText { .. } => "input_text",
            Self::SwitchTab { .. } => "switch_tab",
            Self::OpenTab { .. } => "open_tab",
            Self::CloseTab { .. } => "close_tab",
            Self::CacheContent { .. } => "cache_content",
            Self::ScrollToPercent { .. } => "scroll_to_percent",
            Self::ScrollToTop { .. } => "scroll_to_top",
            Self::ScrollToBottom { .. } => "scroll_to_bottom",
            Self::PreviousPage { .. } => "previous_page",
            Self::NextPage { .. } => "next_page",
            Self::ScrollToText { .. } => "scroll_to_text",
            Self::SendKeys { .. } => "send_keys",
            Self::GetDropdownOptions { .. } => "get_dropdown_options",
            Self::SelectDropdownOption { .. } => "select_dropdown_option",
        }
    }

    /// The model-supplied intent, when present.
    pub fn intent(&self) -> Option<&str> {
        match self {
            Self::Done { .. } => None,
            Self::SearchGoogle { intent, .. }
            | Self::GoToUrl { intent, .. }
            | Self::GoBack { intent }
            | Self::ClickElement { intent, .. }
            | Self::InputText { intent, .. }
            | Self::SwitchTab { intent, .. }
            | Self::OpenTab { intent, .. }
            | Self::CloseTab { intent, .. }
            | Self::CacheContent { intent, .. }
            | Self::ScrollToPercent { intent, .. }
            | Self::ScrollToTop { intent, .. }
            | Self::ScrollToBottom { intent, .. }
            | Self::PreviousPage { intent, .. }
            | Self::NextPage { intent, .. }
            | Self::ScrollToText { intent, .. }
            | Self::SendKeys { intent, .. }
            | Self::GetDropdownOptions { intent, .. }
            | Self::SelectDropdownOption { intent, .. } => intent.as_deref(),
        }
    }

    /// Fallback description when the model supplied no intent.
    pub fn default_intent(&self) -> String {
        match self {
            Self::Done { .. } => "complete the task".into(),
            Self::SearchGoogle { query, .. } => format!("search the web for \"{query}\""),
            Self::GoToUrl { url, .. } => format!("navigate to {url}"),
            Self::GoBack { .. } => "go back to the previous page".into(),
            Self::ClickElement { index, .. } => format!("click element {index}"),
            Self::InputText { index, .. } => format!("type into element {index}"),
            Self::SwitchTab { tab_id, .. } => format!("switch to tab {tab_id}"),
            Self::OpenTab { url, .. } => format!("open {url} in a new tab"),
            Self::CloseTab { tab_id, .. } => format!("close tab {tab_id}"),
            Self::CacheContent { .. } => "remember page content".into(),
            Self::ScrollToPercent { y_percent, .. } => format!("scroll to {y_percent}%"),
            Self::ScrollToTop { .. } => "scroll to the top".into(),
            Self::ScrollToBottom { .. } => "scroll to the bottom".into(),
            Self::PreviousPage { .. } => "scroll up one page".into(),
            Self::NextPage { .. } => "scroll down one page".into(),
            Self::ScrollToText { text, .. } => format!("scroll to text \"{text}\""),
            Self::SendKeys { keys, .. } => format!("send keys {keys}"),
            Self::GetDropdownOptions { index, .. } => {
                format!("list options of dropdown {index}")
            }
            Self::SelectDropdownOption { index, text, .. } => {
                format!("select \"{text}\" in dropdown {index}")
            }
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    pub fn is_search(&self) -> bool {
        matches!(self, Self::SearchGoogle { .. })
    }
}

/// One navigator model turn: a situation assessment plus chosen actions.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema)]
pub struct NavigatorTurn {
    /// The model's one-line assessment of the page and progress.
    pub current_state: String,
    pub actions: Vec<NavigatorAction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_deserialize_from_tagged_json() {
        let turn: NavigatorTurn = serde_json::from_value(serde_json::json!({
            "current_state": "on the results page",
            "actions": [
                {"action": "click_element", "intent": "open first hit", "index": 3},
                {"action": "done", "text": "found it", "success": true}
            ]
        }))
        .unwrap();
        assert_eq!(turn.actions.len(), 2);
        assert_eq!(turn.actions[0].name(), "click_element");
        assert!(turn.actions[1].is_done());
    }

    #[test]
    fn scroll_to_text_defaults_nth() {
        let action: NavigatorAction = serde_json::from_value(serde_json::json!({
            "action": "scroll_to_text", "text": "pricing"
        }))
        .unwrap();
        match action {
            NavigatorAction::ScrollToText { nth, .. } => assert_eq!(nth, 1),
            other => panic!("unexpected action {other:?}"),
        }
    }

    #[test]
    fn default_intents_are_descriptive() {
        let action = NavigatorAction::GoToUrl {
            intent: None,
            url: "https://example.com".into(),
        };
        assert!(action.default_intent().contains("example.com"));
        assert!(action.intent().is_none());
    }
}
