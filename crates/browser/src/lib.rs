//! Browser collaborator traits for the PagePilot agent.
//!
//! Real browser control (CDP, WebDriver, an extension runtime) lives behind
//! the [`BrowserContext`] and [`Page`] traits; the agent core only ever talks
//! to these seams. The bundled [`mock`] module provides a scripted
//! implementation for tests and offline runs.

pub mod mock;
pub mod policy;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use policy::UrlPolicy;

pub type TabId = u32;

/// Errors surfaced by browser operations.
///
/// Only `UrlNotAllowed` is fatal to a task; everything else is recoverable at
/// the action layer and is reported back to the LLM as context.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("URL not allowed by policy: {0}")]
    UrlNotAllowed(String),

    #[error("element with index {0} does not exist")]
    ElementNotFound(u32),

    #[error("tab {0} does not exist")]
    TabNotFound(TabId),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("browser operation timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl BrowserError {
    /// Policy violations terminate the task; everything else becomes a
    /// recoverable `ActionResult::error`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::UrlNotAllowed(_))
    }
}

/// One interactive element in the page's indexed selector map.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ElementNode {
    pub index: u32,
    pub tag: String,
    pub text: String,
    pub xpath: Option<String>,
    pub is_file_uploader: bool,
}

impl ElementNode {
    /// Short human-readable description used in action result messages.
    pub fn describe(&self) -> String {
        let text = self.text.trim();
        if text.is_empty() {
            format!("<{}>", self.tag)
        } else if text.chars().count() > 80 {
            let head: String = text.chars().take(80).collect();
            format!("<{}> {}…", self.tag, head)
        } else {
            format!("<{}> {}", self.tag, text)
        }
    }
}

/// Snapshot of the current page as the agent sees it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PageState {
    pub url: String,
    pub title: String,
    /// Interactive elements keyed by their LLM-visible index.
    pub selector_map: HashMap<u32, ElementNode>,
}

impl PageState {
    pub fn element(&self, index: u32) -> Option<&ElementNode> {
        self.selector_map.get(&index)
    }
}

/// Vertical scroll position of the page or one element.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct ScrollInfo {
    pub scroll_top: u64,
    pub viewport_height: u64,
    pub scroll_height: u64,
}

impl ScrollInfo {
    pub fn at_top(&self) -> bool {
        self.scroll_top == 0
    }

    pub fn at_bottom(&self) -> bool {
        self.scroll_top + self.viewport_height >= self.scroll_height
    }
}

/// One entry of a native `<select>` dropdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DropdownOption {
    pub index: u32,
    pub text: String,
}

/// A single browser page. State reads return the indexed element snapshot;
/// mutating calls may fail with recoverable timing/element errors.
#[async_trait]
pub trait Page: Send + Sync {
    /// Refresh and return the page state (element indexing included).
    async fn state(&self) -> Result<PageState, BrowserError>;

    /// Last state returned by [`Page::state`], without re-indexing.
    async fn cached_state(&self) -> Option<PageState>;

    async fn go_back(&self) -> Result<(), BrowserError>;

    async fn click_element(&self, node: &ElementNode) -> Result<(), BrowserError>;

    async fn input_text(&self, node: &ElementNode, text: &str) -> Result<(), BrowserError>;

    /// Scroll the page, or `node` when given, to a vertical percentage
    /// (0 = top, 100 = bottom).
    async fn scroll_to_percent(
        &self,
        y_percent: u8,
        node: Option<&ElementNode>,
    ) -> Result<(), BrowserError>;

    async fn scroll_to_previous_page(&self, node: Option<&ElementNode>)
        -> Result<(), BrowserError>;

    async fn scroll_to_next_page(&self, node: Option<&ElementNode>) -> Result<(), BrowserError>;

    /// Scroll to the nth (1-indexed) occurrence of `text`. Returns whether
    /// the text was found.
    async fn scroll_to_text(&self, text: &str, nth: u32) -> Result<bool, BrowserError>;

    async fn send_keys(&self, keys: &str) -> Result<(), BrowserError>;

    async fn scroll_info(&self) -> Result<ScrollInfo, BrowserError>;

    async fn element_scroll_info(&self, node: &ElementNode) -> Result<ScrollInfo, BrowserError>;

    async fn dropdown_options(&self, index: u32) -> Result<Vec<DropdownOption>, BrowserError>;

    /// Select the option whose text matches exactly; returns a confirmation
    /// message from the page.
    async fn select_dropdown_option(&self, index: u32, text: &str)
        -> Result<String, BrowserError>;
}

/// The browser session: tab management plus access to the current page.
#[async_trait]
pub trait BrowserContext: Send + Sync {
    async fn current_page(&self) -> Result<Arc<dyn Page>, BrowserError>;

    async fn navigate_to(&self, url: &str) -> Result<(), BrowserError>;

    async fn open_tab(&self, url: &str) -> Result<TabId, BrowserError>;

    async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError>;

    async fn switch_tab(&self, tab_id: TabId) -> Result<(), BrowserError>;

    async fn tab_ids(&self) -> Result<Vec<TabId>, BrowserError>;
}
