//! Scripted browser implementation for tests and offline runs.
//!
//! Deterministic counterpart to a real CDP/extension backend: pages are
//! declared up front, every performed operation is recorded, and failures can
//! be injected per element index.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::{
    BrowserContext, BrowserError, DropdownOption, ElementNode, Page, PageState, ScrollInfo, TabId,
};

#[derive(Debug)]
struct MockState {
    tabs: Vec<TabId>,
    active_tab: TabId,
    next_tab: TabId,
    current_url: String,
    pages: HashMap<String, PageState>,
    scroll: ScrollInfo,
    dropdowns: HashMap<u32, Vec<DropdownOption>>,
    page_text: Vec<String>,
    failing_clicks: HashSet<u32>,
    clicks_opening_tabs: HashSet<u32>,
    actions: Vec<String>,
    cached_state: Option<PageState>,
}

impl MockState {
    fn record(&mut self, action: impl Into<String>) {
        let action = action.into();
        debug!(action = %action, "mock browser action");
        self.actions.push(action);
    }

    fn current_state(&self) -> PageState {
        self.pages
            .get(&self.current_url)
            .cloned()
            .unwrap_or_else(|| PageState {
                url: self.current_url.clone(),
                title: String::new(),
                selector_map: HashMap::new(),
            })
    }
}

/// Scripted [`BrowserContext`] whose behavior is declared with the `with_*`
/// builders. Cloning shares the underlying state.
#[derive(Clone)]
pub struct MockBrowser {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockBrowser {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBrowser {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                tabs: vec![1],
                active_tab: 1,
                next_tab: 2,
                current_url: "about:blank".to_string(),
                pages: HashMap::new(),
                scroll: ScrollInfo {
                    scroll_top: 0,
                    viewport_height: 600,
                    scroll_height: 600,
                },
                dropdowns: HashMap::new(),
                page_text: Vec::new(),
                failing_clicks: HashSet::new(),
                clicks_opening_tabs: HashSet::new(),
                actions: Vec::new(),
                cached_state: None,
            })),
        }
    }

    /// Declare the page state served when the browser is at `url`.
    pub async fn with_page(self, url: impl Into<String>, state: PageState) -> Self {
        self.state.lock().await.pages.insert(url.into(), state);
        self
    }

    /// Declare elements for the page currently displayed.
    pub async fn with_elements(self, elements: Vec<ElementNode>) -> Self {
        {
            let mut state = self.state.lock().await;
            let url = state.current_url.clone();
            let page = PageState {
                url: url.clone(),
                title: String::new(),
                selector_map: elements.into_iter().map(|e| (e.index, e)).collect(),
            };
            state.pages.insert(url, page);
        }
        self
    }

    pub async fn with_dropdown(self, index: u32, options: Vec<DropdownOption>) -> Self {
        self.state.lock().await.dropdowns.insert(index, options);
        self
    }

    pub async fn with_scroll(self, scroll: ScrollInfo) -> Self {
        self.state.lock().await.scroll = scroll;
        self
    }

    pub async fn with_page_text(self, lines: Vec<String>) -> Self {
        self.state.lock().await.page_text = lines;
        self
    }

    /// Make clicking `index` fail with a recoverable error.
    pub async fn failing_click(self, index: u32) -> Self {
        self.state.lock().await.failing_clicks.insert(index);
        self
    }

    /// Make clicking `index` open a new tab, as target=_blank links do.
    pub async fn click_opens_tab(self, index: u32) -> Self {
        self.state.lock().await.clicks_opening_tabs.insert(index);
        self
    }

    /// Every operation performed so far, in order.
    pub async fn actions(&self) -> Vec<String> {
        self.state.lock().await.actions.clone()
    }

    pub async fn current_url(&self) -> String {
        self.state.lock().await.current_url.clone()
    }

    pub async fn active_tab(&self) -> TabId {
        self.state.lock().await.active_tab
    }
}

#[async_trait]
impl BrowserContext for MockBrowser {
    async fn current_page(&self) -> Result<Arc<dyn Page>, BrowserError> {
        Ok(Arc::new(MockPage {
            state: self.state.clone(),
        }))
    }

    async fn navigate_to(&self, url: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        state.current_url = url.to_string();
        state.record(format!("navigate:{url}"));
        Ok(())
    }

    async fn open_tab(&self, url: &str) -> Result<TabId, BrowserError> {
        let mut state = self.state.lock().await;
        let id = state.next_tab;
        state.next_tab += 1;
        state.tabs.push(id);
        state.active_tab = id;
        state.current_url = url.to_string();
        state.record(format!("open_tab:{url}"));
        Ok(id)
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        if !state.tabs.contains(&tab_id) {
            return Err(BrowserError::TabNotFound(tab_id));
        }
        state.tabs.retain(|t| *t != tab_id);
        if state.active_tab == tab_id {
            state.active_tab = *state.tabs.first().unwrap_or(&0);
        }
        state.record(format!("close_tab:{tab_id}"));
        Ok(())
    }

    async fn switch_tab(&self, tab_id: TabId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        if !state.tabs.contains(&tab_id) {
            return Err(BrowserError::TabNotFound(tab_id));
        }
        state.active_tab = tab_id;
        state.record(format!("switch_tab:{tab_id}"));
        Ok(())
    }

    async fn tab_ids(&self) -> Result<Vec<TabId>, BrowserError> {
        Ok(self.state.lock().await.tabs.clone())
    }
}

struct MockPage {
    state: Arc<Mutex<MockState>>,
}

#[async_trait]
impl Page for MockPage {
    async fn state(&self) -> Result<PageState, BrowserError> {
        let mut state = self.state.lock().await;
        let snapshot = state.current_state();
        state.cached_state = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn cached_state(&self) -> Option<PageState> {
        self.state.lock().await.cached_state.clone()
    }

    async fn go_back(&self) -> Result<(), BrowserError> {
        self.state.lock().await.record("go_back");
        Ok(())
    }

    async fn click_element(&self, node: &ElementNode) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        if state.failing_clicks.contains(&node.index) {
            state.record(format!("click_failed:{}", node.index));
            return Err(BrowserError::Other(format!(
                "element {} is no longer attached",
                node.index
            )));
        }
        if state.clicks_opening_tabs.contains(&node.index) {
            let id = state.next_tab;
            state.next_tab += 1;
            state.tabs.push(id);
        }
        state.record(format!("click:{}", node.index));
        Ok(())
    }

    async fn input_text(&self, node: &ElementNode, text: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        state.record(format!("input:{}:{}", node.index, text));
        Ok(())
    }

    async fn scroll_to_percent(
        &self,
        y_percent: u8,
        node: Option<&ElementNode>,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        let target = match node {
            Some(n) => format!("element {}", n.index),
            None => "page".to_string(),
        };
        let span = state.scroll.scroll_height.saturating_sub(state.scroll.viewport_height);
        state.scroll.scroll_top = span * u64::from(y_percent.min(100)) / 100;
        state.record(format!("scroll_to_percent:{y_percent}:{target}"));
        Ok(())
    }

    async fn scroll_to_previous_page(
        &self,
        _node: Option<&ElementNode>,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        state.scroll.scroll_top = state.scroll.scroll_top.saturating_sub(state.scroll.viewport_height);
        state.record("scroll_previous_page");
        Ok(())
    }

    async fn scroll_to_next_page(&self, _node: Option<&ElementNode>) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        let span = state.scroll.scroll_height.saturating_sub(state.scroll.viewport_height);
        state.scroll.scroll_top = (state.scroll.scroll_top + state.scroll.viewport_height).min(span);
        state.record("scroll_next_page");
        Ok(())
    }

    async fn scroll_to_text(&self, text: &str, nth: u32) -> Result<bool, BrowserError> {
        let mut state = self.state.lock().await;
        let found = state
            .page_text
            .iter()
            .filter(|line| line.contains(text))
            .nth(nth.saturating_sub(1) as usize)
            .is_some();
        state.record(format!("scroll_to_text:{text}:{nth}:{found}"));
        Ok(found)
    }

    async fn send_keys(&self, keys: &str) -> Result<(), BrowserError> {
        let mut state = self.state.lock().await;
        state.record(format!("send_keys:{keys}"));
        Ok(())
    }

    async fn scroll_info(&self) -> Result<ScrollInfo, BrowserError> {
        Ok(self.state.lock().await.scroll)
    }

    async fn element_scroll_info(&self, _node: &ElementNode) -> Result<ScrollInfo, BrowserError> {
        Ok(self.state.lock().await.scroll)
    }

    async fn dropdown_options(&self, index: u32) -> Result<Vec<DropdownOption>, BrowserError> {
        let state = self.state.lock().await;
        state
            .dropdowns
            .get(&index)
            .cloned()
            .ok_or(BrowserError::ElementNotFound(index))
    }

    async fn select_dropdown_option(
        &self,
        index: u32,
        text: &str,
    ) -> Result<String, BrowserError> {
        let mut state = self.state.lock().await;
        let options = state
            .dropdowns
            .get(&index)
            .cloned()
            .ok_or(BrowserError::ElementNotFound(index))?;
        if !options.iter().any(|o| o.text == text) {
            return Err(BrowserError::Other(format!(
                "option '{text}' not found in dropdown {index}"
            )));
        }
        state.record(format!("select:{index}:{text}"));
        Ok(format!("selected option '{text}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(index: u32) -> ElementNode {
        ElementNode {
            index,
            tag: "button".into(),
            text: format!("button {index}"),
            xpath: None,
            is_file_uploader: false,
        }
    }

    #[tokio::test]
    async fn tab_lifecycle() {
        let browser = MockBrowser::new();
        let second = browser.open_tab("https://example.com").await.unwrap();
        assert_eq!(browser.tab_ids().await.unwrap(), vec![1, second]);
        assert_eq!(browser.active_tab().await, second);

        browser.switch_tab(1).await.unwrap();
        assert_eq!(browser.active_tab().await, 1);

        browser.close_tab(second).await.unwrap();
        assert_eq!(browser.tab_ids().await.unwrap(), vec![1]);
        assert!(matches!(
            browser.switch_tab(second).await,
            Err(BrowserError::TabNotFound(_))
        ));
    }

    #[tokio::test]
    async fn scripted_elements_and_click_failure() {
        let browser = MockBrowser::new()
            .with_elements(vec![element(1), element(2)])
            .await
            .failing_click(2)
            .await;

        let page = browser.current_page().await.unwrap();
        let state = page.state().await.unwrap();
        assert_eq!(state.selector_map.len(), 2);
        assert!(page.cached_state().await.is_some());

        page.click_element(state.element(1).unwrap()).await.unwrap();
        assert!(page.click_element(state.element(2).unwrap()).await.is_err());

        let actions = browser.actions().await;
        assert!(actions.contains(&"click:1".to_string()));
        assert!(actions.contains(&"click_failed:2".to_string()));
    }

    #[tokio::test]
    async fn scroll_positions_update() {
        let browser = MockBrowser::new()
            .with_scroll(ScrollInfo {
                scroll_top: 0,
                viewport_height: 500,
                scroll_height: 2000,
            })
            .await;
        let page = browser.current_page().await.unwrap();

        page.scroll_to_percent(100, None).await.unwrap();
        assert!(page.scroll_info().await.unwrap().at_bottom());

        page.scroll_to_percent(0, None).await.unwrap();
        assert!(page.scroll_info().await.unwrap().at_top());

        page.scroll_to_next_page(None).await.unwrap();
        assert_eq!(page.scroll_info().await.unwrap().scroll_top, 500);
    }
}
