//! Dispatches navigator actions to the browser.
//!
//! Every action is bracketed by `ActStart`/`ActOk`/`ActFail` events. Browser
//! failures other than policy violations become recoverable
//! [`ActionResult::error`] values so the navigator can see them next turn;
//! policy violations abort the task.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use pagepilot_browser::{BrowserContext, BrowserError, ElementNode, Page, UrlPolicy};
use pagepilot_core_types::{ActionResult, Actor, ExecutionState};

use crate::agent::context::AgentContext;
use crate::errors::AgentError;

use super::NavigatorAction;

pub struct ActionExecutor {
    browser: Arc<dyn BrowserContext>,
    policy: UrlPolicy,
}

impl ActionExecutor {
    pub fn new(browser: Arc<dyn BrowserContext>, policy: UrlPolicy) -> Self {
        Self { browser, policy }
    }

    /// Run one action and report its outcome.
    ///
    /// `Err` is returned only for fatal conditions (policy violations);
    /// ordinary browser failures come back as `Ok(ActionResult::error)`.
    pub async fn execute(
        &self,
        action: &NavigatorAction,
        ctx: &AgentContext,
    ) -> Result<ActionResult, AgentError> {
        let intent = action
            .intent()
            .map(str::to_owned)
            .unwrap_or_else(|| action.default_intent());
        ctx.emit(Actor::Navigator, ExecutionState::ActStart, &intent)
            .await;
        debug!(action = action.name(), %intent, "executing action");

        let outcome = self.perform(action).await;
        match outcome {
            Ok(result) => {
                if result.is_success() {
                    let detail = result
                        .extracted_content
                        .clone()
                        .unwrap_or_else(|| intent.clone());
                    ctx.emit(Actor::Navigator, ExecutionState::ActOk, detail).await;
                } else {
                    let detail = result.error.clone().unwrap_or_else(|| intent.clone());
                    warn!(action = action.name(), error = %detail, "action failed");
                    ctx.emit(Actor::Navigator, ExecutionState::ActFail, detail)
                        .await;
                }
                Ok(result)
            }
            Err(err) if err.is_fatal() => {
                ctx.emit(Actor::Navigator, ExecutionState::ActFail, err.to_string())
                    .await;
                Err(AgentError::Browser(err))
            }
            Err(err) => {
                let message = err.to_string();
                warn!(action = action.name(), error = %message, "action failed");
                ctx.emit(Actor::Navigator, ExecutionState::ActFail, &message)
                    .await;
                Ok(ActionResult::error(message))
            }
        }
    }

    async fn perform(&self, action: &NavigatorAction) -> Result<ActionResult, BrowserError> {
        match action {
            NavigatorAction::Done { text, success } => Ok(if *success {
                ActionResult::done(text.clone())
            } else {
                ActionResult {
                    extracted_content: Some(text.clone()),
                    error: Some(text.clone()),
                    is_done: true,
                    include_in_memory: true,
                }
            }),

            NavigatorAction::SearchGoogle { query, .. } => {
                let url = format!(
                    "https://www.google.com/search?q={}",
                    url::form_urlencoded::byte_serialize(query.as_bytes()).collect::<String>()
                );
                self.policy.check(&url)?;
                self.browser.navigate_to(&url).await?;
                Ok(ActionResult::content(format!(
                    "Searched the web for \"{query}\""
                )))
            }

            NavigatorAction::GoToUrl { url, .. } => {
                self.policy.check(url)?;
                self.browser.navigate_to(url).await?;
                Ok(ActionResult::content(format!("Navigated to {url}")))
            }

            NavigatorAction::GoBack { .. } => {
                let page = self.browser.current_page().await?;
                page.go_back().await?;
                Ok(ActionResult::content("Navigated back"))
            }

            NavigatorAction::ClickElement { index, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.resolve_element(&page, *index).await?;
                if node.is_file_uploader {
                    return Ok(ActionResult::error(format!(
                        "Element {index} opens a file upload dialog, which cannot be \
                         automated. Use a different approach."
                    )));
                }
                let tabs_before: HashSet<_> =
                    self.browser.tab_ids().await?.into_iter().collect();
                page.click_element(&node).await?;
                let tabs_after = self.browser.tab_ids().await?;
                let new_tab = tabs_after.iter().find(|t| !tabs_before.contains(t)).copied();
                if let Some(tab) = new_tab {
                    self.browser.switch_tab(tab).await?;
                    Ok(ActionResult::content(format!(
                        "Clicked {} which opened a new tab; switched to it",
                        node.describe()
                    )))
                } else {
                    Ok(ActionResult::content(format!("Clicked {}", node.describe())))
                }
            }

            NavigatorAction::InputText { index, text, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.resolve_element(&page, *index).await?;
                page.input_text(&node, text).await?;
                Ok(ActionResult::content(format!(
                    "Typed \"{text}\" into {}",
                    node.describe()
                )))
            }

            NavigatorAction::SwitchTab { tab_id, .. } => {
                self.browser.switch_tab(*tab_id).await?;
                Ok(ActionResult::content(format!("Switched to tab {tab_id}")))
            }

            NavigatorAction::OpenTab { url, .. } => {
                self.policy.check(url)?;
                let tab = self.browser.open_tab(url).await?;
                Ok(ActionResult::content(format!(
                    "Opened {url} in new tab {tab}"
                )))
            }

            NavigatorAction::CloseTab { tab_id, .. } => {
                self.browser.close_tab(*tab_id).await?;
                Ok(ActionResult::content(format!("Closed tab {tab_id}")))
            }

            NavigatorAction::CacheContent { content, .. } => {
                Ok(ActionResult::content(content.clone()))
            }

            NavigatorAction::ScrollToPercent {
                y_percent, index, ..
            } => {
                let page = self.browser.current_page().await?;
                let node = self.optional_element(&page, *index).await?;
                page.scroll_to_percent((*y_percent).min(100), node.as_ref())
                    .await?;
                Ok(ActionResult::content(format!(
                    "Scrolled to {}%",
                    (*y_percent).min(100)
                )))
            }

            NavigatorAction::ScrollToTop { index, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.optional_element(&page, *index).await?;
                let info = match &node {
                    Some(n) => page.element_scroll_info(n).await?,
                    None => page.scroll_info().await?,
                };
                if info.at_top() {
                    return Ok(ActionResult::content("Already at the top"));
                }
                page.scroll_to_percent(0, node.as_ref()).await?;
                Ok(ActionResult::content("Scrolled to the top"))
            }

            NavigatorAction::ScrollToBottom { index, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.optional_element(&page, *index).await?;
                let info = match &node {
                    Some(n) => page.element_scroll_info(n).await?,
                    None => page.scroll_info().await?,
                };
                if info.at_bottom() {
                    return Ok(ActionResult::content("Already at the bottom"));
                }
                page.scroll_to_percent(100, node.as_ref()).await?;
                Ok(ActionResult::content("Scrolled to the bottom"))
            }

            NavigatorAction::PreviousPage { index, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.optional_element(&page, *index).await?;
                let info = match &node {
                    Some(n) => page.element_scroll_info(n).await?,
                    None => page.scroll_info().await?,
                };
                if info.at_top() {
                    return Ok(ActionResult::content("Already at the top"));
                }
                page.scroll_to_previous_page(node.as_ref()).await?;
                Ok(ActionResult::content("Scrolled up one page"))
            }

            NavigatorAction::NextPage { index, .. } => {
                let page = self.browser.current_page().await?;
                let node = self.optional_element(&page, *index).await?;
                let info = match &node {
                    Some(n) => page.element_scroll_info(n).await?,
                    None => page.scroll_info().await?,
                };
                if info.at_bottom() {
                    return Ok(ActionResult::content("Already at the bottom"));
                }
                page.scroll_to_next_page(node.as_ref()).await?;
                Ok(ActionResult::content("Scrolled down one page"))
            }

            NavigatorAction::ScrollToText { text, nth, .. } => {
                let page = self.browser.current_page().await?;
                let found = page.scroll_to_text(text, (*nth).max(1)).await?;
                if found {
                    Ok(ActionResult::content(format!("Scrolled to \"{text}\"")))
                } else {
                    Ok(ActionResult::error(format!(
                        "Text \"{text}\" not found on the page"
                    )))
                }
            }

            NavigatorAction::SendKeys { keys, .. } => {
                let page = self.browser.current_page().await?;
                page.send_keys(keys).await?;
                Ok(ActionResult::content(format!("Sent keys {keys}")))
            }

            NavigatorAction::GetDropdownOptions { index, .. } => {
                let page = self.browser.current_page().await?;
                let options = page.dropdown_options(*index).await?;
                if options.is_empty() {
                    return Ok(ActionResult::error(format!(
                        "Dropdown {index} has no options"
                    )));
                }
                let listing = options
                    .iter()
                    .map(|o| format!("{}: text={:?}", o.index, o.text))
                    .collect::<Vec<_>>()
                    .join("\n");
                Ok(ActionResult::content(format!(
                    "Options for dropdown {index}:\n{listing}\nUse the exact text \
                     in select_dropdown_option"
                )))
            }

            NavigatorAction::SelectDropdownOption { index, text, .. } => {
                let page = self.browser.current_page().await?;
                let confirmation = page.select_dropdown_option(*index, text).await?;
                Ok(ActionResult::content(confirmation))
            }
        }
    }

    async fn resolve_element(
        &self,
        page: &Arc<dyn Page>,
        index: u32,
    ) -> Result<ElementNode, BrowserError> {
        let state = match page.cached_state().await {
            Some(state) => state,
            None => page.state().await?,
        };
        state
            .element(index)
            .cloned()
            .ok_or(BrowserError::ElementNotFound(index))
    }

    async fn optional_element(
        &self,
        page: &Arc<dyn Page>,
        index: Option<u32>,
    ) -> Result<Option<ElementNode>, BrowserError> {
        match index {
            Some(i) => Ok(Some(self.resolve_element(page, i).await?)),
            None => Ok(None),
        }
    }
}
