//! Scripted in-memory page for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::{BrowserError, BrowserResult};
use crate::page::{Browser, Page};

/// PNG signature, enough for a screenshot placeholder.
const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

#[derive(Default)]
struct PageState {
    url: String,
    visible: HashSet<String>,
    texts: HashMap<String, String>,
    reveals: HashMap<String, Vec<String>>,
    console: String,
    dom: Option<String>,
    actions: Vec<String>,
    closed: bool,
}

/// Page whose elements and reactions are declared up front.
///
/// Clones share state, so a test keeps one clone to inspect what the test
/// loop did with the other.
#[derive(Clone, Default)]
pub struct ScriptedPage {
    state: Arc<RwLock<PageState>>,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A visible element.
    pub fn with_element(self, selector: &str) -> Self {
        self.state.write().visible.insert(selector.to_string());
        self
    }

    /// A visible element with text.
    pub fn with_text(self, selector: &str, text: &str) -> Self {
        {
            let mut state = self.state.write();
            state.visible.insert(selector.to_string());
            state.texts.insert(selector.to_string(), text.to_string());
        }
        self
    }

    /// Clicking `selector` makes `revealed` visible.
    pub fn on_click_reveal(self, selector: &str, revealed: &str) -> Self {
        self.state
            .write()
            .reveals
            .entry(selector.to_string())
            .or_default()
            .push(revealed.to_string());
        self
    }

    pub fn with_console(self, log: &str) -> Self {
        self.state.write().console = log.to_string();
        self
    }

    pub fn with_dom(self, dom: &str) -> Self {
        self.state.write().dom = Some(dom.to_string());
        self
    }

    /// Actions performed, e.g. `click #save`.
    pub fn actions(&self) -> Vec<String> {
        self.state.read().actions.clone()
    }

    pub fn url(&self) -> String {
        self.state.read().url.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    fn act(&self, action: String, selector: &str) -> BrowserResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        if !state.visible.contains(selector) {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }
        state.actions.push(action);
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&PageState) -> T) -> BrowserResult<T> {
        let state = self.state.read();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        Ok(f(&state))
    }
}

#[async_trait]
impl Page for ScriptedPage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        let mut state = self.state.write();
        if state.closed {
            return Err(BrowserError::Closed);
        }
        state.url = url.to_string();
        state.actions.push(format!("navigate {}", url));
        Ok(())
    }

    async fn click(&self, selector: &str) -> BrowserResult<()> {
        self.act(format!("click {}", selector), selector)?;
        let mut state = self.state.write();
        if let Some(revealed) = state.reveals.get(selector).cloned() {
            state.visible.extend(revealed);
        }
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()> {
        self.act(format!("fill {} {}", selector, value), selector)?;
        self.state
            .write()
            .texts
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn press(&self, selector: &str, key: &str) -> BrowserResult<()> {
        self.act(format!("press {} {}", selector, key), selector)
    }

    async fn clear(&self, selector: &str) -> BrowserResult<()> {
        self.act(format!("clear {}", selector), selector)?;
        self.state.write().texts.remove(selector);
        Ok(())
    }

    async fn hover(&self, selector: &str) -> BrowserResult<()> {
        self.act(format!("hover {}", selector), selector)
    }

    async fn mouse_down(&self, selector: &str) -> BrowserResult<()> {
        self.act(format!("mouse_down {}", selector), selector)
    }

    async fn mouse_up(&self, selector: &str) -> BrowserResult<()> {
        self.act(format!("mouse_up {}", selector), selector)
    }

    async fn drag_and_drop(&self, source: &str, target: &str) -> BrowserResult<()> {
        self.act(format!("drag_and_drop {} {}", source, target), source)
    }

    async fn upload_file(&self, selector: &str, file_name: &str, content: &[u8]) -> BrowserResult<()> {
        self.act(
            format!("upload {} {} ({} bytes)", selector, file_name, content.len()),
            selector,
        )
    }

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool> {
        self.read(|s| s.visible.contains(selector))
    }

    async fn contains_text(&self, selector: &str, text: &str) -> BrowserResult<bool> {
        self.read(|s| s.texts.get(selector).map(|t| t.contains(text)).unwrap_or(false))
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        self.read(|_| PNG.to_vec())
    }

    async fn dom(&self) -> BrowserResult<String> {
        self.read(|s| {
            s.dom.clone().unwrap_or_else(|| {
                let mut elements: Vec<&String> = s.visible.iter().collect();
                elements.sort();
                let body: String = elements
                    .iter()
                    .map(|sel| {
                        let text = s.texts.get(*sel).map(String::as_str).unwrap_or("");
                        format!("<div data-selector=\"{}\">{}</div>", sel, text)
                    })
                    .collect();
                format!("<html><body>{}</body></html>", body)
            })
        })
    }

    async fn console_logs(&self) -> BrowserResult<String> {
        self.read(|s| s.console.clone())
    }

    async fn target_id(&self) -> BrowserResult<String> {
        self.read(|s| s.url.clone())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.state.write().closed = true;
        Ok(())
    }
}

/// Browser that opens its one scripted page.
#[derive(Clone, Default)]
pub struct ScriptedBrowser {
    page: ScriptedPage,
}

impl ScriptedBrowser {
    pub fn new(page: ScriptedPage) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &ScriptedPage {
        &self.page
    }
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn open(&self, url: &str) -> BrowserResult<Box<dyn Page>> {
        // Reopening serves the same page again.
        self.page.state.write().closed = false;
        self.page.navigate(url).await?;
        Ok(Box::new(self.page.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_click_reveals_and_fill_sets_text() {
        let page = ScriptedPage::new()
            .with_element("#open")
            .on_click_reveal("#open", "#dialog");
        assert!(!page.is_visible("#dialog").await.unwrap());

        page.click("#open").await.unwrap();
        assert!(page.is_visible("#dialog").await.unwrap());

        page.fill("#dialog", "hello").await.unwrap();
        assert!(page.contains_text("#dialog", "ell").await.unwrap());
        assert_eq!(page.actions(), vec!["click #open", "fill #dialog hello"]);
    }

    #[tokio::test]
    async fn test_closed_page() {
        let browser = ScriptedBrowser::new(ScriptedPage::new());
        let page = browser.open("http://localhost/app").await.unwrap();
        assert_eq!(page.target_id().await.unwrap(), "http://localhost/app");

        page.close().await.unwrap();
        assert!(browser.page().is_closed());
        assert!(matches!(page.dom().await, Err(BrowserError::Closed)));
    }
}
