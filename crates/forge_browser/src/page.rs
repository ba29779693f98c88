//! Page and browser contracts.

use async_trait::async_trait;

use crate::error::BrowserResult;

/// A live browser page.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Page: Send + Sync {
    async fn navigate(&self, url: &str) -> BrowserResult<()>;

    async fn click(&self, selector: &str) -> BrowserResult<()>;

    async fn fill(&self, selector: &str, value: &str) -> BrowserResult<()>;

    async fn press(&self, selector: &str, key: &str) -> BrowserResult<()>;

    async fn clear(&self, selector: &str) -> BrowserResult<()>;

    async fn hover(&self, selector: &str) -> BrowserResult<()>;

    async fn mouse_down(&self, selector: &str) -> BrowserResult<()>;

    async fn mouse_up(&self, selector: &str) -> BrowserResult<()>;

    async fn drag_and_drop(&self, source: &str, target: &str) -> BrowserResult<()>;

    /// Set the file input at `selector` to a file with the given content.
    async fn upload_file(&self, selector: &str, file_name: &str, content: &[u8]) -> BrowserResult<()>;

    async fn is_visible(&self, selector: &str) -> BrowserResult<bool>;

    async fn contains_text(&self, selector: &str, text: &str) -> BrowserResult<bool>;

    /// PNG bytes.
    async fn screenshot(&self) -> BrowserResult<Vec<u8>>;

    async fn dom(&self) -> BrowserResult<String>;

    async fn console_logs(&self) -> BrowserResult<String>;

    async fn target_id(&self) -> BrowserResult<String>;

    async fn close(&self) -> BrowserResult<()>;
}

/// Opens pages on a deployed product.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn open(&self, url: &str) -> BrowserResult<Box<dyn Page>>;
}
