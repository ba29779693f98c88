//! Execution of step commands against a page.

use tracing::debug;

use crate::action::Command;
use crate::error::{BrowserError, BrowserResult};
use crate::page::Page;

/// What happened to one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Commands that completed.
    pub executed: usize,
    /// First failure, formatted for the next prompt.
    pub error: Option<String>,
}

impl StepReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

async fn require_visible(page: &dyn Page, selector: &str) -> BrowserResult<()> {
    if page.is_visible(selector).await? {
        Ok(())
    } else {
        Err(BrowserError::NotVisible(selector.to_string()))
    }
}

/// Run one command. Acting commands require their element to be visible.
pub async fn execute_command(page: &dyn Page, command: &Command) -> BrowserResult<()> {
    if !command.is_expectation() {
        if let Some(selector) = command.selector() {
            require_visible(page, selector).await?;
        }
    }

    match command {
        Command::Click { selector } => page.click(selector).await,
        Command::Fill { selector, value } => page.fill(selector, value).await,
        Command::Press { selector, key } => page.press(selector, key).await,
        Command::Clear { selector } => page.clear(selector).await,
        Command::Hover { selector } => page.hover(selector).await,
        Command::MouseDown { selector } => page.mouse_down(selector).await,
        Command::MouseUp { selector } => page.mouse_up(selector).await,
        Command::DragAndDrop { selector, target } => {
            require_visible(page, target).await?;
            page.drag_and_drop(selector, target).await
        }
        Command::Navigate { url } => page.navigate(url).await,
        Command::UploadGeneratedFile {
            selector,
            file_name,
            content,
        } => page.upload_file(selector, file_name, content.as_bytes()).await,
        Command::ExpectVisible { selector } => require_visible(page, selector).await,
        Command::ExpectHidden { selector } => {
            if page.is_visible(selector).await? {
                Err(BrowserError::Expectation(format!("{} is visible", selector)))
            } else {
                Ok(())
            }
        }
        Command::ExpectContainsText { selector, text } => {
            if page.contains_text(selector, text).await? {
                Ok(())
            } else {
                Err(BrowserError::Expectation(format!(
                    "{} does not contain \"{}\"",
                    selector, text
                )))
            }
        }
    }
}

/// Run `commands` in order, stopping at the first failure.
///
/// Failures are reported, not returned: the model sees them on its next turn.
/// Only a closed page is an error.
pub async fn execute_step(page: &dyn Page, commands: &[Command]) -> BrowserResult<StepReport> {
    for (index, command) in commands.iter().enumerate() {
        match execute_command(page, command).await {
            Ok(()) => debug!("Executed {}", command.name()),
            Err(BrowserError::Closed) => return Err(BrowserError::Closed),
            Err(e) => {
                debug!("Command {} failed: {}", command.name(), e);
                return Ok(StepReport {
                    executed: index,
                    error: Some(format!(
                        "command {} ({}) failed: {}",
                        index + 1,
                        command.name(),
                        e
                    )),
                });
            }
        }
    }
    Ok(StepReport {
        executed: commands.len(),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::MockPage;
    use mockall::predicate::eq;

    fn click(selector: &str) -> Command {
        Command::Click {
            selector: selector.to_string(),
        }
    }

    #[tokio::test]
    async fn test_visible_element_is_clicked() {
        let mut page = MockPage::new();
        page.expect_is_visible()
            .with(eq("#save"))
            .times(1)
            .returning(|_| Ok(true));
        page.expect_click()
            .with(eq("#save"))
            .times(1)
            .returning(|_| Ok(()));

        let report = execute_step(&page, &[click("#save")]).await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.executed, 1);
    }

    #[tokio::test]
    async fn test_hidden_element_short_circuits() {
        let mut page = MockPage::new();
        page.expect_is_visible()
            .with(eq("#missing"))
            .returning(|_| Ok(false));
        page.expect_click().never();

        let commands = [click("#missing"), click("#save")];
        let report = execute_step(&page, &commands).await.unwrap();
        assert_eq!(report.executed, 0);
        let error = report.error.unwrap();
        assert!(error.starts_with("command 1 (click) failed"));
        assert!(error.contains("#missing"));
    }

    #[tokio::test]
    async fn test_expectations() {
        let mut page = MockPage::new();
        page.expect_is_visible()
            .with(eq("#spinner"))
            .returning(|_| Ok(true));
        page.expect_contains_text()
            .returning(|_, text| Ok(text == "Orders"));

        let ok = Command::ExpectContainsText {
            selector: "h1".to_string(),
            text: "Orders".to_string(),
        };
        execute_command(&page, &ok).await.unwrap();

        let hidden = Command::ExpectHidden {
            selector: "#spinner".to_string(),
        };
        let err = execute_command(&page, &hidden).await.unwrap_err();
        assert!(matches!(err, BrowserError::Expectation(_)));
    }

    #[tokio::test]
    async fn test_navigate_needs_no_element() {
        let mut page = MockPage::new();
        page.expect_is_visible().never();
        page.expect_navigate()
            .with(eq("/orders"))
            .returning(|_| Ok(()));

        let command = Command::Navigate {
            url: "/orders".to_string(),
        };
        execute_command(&page, &command).await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_page_is_an_error() {
        let mut page = MockPage::new();
        page.expect_is_visible().returning(|_| Err(BrowserError::Closed));

        let err = execute_step(&page, &[click("#save")]).await.unwrap_err();
        assert!(matches!(err, BrowserError::Closed));
    }
}
