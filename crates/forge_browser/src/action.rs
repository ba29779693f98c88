//! Test-loop actions and their wire format.
//!
//! The model answers every test step with one action: a line naming the
//! kind (`STEP`, `ACCEPT`, `REJECT` or `ABORT`) followed by a JSON body.
//!
//! ```text
//! STEP
//! {"commands": [{"type": "fill", "selector": "#name", "value": "Ada"}]}
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{BrowserError, BrowserResult};

/// A primitive browser command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Click { selector: String },
    Fill { selector: String, value: String },
    Press { selector: String, key: String },
    Clear { selector: String },
    Hover { selector: String },
    MouseDown { selector: String },
    MouseUp { selector: String },
    DragAndDrop { selector: String, target: String },
    Navigate { url: String },
    UploadGeneratedFile {
        selector: String,
        file_name: String,
        content: String,
    },
    ExpectVisible { selector: String },
    ExpectHidden { selector: String },
    ExpectContainsText { selector: String, text: String },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::Fill { .. } => "fill",
            Self::Press { .. } => "press",
            Self::Clear { .. } => "clear",
            Self::Hover { .. } => "hover",
            Self::MouseDown { .. } => "mouse_down",
            Self::MouseUp { .. } => "mouse_up",
            Self::DragAndDrop { .. } => "drag_and_drop",
            Self::Navigate { .. } => "navigate",
            Self::UploadGeneratedFile { .. } => "upload_generated_file",
            Self::ExpectVisible { .. } => "expect_visible",
            Self::ExpectHidden { .. } => "expect_hidden",
            Self::ExpectContainsText { .. } => "expect_contains_text",
        }
    }

    /// Element the command targets, if any.
    pub fn selector(&self) -> Option<&str> {
        match self {
            Self::Navigate { .. } => None,
            Self::Click { selector }
            | Self::Fill { selector, .. }
            | Self::Press { selector, .. }
            | Self::Clear { selector }
            | Self::Hover { selector }
            | Self::MouseDown { selector }
            | Self::MouseUp { selector }
            | Self::DragAndDrop { selector, .. }
            | Self::UploadGeneratedFile { selector, .. }
            | Self::ExpectVisible { selector }
            | Self::ExpectHidden { selector }
            | Self::ExpectContainsText { selector, .. } => Some(selector),
        }
    }

    /// Whether the command checks the page rather than acting on it.
    pub fn is_expectation(&self) -> bool {
        matches!(
            self,
            Self::ExpectVisible { .. } | Self::ExpectHidden { .. } | Self::ExpectContainsText { .. }
        )
    }
}

/// Credentials the model created or used while testing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAccount {
    pub username: String,
    pub password: String,
}

/// The model's decision for one test step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Step {
        commands: Vec<Command>,
        accounts: Vec<TestAccount>,
    },
    Accept { summary: String },
    Reject { report: String },
    Abort { reason: String },
}

#[derive(Deserialize)]
struct StepBody {
    #[serde(default)]
    commands: Vec<Command>,
    #[serde(default)]
    accounts: Vec<TestAccount>,
}

#[derive(Deserialize, Default)]
struct AcceptBody {
    #[serde(default)]
    summary: String,
}

#[derive(Deserialize)]
struct RejectBody {
    report: String,
}

#[derive(Deserialize, Default)]
struct AbortBody {
    #[serde(default)]
    reason: String,
}

const KINDS: [&str; 4] = ["STEP", "ACCEPT", "REJECT", "ABORT"];

/// Kind named at the start of `line`, and the rest of the line.
fn split_kind(line: &str) -> Option<(&'static str, &str)> {
    let trimmed = line
        .trim_start()
        .trim_start_matches(|c: char| c == '*' || c == '`' || c == '#')
        .trim_start();
    let end = trimmed
        .find(|c: char| !c.is_ascii_uppercase())
        .unwrap_or(trimmed.len());
    let kind = KINDS.iter().copied().find(|k| *k == &trimmed[..end])?;
    Some((kind, &trimmed[end..]))
}

/// The JSON object in `text`, ignoring fences and surrounding prose.
fn json_body(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_body<T: for<'de> Deserialize<'de>>(kind: &str, body: &str) -> BrowserResult<T> {
    let json = json_body(body)
        .ok_or_else(|| BrowserError::InvalidAction(format!("{} needs a JSON body", kind)))?;
    serde_json::from_str(json)
        .map_err(|e| BrowserError::InvalidAction(format!("{} body: {}", kind, e)))
}

fn parse_optional_body<T: for<'de> Deserialize<'de> + Default>(
    kind: &str,
    body: &str,
) -> BrowserResult<T> {
    if json_body(body).is_none() {
        return Ok(T::default());
    }
    parse_body(kind, body)
}

impl Action {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Step { .. } => "STEP",
            Self::Accept { .. } => "ACCEPT",
            Self::Reject { .. } => "REJECT",
            Self::Abort { .. } => "ABORT",
        }
    }

    /// Parse a model reply.
    ///
    /// Prose before the kind line is skipped. The kind may be wrapped in
    /// markdown emphasis, and the body may start on the same line.
    pub fn parse(reply: &str) -> BrowserResult<Self> {
        let mut offset = 0;
        let mut found = None;
        for line in reply.split_inclusive('\n') {
            if let Some((kind, rest)) = split_kind(line) {
                found = Some((kind, offset + line.len() - rest.len()));
                break;
            }
            offset += line.len();
        }
        let Some((kind, body_start)) = found else {
            return Err(BrowserError::InvalidAction(
                "expected one of STEP, ACCEPT, REJECT or ABORT".to_string(),
            ));
        };
        let body = &reply[body_start..];

        match kind {
            "STEP" => {
                let step: StepBody = parse_body(kind, body)?;
                if step.commands.is_empty() {
                    return Err(BrowserError::InvalidAction(
                        "STEP must list at least one command".to_string(),
                    ));
                }
                Ok(Self::Step {
                    commands: step.commands,
                    accounts: step.accounts,
                })
            }
            "ACCEPT" => {
                let accept: AcceptBody = parse_optional_body(kind, body)?;
                Ok(Self::Accept {
                    summary: accept.summary,
                })
            }
            "REJECT" => {
                let reject: RejectBody = parse_body(kind, body)?;
                Ok(Self::Reject {
                    report: reject.report,
                })
            }
            _ => {
                let abort: AbortBody = parse_optional_body(kind, body)?;
                Ok(Self::Abort {
                    reason: abort.reason,
                })
            }
        }
    }

    /// Wire form of the action.
    pub fn render(&self) -> String {
        let body = match self {
            Self::Step { commands, accounts } => {
                serde_json::json!({ "commands": commands, "accounts": accounts })
            }
            Self::Accept { summary } => serde_json::json!({ "summary": summary }),
            Self::Reject { report } => serde_json::json!({ "report": report }),
            Self::Abort { reason } => serde_json::json!({ "reason": reason }),
        };
        format!("{}\n{}", self.kind(), body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_step() {
        let reply = "STEP\n{\"commands\": [{\"type\": \"click\", \"selector\": \"#save\"}, \
                     {\"type\": \"fill\", \"selector\": \"#name\", \"value\": \"Ada\"}]}";
        let action = Action::parse(reply).unwrap();
        assert_eq!(
            action,
            Action::Step {
                commands: vec![
                    Command::Click {
                        selector: "#save".to_string()
                    },
                    Command::Fill {
                        selector: "#name".to_string(),
                        value: "Ada".to_string()
                    },
                ],
                accounts: vec![],
            }
        );
    }

    #[test]
    fn test_parse_skips_prose_and_fences() {
        let reply = "Let me log in first.\n**STEP**\n```json\n{\"commands\": [{\"type\": \"navigate\", \"url\": \"/login\"}], \
                     \"accounts\": [{\"username\": \"ada\", \"password\": \"pw\"}]}\n```";
        match Action::parse(reply).unwrap() {
            Action::Step { commands, accounts } => {
                assert_eq!(commands[0].name(), "navigate");
                assert_eq!(accounts[0].username, "ada");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_terminal_actions() {
        assert_eq!(
            Action::parse("ACCEPT").unwrap(),
            Action::Accept {
                summary: String::new()
            }
        );
        assert_eq!(
            Action::parse("REJECT: {\"report\": \"Save does nothing\"}").unwrap(),
            Action::Reject {
                report: "Save does nothing".to_string()
            }
        );
        assert_eq!(
            Action::parse("ABORT\n{\"reason\": \"blank page\"}").unwrap(),
            Action::Abort {
                reason: "blank page".to_string()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Action::parse("I think it works"),
            Err(BrowserError::InvalidAction(_))
        ));
        assert!(Action::parse("REJECT").is_err());
        assert!(Action::parse("STEP\n{\"commands\": []}").is_err());
        assert!(Action::parse("STEP\n{\"commands\": [{\"type\": \"teleport\"}]}").is_err());
    }

    #[test]
    fn test_render_parses_back() {
        let action = Action::Step {
            commands: vec![Command::ExpectContainsText {
                selector: "h1".to_string(),
                text: "Orders".to_string(),
            }],
            accounts: vec![],
        };
        assert_eq!(Action::parse(&action.render()).unwrap(), action);
    }

    #[test]
    fn test_selector() {
        let navigate = Command::Navigate {
            url: "/".to_string(),
        };
        assert_eq!(navigate.selector(), None);
        let drag = Command::DragAndDrop {
            selector: "#a".to_string(),
            target: "#b".to_string(),
        };
        assert_eq!(drag.selector(), Some("#a"));
        assert!(!drag.is_expectation());
    }
}
