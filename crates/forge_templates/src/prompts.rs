//! Built-in prompt library.
//!
//! Every module type starts from these prompts and may override any of them
//! with a file listed in its manifest.

use serde::{Deserialize, Serialize};

/// The prompt used at each stage of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    Plan,
    Create,
    Update,
    Fix,
    Data,
    Test,
}

impl PromptKind {
    pub const ALL: [PromptKind; 6] = [
        PromptKind::Plan,
        PromptKind::Create,
        PromptKind::Update,
        PromptKind::Fix,
        PromptKind::Data,
        PromptKind::Test,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Create => "create",
            Self::Update => "update",
            Self::Fix => "fix",
            Self::Data => "data",
            Self::Test => "test",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Built-in text for this prompt.
    pub fn default_text(&self) -> &'static str {
        match self {
            Self::Plan => PLAN,
            Self::Create => CREATE,
            Self::Update => UPDATE,
            Self::Fix => FIX,
            Self::Data => DATA,
            Self::Test => TEST,
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const PATCH_RULES: &str = "\
Reply with files only, in this format and nothing else:
@@ <path> @@
<full content of the file>
To remove a file write a line @@ --<path> @@ with no content.
To change part of an existing file, put hunks under its header instead of the full content:
@@ <path> @@
@@ replace <start>:<end> @@
<new lines>
Hunk operations are insert, replace and delete. Line numbers are 1-based and inclusive and refer to the current file.";

const PLAN: &str = "\
You are planning changes to the application \"{application}\".
Existing modules:
{modules}

Requirement:
{requirement}

Decide which modules must be created, modified, deleted, have their data manipulated, or be tested.
Reply with a single JSON object and nothing else, shaped like:
{\"name\": \"<application name>\", \"tasks\": [{\"module\": \"<module name>\", \"type\": \"create|modify|delete|data|test\", \"suggestion\": \"<what to do>\", \"dependencies\": [\"<module name>\"], \"technology\": \"kiwi|web\"}]}
List a module's dependencies before it.";

const CREATE: &str = "\
Create the {technology} module \"{module}\".

Requirement:
{requirement}

Guidance for this module:
{suggestion}

APIs of the modules it depends on:
{dependencies}

";

const UPDATE: &str = "\
Update the {technology} module \"{module}\".

Requirement:
{requirement}

Guidance for this module:
{suggestion}

Current source:
{source}

APIs of the modules it depends on:
{dependencies}

";

const FIX: &str = "\
The build failed with this output:
{error}

Current source:
{source}

Fix the code so the build succeeds.
";

const DATA: &str = "\
Write a data script for the module \"{module}\".

Requirement:
{requirement}

Guidance:
{suggestion}

Current source:
{source}

";

const TEST: &str = "\
You are testing the web module \"{module}\" in a real browser.

Requirement:
{requirement}

Source:
{source}

Known test accounts:
{accounts}

Page target: {target}
Console log:
{console}

Page DOM:
{dom}

Steps so far:
{history}

Result of the last step:
{last_error}

Reply with exactly one action. The first line is the action kind, one of STEP, ACCEPT, REJECT or ABORT. The rest is a JSON body:
STEP: {\"commands\": [{\"type\": \"click\", \"selector\": \"#save\"}], \"accounts\": [{\"username\": \"u\", \"password\": \"p\"}]}
ACCEPT: {\"summary\": \"<why the requirement is met>\"}
REJECT: {\"report\": \"<bug report>\"}
ABORT: {\"reason\": \"<why testing cannot continue>\"}
Command types: click, fill (selector, value), press (selector, key), clear, hover, mouse_down, mouse_up, drag_and_drop (selector, target), navigate (url), upload_generated_file (selector, file_name, content), expect_visible, expect_hidden, expect_contains_text (selector, text).";

/// Rules appended to every code-producing prompt.
pub fn patch_rules() -> &'static str {
    PATCH_RULES
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::{render, PromptArgs};

    #[test]
    fn test_kind_names_roundtrip() {
        for kind in PromptKind::ALL {
            assert_eq!(PromptKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(PromptKind::from_str("deploy"), None);
    }

    #[test]
    fn test_fix_prompt_renders() {
        let args = PromptArgs::new()
            .with("error", "Foo.java:1: error")
            .with("source", "@@ Foo.java @@\nclass Foo {}");
        let text = render(PromptKind::Fix.default_text(), &args).unwrap();
        assert!(text.contains("Foo.java:1: error"));
        assert!(text.contains("class Foo {}"));
    }

    #[test]
    fn test_plan_prompt_json_example_is_literal() {
        let args = PromptArgs::new()
            .with("application", "shop")
            .with("modules", "(none)")
            .with("requirement", "a shop");
        let text = render(PromptKind::Plan.default_text(), &args).unwrap();
        assert!(text.contains("{\"name\": \"<application name>\""));
    }
}
