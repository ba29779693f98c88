//! Prompt template substitution.
//!
//! Templates are plain text with positional `{}` and named `{key}`
//! placeholders, substituted left to right. Substituted values are never
//! rescanned, so source code containing braces can be passed through safely.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{TemplateError, TemplateResult};

fn placeholder_pattern() -> TemplateResult<&'static Regex> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    if let Some(pattern) = PATTERN.get() {
        return Ok(pattern);
    }
    let pattern = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)?\}")
        .map_err(|e| TemplateError::RenderingFailed(e.to_string()))?;
    Ok(PATTERN.get_or_init(|| pattern))
}

/// Values for one render call.
#[derive(Debug, Clone, Default)]
pub struct PromptArgs {
    positional: Vec<String>,
    named: HashMap<String, String>,
}

impl PromptArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value for the next `{}` placeholder.
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.positional.push(value.into());
        self
    }

    /// Set the value of a `{key}` placeholder.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.named.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.named.insert(key.into(), value.into());
    }
}

/// Render `template` with `args`. A placeholder without a value is an error.
pub fn render(template: &str, args: &PromptArgs) -> TemplateResult<String> {
    let pattern = placeholder_pattern()?;
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    let mut next_positional = 0;

    for caps in pattern.captures_iter(template) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&template[last..whole.start()]);

        match caps.get(1) {
            Some(name) => {
                let value = args
                    .named
                    .get(name.as_str())
                    .ok_or_else(|| TemplateError::MissingVariable(name.as_str().to_string()))?;
                out.push_str(value);
            }
            None => {
                let value = args.positional.get(next_positional).ok_or_else(|| {
                    TemplateError::MissingVariable(format!("positional #{}", next_positional + 1))
                })?;
                out.push_str(value);
                next_positional += 1;
            }
        }
        last = whole.end();
    }

    out.push_str(&template[last..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_left_to_right() {
        let args = PromptArgs::new().arg("a").arg("b");
        assert_eq!(render("{} then {}", &args).unwrap(), "a then b");
    }

    #[test]
    fn test_named_and_positional_mixed() {
        let args = PromptArgs::new().arg("42").with("name", "Foo");
        assert_eq!(
            render("class {name} has {} fields; {name}!", &args).unwrap(),
            "class Foo has 42 fields; Foo!"
        );
    }

    #[test]
    fn test_values_are_not_rescanned() {
        let args = PromptArgs::new().with("source", "class Foo {}\n{name}");
        assert_eq!(
            render("code:\n{source}", &args).unwrap(),
            "code:\nclass Foo {}\n{name}"
        );
    }

    #[test]
    fn test_json_braces_are_literal() {
        let args = PromptArgs::new();
        let template = r#"reply with {"name": "x", "tasks": []}"#;
        assert_eq!(render(template, &args).unwrap(), template);
    }

    #[test]
    fn test_missing_values_are_errors() {
        assert!(matches!(
            render("{missing}", &PromptArgs::new()),
            Err(TemplateError::MissingVariable(name)) if name == "missing"
        ));
        assert!(matches!(
            render("{} {}", &PromptArgs::new().arg("only one")),
            Err(TemplateError::MissingVariable(_))
        ));
    }
}
