//! Cleanup of model replies before they are treated as code or patches.

const FENCE: &str = "```";

/// Line prefixes that mark the start of code in a reply.
const CODE_START: &[&str] = &[
    FENCE,
    "@@",
    "import ",
    "package ",
    "class ",
    "public class ",
    "abstract class ",
    "interface ",
    "enum ",
    "export ",
    "{",
    "[",
    "//",
    "/*",
    "<!--",
];

fn is_code_start(line: &str) -> bool {
    let trimmed = line.trim_start();
    CODE_START.iter().any(|token| trimmed.starts_with(token))
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with(FENCE)
}

/// Skip leading prose up to the first code-start line, then strip the
/// surrounding code fence if present.
///
/// A reply without any recognizable code start is returned trimmed.
pub fn sanitize_code(reply: &str) -> String {
    let lines: Vec<&str> = reply.lines().collect();
    let Some(start) = lines.iter().position(|l| is_code_start(l)) else {
        return reply.trim().to_string();
    };

    let mut body = &lines[start..];
    let opened = body.first().map(|l| is_fence(l)).unwrap_or(false);
    if opened {
        body = &body[1..];
    }

    // Closing fence, and any chatter the model appended after it.
    if opened {
        if let Some(close) = body.iter().rposition(|l| is_fence(l)) {
            body = &body[..close];
        }
    } else if let Some(last) = body.iter().rposition(|l| !l.trim().is_empty()) {
        if is_fence(body[last]) {
            body = &body[..last];
        }
    }

    let mut out = body.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prose_and_fence_removed() {
        let reply = "Sure! Here is the class:\n```java\nclass Foo {}\n```\nLet me know.";
        assert_eq!(sanitize_code(reply), "class Foo {}\n");
    }

    #[test]
    fn test_plain_code_untouched() {
        assert_eq!(sanitize_code("class Foo{}"), "class Foo{}\n");
    }

    #[test]
    fn test_patch_header_is_code_start() {
        let reply = "Updated:\n@@ Foo.java @@\nclass Foo {}\n```";
        assert_eq!(sanitize_code(reply), "@@ Foo.java @@\nclass Foo {}\n");
    }

    #[test]
    fn test_comment_starts_code() {
        let reply = "Explanation first.\n// Foo.java\nclass Foo {}";
        assert_eq!(sanitize_code(reply), "// Foo.java\nclass Foo {}\n");
    }

    #[test]
    fn test_json_reply() {
        let reply = "Here is the plan:\n```json\n{\"tasks\": []}\n```";
        assert_eq!(sanitize_code(reply), "{\"tasks\": []}\n");
    }

    #[test]
    fn test_no_code_returns_trimmed() {
        assert_eq!(sanitize_code("  nothing to see  "), "nothing to see");
    }
}
