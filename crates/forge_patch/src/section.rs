//! Splits raw model output into header-introduced sections.

/// One `@@ ... @@` header and the body lines that follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Section<'a> {
    /// Header line without its line terminator.
    pub header: &'a str,
    /// 0-based character offset of the header line in the input.
    pub offset: usize,
    pub body: String,
}

pub(crate) fn is_marker_line(line: &str) -> bool {
    line.trim_start().starts_with("@@")
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Split `text` into sections.
///
/// Lines before the first header are treated as prose and skipped. If a code
/// fence was opened in that prose, a closing fence at the very end of the last
/// body is stripped too. Each body loses exactly one trailing newline, which
/// is the separator the renderer adds after every body.
pub(crate) fn split_sections<'a>(
    text: &'a str,
    is_header: impl Fn(&str, usize) -> bool,
) -> Vec<Section<'a>> {
    let mut sections: Vec<Section<'a>> = Vec::new();
    let mut fenced = false;
    let mut offset = 0;

    for raw in text.split_inclusive('\n') {
        let line = raw.trim_end_matches('\n').trim_end_matches('\r');
        let line_offset = offset;
        offset += raw.chars().count();

        if is_marker_line(line) && is_header(line, line_offset) {
            sections.push(Section {
                header: line,
                offset: line_offset,
                body: String::new(),
            });
            continue;
        }

        match sections.last_mut() {
            Some(section) => section.body.push_str(raw),
            None => {
                if is_fence(line) {
                    fenced = true;
                }
            }
        }
    }

    if fenced {
        if let Some(last) = sections.last_mut() {
            strip_closing_fence(&mut last.body);
        }
    }
    for section in &mut sections {
        if section.body.ends_with('\n') {
            section.body.pop();
        }
    }
    sections
}

fn strip_closing_fence(body: &mut String) {
    let trimmed = body.trim_end();
    let last_line_start = trimmed.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let closing = is_fence(&trimmed[last_line_start..]);
    if closing {
        body.truncate(last_line_start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any(_: &str, _: usize) -> bool {
        true
    }

    #[test]
    fn test_prose_is_skipped() {
        let text = "Here is the change you asked for:\n@@ a.txt @@\nhello\n";
        let sections = split_sections(text, any);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].header, "@@ a.txt @@");
        assert_eq!(sections[0].offset, 34);
        assert_eq!(sections[0].body, "hello");
    }

    #[test]
    fn test_fences_are_stripped() {
        let text = "Sure.\n```\n@@ a.txt @@\nhello\n```\n";
        let sections = split_sections(text, any);
        assert_eq!(sections[0].body, "hello");
    }

    #[test]
    fn test_trailing_fence_kept_without_opening_fence() {
        let text = "@@ README.md @@\n```\n";
        let sections = split_sections(text, any);
        assert_eq!(sections[0].body, "```");
    }

    #[test]
    fn test_no_header_yields_nothing() {
        assert!(split_sections("just prose\n", any).is_empty());
    }
}
