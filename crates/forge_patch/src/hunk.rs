//! Line-range hunks: `@@ <op> <start>:<end> @@` followed by body lines.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PatchError, PatchResult};
use crate::header::{HeaderParser, HunkHeader};
use crate::section::split_sections;

/// Edit operation of a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HunkOp {
    /// Insert the body before line `start`.
    Insert,
    /// Replace lines `start..=end` with the body.
    Replace,
    /// Delete lines `start..=end`.
    Delete,
}

impl HunkOp {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "replace" => Some(Self::Replace),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for HunkOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed hunk. Line numbers are 1-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    pub op: HunkOp,
    pub start: usize,
    pub end: usize,
    pub content: String,
}

impl Hunk {
    pub fn new(op: HunkOp, start: usize, end: usize, content: impl Into<String>) -> Self {
        Self {
            op,
            start,
            end,
            content: content.into(),
        }
    }

    fn from_header(header: HunkHeader, content: String) -> Self {
        Self::new(header.op, header.start, header.end, content)
    }

    /// Render back to the wire format.
    pub fn render(&self) -> String {
        format!(
            "@@ {} {}:{} @@\n{}\n",
            self.op, self.start, self.end, self.content
        )
    }

    /// Original lines touched by this hunk, as a half-open 0-based range.
    fn span(&self) -> (usize, usize) {
        match self.op {
            HunkOp::Insert => (self.start - 1, self.start - 1),
            _ => (self.start - 1, self.end),
        }
    }
}

/// Parse every hunk in `text`.
///
/// Prose before the first header is skipped. Every header must be a valid
/// hunk header; a malformed one fails with its position in `text`.
pub fn parse_hunks(text: &str) -> PatchResult<Vec<Hunk>> {
    let sections = split_sections(text, |_, _| true);
    if sections.is_empty() {
        return Err(PatchError::parse(
            "expected hunk header '@@ <op> <start>:<end> @@'",
            text.lines().next().unwrap_or_default(),
            1,
        ));
    }

    let mut hunks = Vec::with_capacity(sections.len());
    for section in sections {
        let header = HeaderParser::new(section.header, section.offset)?.hunk_header()?;
        hunks.push(Hunk::from_header(header, section.body));
    }
    debug!("Parsed {} hunk(s)", hunks.len());
    Ok(hunks)
}

/// Apply hunks to `original`.
///
/// Ranges refer to the original text, so hunks are applied from the bottom up.
/// Overlapping or out-of-range hunks are rejected.
pub fn apply_hunks(original: &str, hunks: &[Hunk]) -> PatchResult<String> {
    let mut lines: Vec<&str> = original.lines().collect();
    let line_count = lines.len();

    let mut ordered: Vec<&Hunk> = hunks.iter().collect();
    ordered.sort_by_key(|h| (h.start, h.op != HunkOp::Insert));

    let mut previous_end = 0;
    for (i, hunk) in ordered.iter().enumerate() {
        let in_range = match hunk.op {
            HunkOp::Insert => hunk.start >= 1 && hunk.start <= line_count + 1,
            _ => hunk.start >= 1 && hunk.start <= hunk.end && hunk.end <= line_count,
        };
        if !in_range {
            return Err(PatchError::Apply(format!(
                "{} {}:{} is outside a {}-line file",
                hunk.op, hunk.start, hunk.end, line_count
            )));
        }

        let (start, end) = hunk.span();
        if i > 0 && start < previous_end {
            return Err(PatchError::Apply(format!(
                "{} {}:{} overlaps a previous hunk",
                hunk.op, hunk.start, hunk.end
            )));
        }
        previous_end = end;
    }

    for hunk in ordered.iter().rev() {
        let (start, end) = hunk.span();
        let replacement: Vec<&str> = match hunk.op {
            HunkOp::Delete => Vec::new(),
            _ => hunk.content.lines().collect(),
        };
        lines.splice(start..end, replacement);
    }

    let mut result = lines.join("\n");
    if !result.is_empty() && (original.is_empty() || original.ends_with('\n')) {
        result.push('\n');
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "one\ntwo\nthree\nfour\n";

    #[test]
    fn test_parse_hunks_with_prose() {
        let text = "I changed two lines.\n@@ replace 2:2 @@\nTWO\n@@ delete 4:4 @@\n";
        let hunks = parse_hunks(text).unwrap();
        assert_eq!(
            hunks,
            vec![
                Hunk::new(HunkOp::Replace, 2, 2, "TWO"),
                Hunk::new(HunkOp::Delete, 4, 4, ""),
            ]
        );
    }

    #[test]
    fn test_parse_hunks_reports_absolute_position() {
        let text = "@@ insert 1:1 @@\nx\n@@ change 1:1 @@\n";
        let err = parse_hunks(text).unwrap_err();
        // Second header starts at character 20; "change" is 3 further in.
        assert_eq!(err.position(), Some(23));
        match err {
            PatchError::Parse { text, .. } => assert_eq!(text, "@@ change 1:1 @@"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_parse_hunks_requires_header() {
        assert_eq!(parse_hunks("no edits").unwrap_err().position(), Some(1));
    }

    #[test]
    fn test_apply_mixed_hunks() {
        let hunks = vec![
            Hunk::new(HunkOp::Replace, 2, 3, "2\n3"),
            Hunk::new(HunkOp::Insert, 1, 1, "zero"),
            Hunk::new(HunkOp::Delete, 4, 4, ""),
        ];
        let result = apply_hunks(SOURCE, &hunks).unwrap();
        assert_eq!(result, "zero\none\n2\n3\n");
    }

    #[test]
    fn test_insert_appends_past_last_line() {
        let hunks = vec![Hunk::new(HunkOp::Insert, 5, 5, "five")];
        assert_eq!(
            apply_hunks(SOURCE, &hunks).unwrap(),
            "one\ntwo\nthree\nfour\nfive\n"
        );
    }

    #[test]
    fn test_inserts_at_same_line_keep_order() {
        let hunks = vec![
            Hunk::new(HunkOp::Insert, 2, 2, "a"),
            Hunk::new(HunkOp::Insert, 2, 2, "b"),
        ];
        assert_eq!(
            apply_hunks("x\ny\n", &hunks).unwrap(),
            "x\na\nb\ny\n"
        );
    }

    #[test]
    fn test_overlap_rejected() {
        let hunks = vec![
            Hunk::new(HunkOp::Replace, 1, 2, "x"),
            Hunk::new(HunkOp::Delete, 2, 3, ""),
        ];
        assert!(matches!(
            apply_hunks(SOURCE, &hunks),
            Err(PatchError::Apply(_))
        ));
    }

    #[test]
    fn test_out_of_range_rejected() {
        let hunks = vec![Hunk::new(HunkOp::Replace, 4, 5, "x")];
        assert!(matches!(
            apply_hunks(SOURCE, &hunks),
            Err(PatchError::Apply(_))
        ));
    }

    #[test]
    fn test_render_parses_back() {
        let hunk = Hunk::new(HunkOp::Replace, 3, 7, "fn main() {}\n");
        assert_eq!(parse_hunks(&hunk.render()).unwrap(), vec![hunk]);
    }
}
