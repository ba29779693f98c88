//! File patches: `@@ <path> @@` sections carrying full or partial content,
//! and `@@ --<path> @@` sections marking removals.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PatchError, PatchResult};
use crate::header::HeaderParser;
use crate::hunk::{apply_hunks, parse_hunks};
use crate::section::{is_marker_line, split_sections};

/// A source file exchanged with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// Whether the content is a hunk script rather than the full file.
    pub fn is_partial(&self) -> bool {
        self.content
            .lines()
            .find(|l| !l.trim().is_empty())
            .map(|l| {
                is_marker_line(l)
                    && HeaderParser::new(l, 0)
                        .map(|p| p.is_hunk_shaped())
                        .unwrap_or(true)
            })
            .unwrap_or(false)
    }

    /// Full content of the file after this patch, given its current content.
    pub fn resolve(&self, existing: Option<&str>) -> PatchResult<String> {
        if !self.is_partial() {
            return Ok(self.content.clone());
        }
        let existing = existing.ok_or_else(|| {
            PatchError::Apply(format!("{} does not exist, cannot apply hunks", self.path))
        })?;
        let hunks = parse_hunks(&self.content)?;
        apply_hunks(existing, &hunks)
    }
}

/// Parsed model output: files to add or replace and paths to remove.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patch {
    pub added: Vec<SourceFile>,
    pub removed: Vec<String>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn file(&self, path: &str) -> Option<&SourceFile> {
        self.added.iter().find(|f| f.path == path)
    }
}

/// Whether `line` opens a file section.
fn is_file_header(line: &str, offset: usize) -> bool {
    is_marker_line(line)
        && HeaderParser::new(line, offset)
            .map(|p| !p.is_hunk_shaped())
            .unwrap_or(false)
}

/// Parse a file patch from raw model output.
///
/// Hunk headers inside a file section belong to that file's body. Blank
/// input is the empty patch.
pub fn parse_patch(text: &str) -> PatchResult<Patch> {
    if text.trim().is_empty() {
        return Ok(Patch::default());
    }
    let sections = split_sections(text, is_file_header);
    if sections.is_empty() {
        return Err(PatchError::parse(
            "expected file header '@@ <path> @@'",
            text.lines().next().unwrap_or_default(),
            1,
        ));
    }

    let mut patch = Patch::default();
    for section in sections {
        let header = HeaderParser::new(section.header, section.offset)?.file_header()?;
        if header.removed {
            patch.removed.push(header.path);
        } else {
            patch.added.push(SourceFile::new(header.path, section.body));
        }
    }
    debug!(
        "Parsed patch: {} file(s), {} removal(s)",
        patch.added.len(),
        patch.removed.len()
    );
    Ok(patch)
}

/// Header line for `path`, checked to parse back to the same path.
fn header_line(path: &str, removed: bool) -> PatchResult<String> {
    let line = format!("@@ {}{} @@", if removed { "--" } else { "" }, path);
    let parsed = HeaderParser::new(&line, 0)
        .ok()
        .filter(|p| !p.is_hunk_shaped())
        .and_then(|p| p.file_header().ok());
    match parsed {
        Some(header) if header.path == path && header.removed == removed => Ok(line),
        _ => Err(PatchError::Render(format!(
            "path {:?} cannot be written as a file header",
            path
        ))),
    }
}

/// Render files as `@@ <path> @@` sections followed by their full content.
///
/// Fails on content the parser would split, i.e. a line that reads as a
/// file header, so the output always parses back to `files`.
pub fn render_files(files: &[SourceFile]) -> PatchResult<String> {
    let mut out = String::new();
    for file in files {
        let header = header_line(&file.path, false)?;
        for (index, line) in file.content.split('\n').enumerate() {
            if is_file_header(line.trim_end_matches('\r'), 0) {
                return Err(PatchError::Render(format!(
                    "line {} of {} reads as a file header: {}",
                    index + 1,
                    file.path,
                    line.trim_end()
                )));
            }
        }
        out.push_str(&header);
        out.push('\n');
        out.push_str(&file.content);
        out.push('\n');
    }
    Ok(out)
}

/// Render a whole patch, removals last.
pub fn render_patch(patch: &Patch) -> PatchResult<String> {
    let mut out = render_files(&patch.added)?;
    for path in &patch.removed {
        out.push_str(&header_line(path, true)?);
        out.push('\n');
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_files_and_removals() {
        let text = "\
Here is the updated module.
```
@@ src/Foo.java @@
class Foo {}
@@ --src/Old.java @@
@@ src/Bar.java @@
class Bar {}
```
";
        let patch = parse_patch(text).unwrap();
        assert_eq!(
            patch.added,
            vec![
                SourceFile::new("src/Foo.java", "class Foo {}"),
                SourceFile::new("src/Bar.java", "class Bar {}"),
            ]
        );
        assert_eq!(patch.removed, vec!["src/Old.java".to_string()]);
    }

    #[test]
    fn test_partial_file_keeps_hunks_in_body() {
        let text = "@@ a.txt @@\n@@ replace 2:2 @@\nTWO\n@@ b.txt @@\nb\n";
        let patch = parse_patch(text).unwrap();
        assert_eq!(patch.added.len(), 2);

        let a = patch.file("a.txt").unwrap();
        assert!(a.is_partial());
        assert_eq!(a.resolve(Some("one\ntwo\nthree\n")).unwrap(), "one\nTWO\nthree\n");
        assert!(!patch.file("b.txt").unwrap().is_partial());
    }

    #[test]
    fn test_partial_without_existing_file_fails() {
        let file = SourceFile::new("a.txt", "@@ insert 1:1 @@\nx");
        assert!(matches!(file.resolve(None), Err(PatchError::Apply(_))));
    }

    #[test]
    fn test_full_content_ignores_existing() {
        let file = SourceFile::new("a.txt", "new");
        assert_eq!(file.resolve(Some("old")).unwrap(), "new");
    }

    #[test]
    fn test_missing_header_is_positioned() {
        let err = parse_patch("class Foo {}").unwrap_err();
        assert_eq!(err.position(), Some(1));
    }

    #[test]
    fn test_malformed_file_header_position() {
        let text = "@@ a.txt @@\nx\n@@ b.txt\n";
        // "@@ b.txt" starts at character 15 and is 8 long; the end is 23.
        assert_eq!(parse_patch(text).unwrap_err().position(), Some(23));
    }

    #[test]
    fn test_render_patch_parses_back() {
        let patch = Patch {
            added: vec![SourceFile::new("a.txt", "a\n")],
            removed: vec!["gone.txt".to_string()],
        };
        assert_eq!(parse_patch(&render_patch(&patch).unwrap()).unwrap(), patch);
    }

    #[test]
    fn test_empty_input_is_empty_patch() {
        assert!(parse_patch("").unwrap().is_empty());
        assert!(parse_patch(" \n\n").unwrap().is_empty());
        assert_eq!(render_files(&[]).unwrap(), "");
    }

    #[test]
    fn test_render_rejects_header_shaped_content() {
        let notes = SourceFile::new("notes.md", "intro\n@@ -1,3 +1,4 @@\nbody");
        match render_files(&[notes]) {
            Err(PatchError::Render(message)) => {
                assert!(message.contains("line 2 of notes.md"), "{}", message)
            }
            other => panic!("expected render error, got {:?}", other),
        }

        // Hunk headers stay content.
        let script = SourceFile::new("a.txt", "x\n@@ replace 1:1 @@\ny");
        let rendered = render_files(std::slice::from_ref(&script)).unwrap();
        assert_eq!(parse_patch(&rendered).unwrap().added, vec![script]);
    }

    #[test]
    fn test_render_rejects_unwritable_paths() {
        for path in ["", " padded", "--dashes", "replace 1:2"] {
            let file = SourceFile::new(path, "x");
            assert!(
                matches!(render_files(&[file]), Err(PatchError::Render(_))),
                "{:?}",
                path
            );
        }
    }
}
