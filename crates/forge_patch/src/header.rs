//! Recursive-descent parser for `@@ ... @@` header lines.
//!
//! ```text
//! hunk-header := "@@" op number ":" number "@@"
//! file-header := "@@" ["--"] path "@@"
//! op          := "insert" | "replace" | "delete"
//! ```

use crate::error::{PatchError, PatchResult};
use crate::hunk::HunkOp;
use crate::lexer::{Lexer, Token, TokenKind};

/// Parsed `@@ <op> <start>:<end> @@` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HunkHeader {
    pub op: HunkOp,
    pub start: usize,
    pub end: usize,
}

/// Parsed `@@ [--]<path> @@` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub path: String,
    pub removed: bool,
}

pub(crate) struct HeaderParser<'a> {
    line: &'a str,
    chars: Vec<char>,
    tokens: Vec<Token>,
    index: usize,
    base: usize,
}

impl<'a> HeaderParser<'a> {
    /// `base` is the 0-based character offset of `line` within the whole input.
    pub fn new(line: &'a str, base: usize) -> PatchResult<Self> {
        let tokens = Lexer::new(line, base).tokenize()?;
        Ok(Self {
            line,
            chars: line.chars().collect(),
            tokens,
            index: 0,
            base,
        })
    }

    /// Whether the line looks like a hunk header rather than a file header.
    pub fn is_hunk_shaped(&self) -> bool {
        matches!(
            (
                self.tokens.first().map(|t| &t.kind),
                self.tokens.get(1).map(|t| &t.kind),
                self.tokens.get(2).map(|t| &t.kind),
            ),
            (
                Some(TokenKind::Marker),
                Some(TokenKind::Word(_)),
                Some(TokenKind::Number(_))
            )
        )
    }

    pub fn hunk_header(mut self) -> PatchResult<HunkHeader> {
        self.expect_marker()?;
        let op = self.operation()?;
        let (start, start_pos) = self.number("start line")?;
        self.expect_colon()?;
        let (end, end_pos) = self.number("end line")?;
        self.expect_closing()?;

        if start == 0 {
            return Err(self.error("line numbers start at 1", start_pos));
        }
        if end < start {
            return Err(self.error(
                format!("end line {} is before start line {}", end, start),
                end_pos,
            ));
        }
        Ok(HunkHeader { op, start, end })
    }

    pub fn file_header(mut self) -> PatchResult<FileHeader> {
        self.expect_marker()?;
        let removed = matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Removal));
        if removed {
            self.index += 1;
        }

        // The path runs up to the final marker and may itself contain spaces.
        let closing = match self.tokens.last() {
            Some(t) if t.kind == TokenKind::Marker && self.tokens.len() > self.index => {
                self.tokens.len() - 1
            }
            _ => return Err(self.error("missing closing '@@'", self.end_position())),
        };
        if closing == self.index {
            return Err(self.error("expected file path", self.position_of(closing)));
        }

        let first = self.tokens[self.index].offset;
        let last = self.tokens[closing - 1].end();
        let path: String = self.chars[first..last].iter().collect();
        Ok(FileHeader { path, removed })
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).cloned();
        if token.is_some() {
            self.index += 1;
        }
        token
    }

    fn position_of(&self, index: usize) -> usize {
        self.base + self.tokens[index].offset + 1
    }

    fn end_position(&self) -> usize {
        self.base + self.chars.len() + 1
    }

    fn error(&self, message: impl Into<String>, position: usize) -> PatchError {
        PatchError::parse(message, self.line, position)
    }

    fn unexpected(&self, expected: &str, token: Option<&Token>) -> PatchError {
        match token {
            Some(t) => {
                let found: String = self.chars[t.offset..t.end()].iter().collect();
                self.error(
                    format!("expected {}, found '{}'", expected, found),
                    self.base + t.offset + 1,
                )
            }
            None => self.error(format!("expected {}", expected), self.end_position()),
        }
    }

    fn expect_marker(&mut self) -> PatchResult<()> {
        match self.advance() {
            Some(t) if t.kind == TokenKind::Marker => Ok(()),
            other => Err(self.unexpected("'@@'", other.as_ref())),
        }
    }

    fn expect_colon(&mut self) -> PatchResult<()> {
        match self.advance() {
            Some(t) if t.kind == TokenKind::Colon => Ok(()),
            other => Err(self.unexpected("':'", other.as_ref())),
        }
    }

    fn expect_closing(&mut self) -> PatchResult<()> {
        match self.advance() {
            Some(t) if t.kind == TokenKind::Marker => {}
            None => return Err(self.error("missing closing '@@'", self.end_position())),
            Some(other) => return Err(self.unexpected("'@@'", Some(&other))),
        }
        match self.peek() {
            None => Ok(()),
            Some(t) => Err(self.unexpected("end of header", Some(t))),
        }
    }

    fn operation(&mut self) -> PatchResult<HunkOp> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Word(word),
                offset,
                ..
            }) => HunkOp::from_str(&word).ok_or_else(|| {
                self.error(
                    format!("unknown operation '{}'", word),
                    self.base + offset + 1,
                )
            }),
            other => Err(self.unexpected("operation", other.as_ref())),
        }
    }

    fn number(&mut self, what: &str) -> PatchResult<(usize, usize)> {
        match self.advance() {
            Some(Token {
                kind: TokenKind::Number(n),
                offset,
                ..
            }) => Ok((n, self.base + offset + 1)),
            other => Err(self.unexpected(what, other.as_ref())),
        }
    }
}

/// Parse a single hunk header line.
pub fn parse_hunk_header(line: &str) -> PatchResult<HunkHeader> {
    HeaderParser::new(line, 0)?.hunk_header()
}

/// Parse a single file header line.
pub fn parse_file_header(line: &str) -> PatchResult<FileHeader> {
    HeaderParser::new(line, 0)?.file_header()
}
