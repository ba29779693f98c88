//! Character-level tokenizer for patch header lines.

use crate::error::{PatchError, PatchResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// `@@`
    Marker,
    /// `--`
    Removal,
    Colon,
    Number(usize),
    Word(String),
    Symbol(char),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// 0-based character offset within the line.
    pub offset: usize,
    /// Length in characters.
    pub len: usize,
}

impl Token {
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Tokenizer over one header line.
///
/// `base` is the character offset of the line within the whole input, so that
/// reported positions refer to the text the caller handed to the parser.
pub struct Lexer<'a> {
    line: &'a str,
    chars: Vec<char>,
    index: usize,
    base: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(line: &'a str, base: usize) -> Self {
        Self {
            line,
            chars: line.chars().collect(),
            index: 0,
            base,
        }
    }

    pub fn tokenize(mut self) -> PatchResult<Vec<Token>> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Characters in the line.
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.index + ahead).copied()
    }

    fn next_token(&mut self) -> PatchResult<Option<Token>> {
        while matches!(self.peek_at(0), Some(c) if c.is_whitespace()) {
            self.index += 1;
        }

        let start = self.index;
        let c = match self.peek_at(0) {
            Some(c) => c,
            None => return Ok(None),
        };

        let kind = match c {
            '@' if self.peek_at(1) == Some('@') => {
                self.index += 2;
                TokenKind::Marker
            }
            '-' if self.peek_at(1) == Some('-') => {
                self.index += 2;
                TokenKind::Removal
            }
            ':' => {
                self.index += 1;
                TokenKind::Colon
            }
            c if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                let value = digits.parse::<usize>().map_err(|_| {
                    PatchError::parse(
                        format!("line number '{}' is out of range", digits),
                        self.line,
                        self.base + start + 1,
                    )
                })?;
                TokenKind::Number(value)
            }
            c if c.is_alphabetic() || c == '_' => {
                TokenKind::Word(self.take_while(|c| c.is_alphanumeric() || c == '_'))
            }
            other => {
                self.index += 1;
                TokenKind::Symbol(other)
            }
        };

        Ok(Some(Token {
            kind,
            offset: start,
            len: self.index - start,
        }))
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.index;
        while matches!(self.peek_at(0), Some(c) if pred(c)) {
            self.index += 1;
        }
        self.chars[start..self.index].iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(line: &str) -> Vec<TokenKind> {
        Lexer::new(line, 0)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_hunk_header_tokens() {
        assert_eq!(
            kinds("@@ replace 12:3 @@"),
            vec![
                TokenKind::Marker,
                TokenKind::Word("replace".to_string()),
                TokenKind::Number(12),
                TokenKind::Colon,
                TokenKind::Number(3),
                TokenKind::Marker,
            ]
        );
    }

    #[test]
    fn test_compact_header_tokens() {
        assert_eq!(kinds("@@insert 1:1@@"), kinds("@@ insert 1 : 1 @@"));
    }

    #[test]
    fn test_path_tokens_keep_offsets() {
        let tokens = Lexer::new("@@ --src/a.rs @@", 0).tokenize().unwrap();
        assert_eq!(tokens[1].kind, TokenKind::Removal);
        assert_eq!(tokens[2].offset, 5);
        assert_eq!(tokens[2].kind, TokenKind::Word("src".to_string()));
        assert_eq!(tokens[3].kind, TokenKind::Symbol('/'));
    }

    #[test]
    fn test_single_at_is_symbol() {
        assert_eq!(
            kinds("@ x"),
            vec![TokenKind::Symbol('@'), TokenKind::Word("x".to_string())]
        );
    }

    #[test]
    fn test_overflowing_number_is_positioned() {
        let err = Lexer::new("@@ insert 99999999999999999999999:1 @@", 4)
            .tokenize()
            .unwrap_err();
        assert_eq!(err.position(), Some(15));
    }
}
