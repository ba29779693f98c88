//! Source Map v3 lookup, used to de-obfuscate console logs.
//!
//! Stack traces of a bundled UI point at `bundle.js:1:4711`. With the
//! bundle's source map the position is rewritten to the generated source
//! file the model knows, e.g. `src/App.tsx:12:5`.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{BrowserError, BrowserResult};

/// Position in an original source. Line and column are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginalPosition {
    pub source: String,
    pub line: u32,
    pub column: u32,
}

#[derive(Debug, Clone, Copy)]
struct Segment {
    generated_column: u32,
    source: u32,
    line: u32,
    column: u32,
}

#[derive(Deserialize)]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    sources: Vec<String>,
    #[serde(default, rename = "sourceRoot")]
    source_root: Option<String>,
    mappings: String,
}

/// A decoded source map.
#[derive(Debug, Clone)]
pub struct SourceMap {
    sources: Vec<String>,
    /// Segments per generated line, sorted by generated column.
    lines: Vec<Vec<Segment>>,
}

fn base64_digit(c: u8) -> Option<i64> {
    let value = match c {
        b'A'..=b'Z' => c - b'A',
        b'a'..=b'z' => c - b'a' + 26,
        b'0'..=b'9' => c - b'0' + 52,
        b'+' => 62,
        b'/' => 63,
        _ => return None,
    };
    Some(value as i64)
}

/// Decode the base64 VLQ values of one segment.
fn decode_vlq(segment: &str) -> BrowserResult<Vec<i64>> {
    let mut values = Vec::new();
    let mut value: i64 = 0;
    let mut shift = 0;
    for c in segment.bytes() {
        let digit = base64_digit(c).ok_or_else(|| {
            BrowserError::InvalidSourceMap(format!("invalid VLQ character {:?}", c as char))
        })?;
        if shift > 60 {
            return Err(BrowserError::InvalidSourceMap("VLQ value overflows".to_string()));
        }
        value += (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            continue;
        }
        let negative = value & 1 == 1;
        value >>= 1;
        values.push(if negative { -value } else { value });
        value = 0;
        shift = 0;
    }
    if shift != 0 {
        return Err(BrowserError::InvalidSourceMap(
            "truncated VLQ value".to_string(),
        ));
    }
    Ok(values)
}

fn apply(base: &mut i64, delta: i64) -> BrowserResult<u32> {
    *base = base
        .checked_add(delta)
        .ok_or_else(|| BrowserError::InvalidSourceMap("position overflows".to_string()))?;
    u32::try_from(*base)
        .map_err(|_| BrowserError::InvalidSourceMap(format!("position {} out of range", base)))
}

impl SourceMap {
    pub fn parse(json: &str) -> BrowserResult<Self> {
        let raw: RawSourceMap = serde_json::from_str(json)?;
        if raw.version != 3 {
            return Err(BrowserError::InvalidSourceMap(format!(
                "unsupported version {}",
                raw.version
            )));
        }

        let root = raw.source_root.unwrap_or_default();
        let sources = raw
            .sources
            .into_iter()
            .map(|s| {
                if root.is_empty() {
                    s
                } else {
                    format!("{}/{}", root.trim_end_matches('/'), s)
                }
            })
            .collect();

        // Source, line and column deltas run across lines; the generated
        // column resets on every line.
        let (mut source, mut line, mut column) = (0i64, 0i64, 0i64);
        let mut lines = Vec::new();
        for generated in raw.mappings.split(';') {
            let mut segments = Vec::new();
            let mut generated_column = 0i64;
            for text in generated.split(',').filter(|s| !s.is_empty()) {
                let values = decode_vlq(text)?;
                let column_in_generated = apply(&mut generated_column, values[0])?;
                if values.len() < 4 {
                    continue;
                }
                segments.push(Segment {
                    generated_column: column_in_generated,
                    source: apply(&mut source, values[1])?,
                    line: apply(&mut line, values[2])?,
                    column: apply(&mut column, values[3])?,
                });
            }
            segments.sort_by_key(|s| s.generated_column);
            lines.push(segments);
        }

        Ok(Self { sources, lines })
    }

    /// Original position of a 1-based generated line and column.
    pub fn lookup(&self, line: u32, column: u32) -> Option<OriginalPosition> {
        let segments = self.lines.get(line.checked_sub(1)? as usize)?;
        let column = column.checked_sub(1)?;
        let index = segments.partition_point(|s| s.generated_column <= column);
        let segment = segments.get(index.checked_sub(1)?)?;
        Some(OriginalPosition {
            source: self.sources.get(segment.source as usize)?.clone(),
            line: segment.line + 1,
            column: segment.column + 1,
        })
    }
}

/// Source maps keyed by the file name of the generated script.
#[derive(Debug, Clone, Default)]
pub struct SourceMaps {
    maps: HashMap<String, SourceMap>,
}

fn location_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z0-9_.\-/:]*?)([A-Za-z0-9_.\-]+\.js):(\d+):(\d+)").ok()
    })
    .as_ref()
}

impl SourceMaps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, script: impl Into<String>, map: SourceMap) {
        self.maps.insert(script.into(), map);
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    /// Build from `(path, json)` pairs of `*.js.map` files, keyed by the
    /// script file name. Maps that do not parse are skipped.
    pub fn from_files<P, J>(files: impl IntoIterator<Item = (P, J)>) -> Self
    where
        P: AsRef<str>,
        J: AsRef<str>,
    {
        let mut maps = Self::new();
        for (path, json) in files {
            let path = path.as_ref();
            let name = path.rsplit('/').next().unwrap_or(path);
            let Some(script) = name.strip_suffix(".map").filter(|s| s.ends_with(".js")) else {
                continue;
            };
            match SourceMap::parse(json.as_ref()) {
                Ok(map) => {
                    debug!("Loaded source map for {}", script);
                    maps.insert(script.to_string(), map);
                }
                Err(e) => warn!("Skipping source map {}: {}", path, e),
            }
        }
        maps
    }

    /// Rewrite every `<script>.js:<line>:<column>` with a known map to its
    /// original position. Unknown locations are left as they are.
    pub fn deobfuscate(&self, text: &str) -> String {
        let Some(pattern) = location_regex().filter(|_| !self.maps.is_empty()) else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &Captures| {
                let original = (|| {
                    let map = self.maps.get(&caps[2])?;
                    let line = caps[3].parse().ok()?;
                    let column = caps[4].parse().ok()?;
                    map.lookup(line, column)
                })();
                match original {
                    Some(pos) => format!("{}:{}:{}", pos.source, pos.line, pos.column),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}
