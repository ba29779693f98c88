//! # forge_patch
//!
//! The line-based patch format Forge exchanges with the model.
//!
//! A reply is a sequence of sections, each introduced by a header line:
//!
//! ```text
//! @@ src/Foo.java @@          full content of src/Foo.java
//! @@ --src/Old.java @@        remove src/Old.java
//! @@ replace 3:5 @@           replace lines 3..=5 (inside a file section)
//! ```
//!
//! Headers are parsed by a small tokenizer feeding a recursive-descent
//! parser. Malformed headers fail with the 1-based character position of the
//! offending token so the error can be echoed back to the model verbatim.
//!
//! ```rust
//! use forge_patch::{parse_patch, render_files, SourceFile};
//!
//! let files = vec![SourceFile::new("Foo.java", "class Foo{}")];
//! let patch = parse_patch(&render_files(&files).unwrap()).unwrap();
//! assert_eq!(patch.added, files);
//! ```

pub mod error;
pub mod file_patch;
pub mod header;
pub mod hunk;
pub mod lexer;
mod section;

pub use error::{PatchError, PatchResult};
pub use file_patch::{parse_patch, render_files, render_patch, Patch, SourceFile};
pub use header::{parse_file_header, parse_hunk_header, FileHeader, HunkHeader};
pub use hunk::{apply_hunks, parse_hunks, Hunk, HunkOp};
