//! Property tests: rendered files always parse back unchanged.

use forge_patch::{parse_patch, render_files, PatchError, SourceFile};
use proptest::prelude::*;

fn path() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,7}(/[a-z0-9_]{1,8}){0,2}\\.[a-z]{1,4}"
}

/// Files whose content never contains `@`.
fn plain_files() -> impl Strategy<Value = Vec<SourceFile>> {
    proptest::collection::vec(
        (path(), "[^@]{0,80}").prop_map(|(path, content)| SourceFile::new(path, content)),
        0..6,
    )
}

/// Files whose lines often start with markers, valid or not.
fn marker_files() -> impl Strategy<Value = Vec<SourceFile>> {
    let line = prop_oneof![
        "[a-z {}();]{0,20}",
        Just("@@".to_string()),
        "@@ (insert|replace|delete) [0-9]{1,2}:[0-9]{1,2} @@",
        "@@ [a-z./ -]{0,12} @@",
        "@@ --[a-z.]{1,8} @@",
        " *@@[a-z ,+-]{0,10}",
    ];
    let content = proptest::collection::vec(line, 0..6).prop_map(|lines| lines.join("\n"));
    proptest::collection::vec(
        (path(), content).prop_map(|(path, content)| SourceFile::new(path, content)),
        0..4,
    )
}

proptest! {
    #[test]
    fn prop_plain_files_round_trip(files in plain_files()) {
        let rendered = render_files(&files).unwrap();
        let patch = parse_patch(&rendered).unwrap();
        prop_assert_eq!(patch.added, files);
        prop_assert!(patch.removed.is_empty());
    }

    #[test]
    fn prop_rendered_output_is_never_misread(files in marker_files()) {
        match render_files(&files) {
            Ok(rendered) => {
                let patch = parse_patch(&rendered).unwrap();
                prop_assert_eq!(patch.added, files);
            }
            Err(PatchError::Render(_)) => {}
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }
}

#[test]
fn test_empty_set_round_trips() {
    let rendered = render_files(&[]).unwrap();
    assert!(parse_patch(&rendered).unwrap().added.is_empty());
}
