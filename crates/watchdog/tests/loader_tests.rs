//! Discovery of definition files on a real directory tree.

use std::fs;
use std::path::Path;

use serde_json::json;
use watchdog::definition::{DEFAULT_PATTERN, DefinitionError, discover, load_file};

fn write(dir: &Path, relative: &str, contents: serde_json::Value) {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, serde_json::to_string_pretty(&contents).unwrap()).unwrap();
}

fn definition(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "target": "http://localhost:8080/health",
        "expectations": [{"selector": ".status", "value": "ok", "validation_type": "str"}]
    })
}

#[test]
fn test_discover_walks_tree_in_path_order() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "b/health.watchdog.json", definition("b-health"));
    write(
        dir.path(),
        "a/nested/many.watchdog.json",
        json!([definition("a-one"), definition("a-two")]),
    );
    write(dir.path(), "ignored.json", definition("ignored"));
    fs::write(dir.path().join("notes.watchdog.txt"), "not a definition").unwrap();

    let tests = discover(dir.path(), DEFAULT_PATTERN).unwrap();
    let names: Vec<&str> = tests.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["a-one", "a-two", "b-health"]);
}

#[test]
fn test_discover_with_custom_pattern() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "api-prod.json", definition("prod"));
    write(dir.path(), "api-stage.json", definition("stage"));
    write(dir.path(), "web-prod.json", definition("web"));

    let tests = discover(dir.path(), "api-*.json").unwrap();
    let names: Vec<&str> = tests.iter().map(|t| t.name()).collect();
    assert_eq!(names, vec!["prod", "stage"]);
}

#[test]
fn test_discover_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(discover(dir.path(), DEFAULT_PATTERN).unwrap().is_empty());
}

#[test]
fn test_discover_rejects_duplicate_names() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "one.watchdog.json", definition("same"));
    write(dir.path(), "two.watchdog.json", definition("same"));

    let err = discover(dir.path(), DEFAULT_PATTERN).unwrap_err();
    assert!(matches!(err, DefinitionError::DuplicateName(name) if name == "same"));
}

#[test]
fn test_discover_reports_invalid_definition() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "bad.watchdog.json",
        json!({
            "name": "bad",
            "target": "http://localhost/",
            "expectations": [{"selector": ".x", "value": 1, "validation_type": "decimal"}]
        }),
    );

    let err = discover(dir.path(), DEFAULT_PATTERN).unwrap_err();
    assert!(matches!(err, DefinitionError::UnknownValidationType { ref test, .. } if test == "bad"));
}

#[test]
fn test_load_file_reports_parse_errors_with_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.watchdog.json");
    fs::write(&path, "{ not json").unwrap();

    match load_file(&path) {
        Err(DefinitionError::Parse { path: reported, .. }) => assert_eq!(reported, path),
        other => panic!("expected a parse error, got {other:?}"),
    }
}

#[test]
fn test_load_file_missing() {
    let dir = tempfile::tempdir().unwrap();
    let err = load_file(&dir.path().join("absent.watchdog.json")).unwrap_err();
    assert!(matches!(err, DefinitionError::Read { .. }));
}
