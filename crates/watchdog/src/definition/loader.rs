//! Discovery of test definition files on disk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{DefinitionError, TestDefinition, WatchdogTest};

/// File name pattern used when none is given
pub const DEFAULT_PATTERN: &str = "*.watchdog.json";

/// A definition file holds a single test or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    One(TestDefinition),
    Many(Vec<TestDefinition>),
}

/// Load and check every test defined in one file
pub fn load_file(path: &Path) -> Result<Vec<WatchdogTest>, DefinitionError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| DefinitionError::Read { path: path.to_path_buf(), source })?;
    let parsed: DefinitionFile = serde_json::from_str(&raw)
        .map_err(|source| DefinitionError::Parse { path: path.to_path_buf(), source })?;

    let definitions = match parsed {
        DefinitionFile::One(definition) => vec![definition],
        DefinitionFile::Many(definitions) => definitions,
    };

    definitions.into_iter().map(WatchdogTest::from_definition).collect()
}

/// Recursively find files under `root` whose name matches `pattern` and load
/// them, ordered by path.
///
/// Fails on the first unreadable or invalid definition, and on test names
/// used more than once.
pub fn discover(root: &Path, pattern: &str) -> Result<Vec<WatchdogTest>, DefinitionError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry =
            entry.map_err(|source| DefinitionError::Walk { path: root.to_path_buf(), source })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let matched = entry
            .file_name()
            .to_str()
            .is_some_and(|name| wildcard_match(pattern, name));
        if matched {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut tests = Vec::new();
    let mut names = HashSet::new();
    for path in &paths {
        debug!("Loading test definitions from {}", path.display());
        for test in load_file(path)? {
            if !names.insert(test.name().to_string()) {
                return Err(DefinitionError::DuplicateName(test.name().to_string()));
            }
            tests.push(test);
        }
    }

    info!("Discovered {} tests in {} files under {}", tests.len(), paths.len(), root.display());
    Ok(tests)
}

/// Match `name` against a pattern where `*` is any run of characters and `?`
/// exactly one character
pub(crate) fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();

    let (mut p, mut n) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == '?' || c == name[n] => {
                p += 1;
                n += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    n = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
