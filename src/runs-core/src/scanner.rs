// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run discovery over a log root.
//!
//! A run is any directory (the root included) holding at least one file whose
//! name matches the event naming convention
//! `events.out.tfevents.<timestamp>.<host>`. Runs are named by their path
//! relative to the root, joined with `/`.

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

const EVENT_FILE_PATTERN: &str = r"events\.out\.tfevents\.\d*\.\w*";

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cannot scan log root {root}: {source}")]
    RootUnreadable {
        root: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot scan {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A run directory found by [`scan_runs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredRun {
    pub name: String,
    pub path: PathBuf,
    pub modified: SystemTime,
}

fn event_file_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EVENT_FILE_PATTERN).expect("event file pattern is valid"))
}

/// Whether a file name follows the event file naming convention.
pub fn is_event_file(file_name: &str) -> bool {
    event_file_regex().is_match(file_name)
}

/// Render `path` relative to `root` as a run name.
pub fn run_name(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("/")
    }
}

fn into_io(err: walkdir::Error) -> io::Error {
    let message = err.to_string();
    err.into_io_error()
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, message))
}

/// Enumerate every run under `root`, ordered by name.
///
/// Failing to read the root itself is an error, so callers can tell "no
/// runs" from "cannot scan". Entries that disappear while the walk is in
/// progress are skipped.
pub fn scan_runs(root: &Path) -> Result<Vec<DiscoveredRun>, ScanError> {
    let meta = std::fs::metadata(root).map_err(|source| ScanError::RootUnreadable {
        root: root.to_path_buf(),
        source,
    })?;
    if !meta.is_dir() {
        return Err(ScanError::RootUnreadable {
            root: root.to_path_buf(),
            source: io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
        });
    }

    let mut run_dirs: BTreeSet<PathBuf> = BTreeSet::new();
    let walker = WalkDir::new(root)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                if let Some(ancestor) = err.loop_ancestor() {
                    warn!("Skipping symlink loop back to {}", ancestor.display());
                    continue;
                }
                let depth = err.depth();
                let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                let source = into_io(err);
                if depth == 0 {
                    return Err(ScanError::RootUnreadable {
                        root: root.to_path_buf(),
                        source,
                    });
                }
                if source.kind() == io::ErrorKind::NotFound {
                    debug!("{} vanished during scan", path.display());
                    continue;
                }
                return Err(ScanError::Walk { path, source });
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        if is_event_file(&entry.file_name().to_string_lossy()) {
            if let Some(parent) = entry.path().parent() {
                run_dirs.insert(parent.to_path_buf());
            }
        }
    }

    let mut runs: Vec<DiscoveredRun> = run_dirs
        .into_iter()
        .filter_map(|path| {
            // Gone since the walk saw its files: not a run any more.
            let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
            Some(DiscoveredRun {
                name: run_name(root, &path),
                path,
                modified,
            })
        })
        .collect();
    runs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(runs)
}

/// Names of every run under `root`.
pub fn run_names(root: &Path) -> Result<Vec<String>, ScanError> {
    Ok(scan_runs(root)?.into_iter().map(|r| r.name).collect())
}

/// The `n` most recently modified runs; a negative `n` selects all of them.
pub fn most_recent(runs: &[DiscoveredRun], n: i64) -> Vec<DiscoveredRun> {
    let mut sorted = runs.to_vec();
    sorted.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    if n >= 0 {
        sorted.truncate(usize::try_from(n).unwrap_or(usize::MAX));
    }
    sorted
}
