// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-run parsed-log accumulators.
//!
//! The registry treats an accumulator as opaque: it can be opened for a run
//! directory and asked to `reload()`, which pulls whatever has been appended
//! since the previous call. [`EventFileAccumulator`] is the implementation the
//! server ships with; it follows event files at the byte level and leaves
//! record decoding to whoever consumes the data.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::debug;

use crate::scanner::is_event_file;

#[derive(Debug, Error)]
pub enum AccumulatorError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("run directory {0} was deleted")]
    DirectoryDeleted(PathBuf),
}

impl AccumulatorError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_directory_deleted(&self) -> bool {
        matches!(self, Self::DirectoryDeleted(_))
    }
}

/// Counters produced by a single reload pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReloadStats {
    pub files: usize,
    pub new_bytes: u64,
}

/// Parsed state for one run.
///
/// `reload` takes `&self` so the registry can reload a snapshot reference
/// without holding its own lock.
pub trait Accumulator: Send + Sync {
    fn path(&self) -> &Path;

    fn reload(&self) -> Result<ReloadStats, AccumulatorError>;
}

/// Constructs accumulators for run directories.
pub trait AccumulatorFactory: Send + Sync {
    fn open(&self, path: &Path) -> Result<Arc<dyn Accumulator>, AccumulatorError>;
}

#[derive(Debug, Default)]
struct FileCursor {
    offset: u64,
}

/// Follows every event file in one run directory.
#[derive(Debug)]
pub struct EventFileAccumulator {
    path: PathBuf,
    cursors: Mutex<HashMap<PathBuf, FileCursor>>,
}

impl EventFileAccumulator {
    /// Open an accumulator for `path`. The directory must exist.
    pub fn open(path: &Path) -> Result<Self, AccumulatorError> {
        let meta = fs::metadata(path).map_err(|e| AccumulatorError::io(path, e))?;
        if !meta.is_dir() {
            return Err(AccumulatorError::io(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a directory"),
            ));
        }
        Ok(Self {
            path: path.to_path_buf(),
            cursors: Mutex::new(HashMap::new()),
        })
    }

    /// Total bytes consumed so far across all event files.
    pub fn bytes_loaded(&self) -> u64 {
        let cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.values().map(|c| c.offset).sum()
    }

    fn event_files(&self) -> Result<Vec<PathBuf>, AccumulatorError> {
        let entries = match fs::read_dir(&self.path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(AccumulatorError::DirectoryDeleted(self.path.clone()))
            }
            Err(e) => return Err(AccumulatorError::io(&self.path, e)),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| AccumulatorError::io(&self.path, e))?;
            let name = entry.file_name();
            if is_event_file(&name.to_string_lossy()) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_appended(path: &Path, cursor: &mut FileCursor) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < cursor.offset {
        // Truncated or replaced; start over.
        cursor.offset = 0;
    }
    file.seek(SeekFrom::Start(cursor.offset))?;
    let read = io::copy(&mut file.take(len - cursor.offset), &mut io::sink())?;
    cursor.offset += read;
    Ok(read)
}

impl Accumulator for EventFileAccumulator {
    fn path(&self) -> &Path {
        &self.path
    }

    fn reload(&self) -> Result<ReloadStats, AccumulatorError> {
        let files = self.event_files()?;
        let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
        cursors.retain(|path, _| files.contains(path));

        let mut stats = ReloadStats {
            files: files.len(),
            new_bytes: 0,
        };
        for file in &files {
            let cursor = cursors.entry(file.clone()).or_default();
            match read_appended(file, cursor) {
                Ok(n) => stats.new_bytes += n,
                // The file may be rotated away between listing and opening.
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AccumulatorError::io(file, e)),
            }
        }
        debug!(
            "Reloaded {}: {} event files, {} new bytes",
            self.path.display(),
            stats.files,
            stats.new_bytes
        );
        Ok(stats)
    }
}

/// Factory producing [`EventFileAccumulator`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventFileAccumulatorFactory;

impl AccumulatorFactory for EventFileAccumulatorFactory {
    fn open(&self, path: &Path) -> Result<Arc<dyn Accumulator>, AccumulatorError> {
        Ok(Arc::new(EventFileAccumulator::open(path)?))
    }
}
