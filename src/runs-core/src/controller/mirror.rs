// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Working-copy controller for log roots that cannot be served in place.
//!
//! Enabling a run copies its event files and JSON sidecars from the real root
//! into the working root, then hands the run to the wrapped controller (whose
//! load root is the working root). Disabling evicts first and then removes
//! the copies. The real root is never written to.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{run_path, EngineError, RunsController};
use crate::pool::WorkerPool;
use crate::registry::RunRegistry;

const EVENT_FILE_PREFIX: &str = "events.out.tfevents.";

fn is_staged_file(file_name: &str) -> bool {
    file_name.starts_with(EVENT_FILE_PREFIX) || file_name.ends_with(".json")
}

pub struct MirrorController<C> {
    real_root: PathBuf,
    working_root: PathBuf,
    inner: C,
}

impl<C: RunsController> MirrorController<C> {
    pub fn new(real_root: impl Into<PathBuf>, working_root: impl Into<PathBuf>, inner: C) -> Self {
        Self {
            real_root: real_root.into(),
            working_root: working_root.into(),
            inner,
        }
    }

    pub fn real_root(&self) -> &Path {
        &self.real_root
    }

    pub fn working_root(&self) -> &Path {
        &self.working_root
    }

    /// Copy run `name` into the working root. Returns the number of files
    /// copied.
    pub fn stage(&self, name: &str) -> io::Result<usize> {
        let src = run_path(&self.real_root, name);
        let dst = run_path(&self.working_root, name);
        debug!("Staging {} -> {}", src.display(), dst.display());
        let entries = fs::read_dir(&src)?;
        fs::create_dir_all(&dst)?;

        let mut copied = 0;
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name();
            if !is_staged_file(&file_name.to_string_lossy()) {
                continue;
            }
            // Follow symlinks: the target's contents are what gets staged.
            if !fs::metadata(entry.path())?.is_file() {
                continue;
            }
            fs::copy(entry.path(), dst.join(&file_name))?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Remove the staged copy of run `name`.
    ///
    /// Only staged files are deleted. The directory goes too unless it still
    /// holds something else, such as a nested run.
    pub fn unstage(&self, name: &str) -> io::Result<()> {
        let dst = run_path(&self.working_root, name);
        let entries = match fs::read_dir(&dst) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() && is_staged_file(&entry.file_name().to_string_lossy())
            {
                fs::remove_file(entry.path())?;
            }
        }
        if dst != self.working_root {
            if let Err(e) = fs::remove_dir(&dst) {
                debug!("Keeping {}: {}", dst.display(), e);
            }
        }
        Ok(())
    }
}

impl<C: RunsController> RunsController for MirrorController<C> {
    fn registry(&self) -> &RunRegistry {
        self.inner.registry()
    }

    fn pool(&self) -> WorkerPool {
        self.inner.pool()
    }

    fn enable_run(&self, name: &str) -> Result<(), EngineError> {
        self.stage(name).map_err(|source| EngineError::Mirror {
            run: name.to_string(),
            source,
        })?;
        if let Err(e) = self.inner.enable_run(name) {
            if let Err(cleanup) = self.unstage(name) {
                warn!("Failed to remove staged copy of '{}': {}", name, cleanup);
            }
            return Err(e);
        }
        Ok(())
    }

    fn disable_run(&self, name: &str) -> bool {
        let evicted = self.inner.disable_run(name);
        if let Err(e) = self.unstage(name) {
            warn!("Failed to remove staged copy of '{}': {}", name, e);
        }
        evicted
    }
}
