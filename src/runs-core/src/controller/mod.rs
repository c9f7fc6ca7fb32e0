// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run enablement: controllers that load and evict runs, and the engine that
//! applies enable/disable policy on top of them.

mod direct;
mod engine;
pub mod machine;
mod mirror;

use std::io;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::accumulator::AccumulatorError;
use crate::pool::{PoolReport, WorkerPool};
use crate::registry::RunRegistry;
use crate::scanner::ScanError;

pub use direct::DirectController;
pub use engine::{EnablementEngine, RunStateMap};
pub use machine::{RunEvent, RunState};
pub use mirror::MirrorController;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid run name '{0}'")]
    InvalidRunName(String),

    #[error(transparent)]
    Accumulator(#[from] AccumulatorError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("run '{0}' disappeared while loading")]
    Vanished(String),

    #[error("cannot mirror run '{run}': {source}")]
    Mirror {
        run: String,
        #[source]
        source: io::Error,
    },
}

/// Counts from one bulk enable/disable call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    /// Names the predicate selected.
    pub matched: usize,
    pub enabled: usize,
    pub disabled: usize,
    pub failed: Vec<(String, String)>,
}

/// Loads and evicts runs by name.
///
/// Two variants exist: [`DirectController`] installs accumulators straight
/// from the log root, and [`MirrorController`] stages a working copy of the
/// run first.
pub trait RunsController: Send + Sync {
    fn registry(&self) -> &RunRegistry;

    fn pool(&self) -> WorkerPool;

    fn enable_run(&self, name: &str) -> Result<(), EngineError>;

    /// Evict `name`. Returns false if it was not loaded.
    fn disable_run(&self, name: &str) -> bool;

    fn enable_runs(&self, names: Vec<String>) -> PoolReport {
        self.pool().run(names, |name| self.enable_run(name))
    }

    fn disable_runs(&self, names: &[String]) -> usize {
        names.iter().filter(|name| self.disable_run(name)).count()
    }
}

/// Check that `name` is a relative path that stays inside the log root.
pub fn validate_run_name(name: &str) -> Result<(), EngineError> {
    if name == "." {
        return Ok(());
    }
    let invalid = || EngineError::InvalidRunName(name.to_string());
    if name.is_empty() {
        return Err(invalid());
    }
    let mut normal = 0;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(invalid())
            }
        }
    }
    if normal == 0 {
        return Err(invalid());
    }
    Ok(())
}

/// Directory of run `name` under `root`.
pub(crate) fn run_path(root: &Path, name: &str) -> PathBuf {
    if name == "." {
        root.to_path_buf()
    } else {
        root.join(name)
    }
}
