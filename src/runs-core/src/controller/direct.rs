// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{run_path, EngineError, RunsController};
use crate::pool::WorkerPool;
use crate::registry::RunRegistry;

/// Loads runs straight into the registry.
pub struct DirectController {
    registry: Arc<RunRegistry>,
    pool: WorkerPool,
    load_root: PathBuf,
}

impl DirectController {
    /// Load runs from the registry's own root.
    pub fn new(registry: Arc<RunRegistry>, pool: WorkerPool) -> Self {
        let load_root = registry.root().to_path_buf();
        Self::with_load_root(registry, pool, load_root)
    }

    /// Load runs from `load_root` while discovery keeps scanning the
    /// registry root.
    pub fn with_load_root(
        registry: Arc<RunRegistry>,
        pool: WorkerPool,
        load_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            pool,
            load_root: load_root.into(),
        }
    }

    pub fn load_root(&self) -> &Path {
        &self.load_root
    }
}

impl RunsController for DirectController {
    fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    fn pool(&self) -> WorkerPool {
        self.pool
    }

    fn enable_run(&self, name: &str) -> Result<(), EngineError> {
        let path = run_path(&self.load_root, name);
        self.registry.add_run(&path, name)?;
        Ok(())
    }

    fn disable_run(&self, name: &str) -> bool {
        self.registry.remove_run(name)
    }
}
