// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Run registry: the system of record for which runs are loaded.
//!
//! One mutex guards the name -> entry map. It only ever protects pointer-level
//! map consistency; accumulator construction and `reload()` always run with
//! the lock released, on references copied out of the map first.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, info, warn};

use crate::accumulator::{Accumulator, AccumulatorError, AccumulatorFactory};
use crate::controller::machine::{RunEvent, RunState};
use crate::scanner::{scan_runs, DiscoveredRun, ScanError};

struct RunEntry {
    path: PathBuf,
    state: RunState,
    accumulator: Option<Arc<dyn Accumulator>>,
}

impl RunEntry {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            state: RunState::Unknown,
            accumulator: None,
        }
    }

    fn mark_loaded(&mut self, path: &Path, accumulator: Arc<dyn Accumulator>) {
        // A concurrent disable may have moved us out of Enabling; the install
        // is the later write and wins.
        if self.state != RunState::Enabling {
            self.state.apply(RunEvent::EnableRequested);
        }
        self.state.apply(RunEvent::Loaded);
        self.path = path.to_path_buf();
        self.accumulator = Some(accumulator);
    }
}

/// Result of [`RunRegistry::add_run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// An accumulator for a different path was replaced.
    Replaced,
    /// Already loaded from the same path; nothing was done.
    AlreadyLoaded,
}

/// Result of [`RunRegistry::reload`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadReport {
    pub reloaded: usize,
    pub failed: usize,
    pub removed: Vec<String>,
}

/// Result of [`RunRegistry::observe`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Names not known before this scan.
    pub appeared: Vec<String>,
    /// Known names the scan no longer reports.
    pub vanished: Vec<String>,
}

pub struct RunRegistry {
    root: PathBuf,
    factory: Arc<dyn AccumulatorFactory>,
    runs: Mutex<BTreeMap<String, RunEntry>>,
    reload_called: AtomicBool,
}

impl RunRegistry {
    /// Create an empty registry whose run-state view scans `root`.
    pub fn new(root: impl Into<PathBuf>, factory: Arc<dyn AccumulatorFactory>) -> Self {
        Self {
            root: root.into(),
            factory,
            runs: Mutex::new(BTreeMap::new()),
            reload_called: AtomicBool::new(false),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, RunEntry>> {
        // Every mutation is a single insert/take, so a poisoned map is still
        // structurally sound.
        self.runs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Load the run `name` from `path`.
    ///
    /// The accumulator is constructed with the lock released. If a global
    /// reload has already happened, the new accumulator is reloaded once
    /// before returning so it is consistent with its peers.
    pub fn add_run(&self, path: &Path, name: &str) -> Result<AddOutcome, AccumulatorError> {
        let (replacing, was_known) = {
            let mut runs = self.lock();
            let entry = runs
                .entry(name.to_string())
                .or_insert_with(|| RunEntry::new(path));
            if entry.accumulator.is_some() && entry.path == path {
                return Ok(AddOutcome::AlreadyLoaded);
            }
            let replacing = entry.accumulator.is_some();
            let was_known = is_known(entry.state);
            if replacing {
                warn!(
                    "Conflict for name {}: old path {}, new path {}",
                    name,
                    entry.path.display(),
                    path.display()
                );
            }
            entry.state.apply(RunEvent::EnableRequested);
            (replacing, was_known)
        };

        info!("Constructing accumulator for {}", path.display());
        let accumulator = match self.factory.open(path) {
            Ok(acc) => acc,
            Err(e) => {
                let mut runs = self.lock();
                let forget = match runs.get_mut(name) {
                    Some(entry) if entry.state == RunState::Enabling => {
                        if entry.accumulator.is_some() {
                            // Keep serving the accumulator we failed to replace.
                            entry.state.apply(RunEvent::Loaded);
                            false
                        } else {
                            entry.state.apply(RunEvent::LoadFailed);
                            // Never scanned: the entry only existed for this call.
                            !was_known
                        }
                    }
                    _ => false,
                };
                if forget {
                    runs.remove(name);
                }
                return Err(e);
            }
        };

        self.lock()
            .entry(name.to_string())
            .or_insert_with(|| RunEntry::new(path))
            .mark_loaded(path, accumulator.clone());

        if self.reload_called.load(Ordering::SeqCst) {
            self.reload_one(name, &accumulator);
        }

        Ok(if replacing {
            AddOutcome::Replaced
        } else {
            AddOutcome::Added
        })
    }

    fn reload_one(&self, name: &str, accumulator: &Arc<dyn Accumulator>) {
        match accumulator.reload() {
            Ok(_) => {}
            Err(e) if e.is_directory_deleted() => {
                self.purge(name, accumulator);
            }
            Err(e) => error!("Unable to reload accumulator '{}': {}", name, e),
        }
    }

    /// Drop `name`'s accumulator if it is still `accumulator`.
    fn purge(&self, name: &str, accumulator: &Arc<dyn Accumulator>) -> bool {
        let mut runs = self.lock();
        let Some(entry) = runs.get_mut(name) else {
            return false;
        };
        let same = entry
            .accumulator
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, accumulator));
        if !same {
            return false;
        }
        warn!("Deleting accumulator '{}'", name);
        runs.remove(name);
        true
    }

    /// Evict `name`'s accumulator. Returns false if it was not loaded.
    pub fn remove_run(&self, name: &str) -> bool {
        let mut runs = self.lock();
        let Some(entry) = runs.get_mut(name) else {
            return false;
        };
        entry.state.apply(RunEvent::DisableRequested);
        if entry.accumulator.take().is_some() {
            info!("Deleting accumulator '{}'", name);
            true
        } else {
            false
        }
    }

    /// Evict `name` and forget it; its directory is gone.
    pub fn mark_removed(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Reload every loaded accumulator.
    ///
    /// Works on a snapshot taken under the lock, reloads with the lock
    /// released, then re-locks once to purge runs whose directory is gone.
    /// Runs added while the sweep is in progress may or may not be reloaded
    /// by it.
    pub fn reload(&self) -> ReloadReport {
        info!("Beginning registry reload");
        self.reload_called.store(true, Ordering::SeqCst);
        let items: Vec<(String, Arc<dyn Accumulator>)> = self
            .lock()
            .iter()
            .filter_map(|(name, entry)| {
                entry
                    .accumulator
                    .as_ref()
                    .map(|acc| (name.clone(), acc.clone()))
            })
            .collect();

        let mut report = ReloadReport::default();
        let mut to_delete = Vec::new();
        for (name, accumulator) in items {
            match accumulator.reload() {
                Ok(_) => report.reloaded += 1,
                Err(AccumulatorError::DirectoryDeleted(_)) => to_delete.push((name, accumulator)),
                Err(e) => {
                    error!("Unable to reload accumulator '{}': {}", name, e);
                    report.failed += 1;
                }
            }
        }

        for (name, accumulator) in to_delete {
            if self.purge(&name, &accumulator) {
                report.removed.push(name);
            }
        }
        info!(
            "Finished registry reload ({} reloaded, {} failed, {} removed)",
            report.reloaded,
            report.failed,
            report.removed.len()
        );
        report
    }

    /// Whether a global reload has happened yet.
    pub fn has_reloaded(&self) -> bool {
        self.reload_called.load(Ordering::SeqCst)
    }

    /// For every run a fresh scan of the root finds, whether it is loaded.
    pub fn get_run_state(&self) -> Result<BTreeMap<String, bool>, ScanError> {
        let names: Vec<String> = scan_runs(&self.root)?.into_iter().map(|r| r.name).collect();
        Ok(self.run_state_for(&names))
    }

    /// Loaded flag for each name, under a single lock acquisition.
    pub fn run_state_for(&self, names: &[String]) -> BTreeMap<String, bool> {
        let runs = self.lock();
        names
            .iter()
            .map(|name| {
                let loaded = runs.get(name).is_some_and(|e| e.accumulator.is_some());
                (name.clone(), loaded)
            })
            .collect()
    }

    /// Reconcile the known-run set with a scan result.
    ///
    /// New names become Disabled. Known names missing from the scan and not
    /// loaded are dropped; loaded ones are left to the caller (and to the
    /// next reload, which sees their directory gone).
    pub fn observe(&self, scan: &[DiscoveredRun]) -> Observation {
        let mut observation = Observation::default();
        let scanned: BTreeSet<&str> = scan.iter().map(|r| r.name.as_str()).collect();
        let mut runs = self.lock();

        for run in scan {
            let entry = runs
                .entry(run.name.clone())
                .or_insert_with(|| RunEntry::new(&run.path));
            if entry.state.apply(RunEvent::Observed) {
                if entry.accumulator.is_none() {
                    entry.path = run.path.clone();
                }
                observation.appeared.push(run.name.clone());
            }
        }

        runs.retain(|name, entry| {
            if scanned.contains(name.as_str()) || !is_known(entry.state) {
                return true;
            }
            observation.vanished.push(name.clone());
            entry.accumulator.is_some()
        });
        observation
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.lock()
            .get(name)
            .is_some_and(|e| e.accumulator.is_some())
    }

    pub fn state(&self, name: &str) -> RunState {
        self.lock().get(name).map(|e| e.state).unwrap_or_default()
    }

    /// Names from the most recent observation that still exist.
    pub fn known_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, e)| is_known(e.state))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn enabled_names(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, e)| e.accumulator.is_some())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn enabled_count(&self) -> usize {
        self.lock()
            .values()
            .filter(|e| e.accumulator.is_some())
            .count()
    }

    /// Number of names the registry tracks, loaded or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn accumulator(&self, name: &str) -> Option<Arc<dyn Accumulator>> {
        self.lock().get(name).and_then(|e| e.accumulator.clone())
    }

    /// Name -> path for every run the registry has seen.
    pub fn run_paths(&self) -> BTreeMap<String, PathBuf> {
        self.lock()
            .iter()
            .map(|(name, e)| (name.clone(), e.path.clone()))
            .collect()
    }
}

fn is_known(state: RunState) -> bool {
    !matches!(state, RunState::Unknown | RunState::Removed)
}
