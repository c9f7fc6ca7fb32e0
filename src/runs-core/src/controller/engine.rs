// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Enable/disable policy over a [`RunsController`].
//!
//! The engine never touches accumulators itself. It decides *which* runs to
//! load or evict (from scans, patterns and requested states) and leaves the
//! loading to the controller.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{validate_run_name, BulkOutcome, EngineError, RunsController};
use crate::pattern::RunPattern;
use crate::pool::PoolReport;
use crate::profile::Profiler;
use crate::registry::{Observation, RunRegistry};
use crate::scanner::{most_recent, scan_runs, DiscoveredRun};

pub type RunStateMap = BTreeMap<String, bool>;

pub struct EnablementEngine {
    controller: Arc<dyn RunsController>,
    profiler: Profiler,
    default_regex: String,
}

impl EnablementEngine {
    pub fn new(controller: Arc<dyn RunsController>) -> Self {
        Self {
            controller,
            profiler: Profiler::disabled(),
            default_regex: String::new(),
        }
    }

    pub fn with_profiler(mut self, profiler: Profiler) -> Self {
        self.profiler = profiler;
        self
    }

    pub fn with_default_regex(mut self, regex: impl Into<String>) -> Self {
        self.default_regex = regex.into();
        self
    }

    pub fn default_regex(&self) -> &str {
        &self.default_regex
    }

    pub fn registry(&self) -> &RunRegistry {
        self.controller.registry()
    }

    /// Scan the log root and fold the result into the known-run set.
    ///
    /// Loaded runs whose directory vanished are evicted through the
    /// controller so any staged copy goes with them.
    fn discover(&self) -> Result<(Vec<DiscoveredRun>, Observation), EngineError> {
        let registry = self.registry();
        debug!("Scanning {}", registry.root().display());
        let scan = scan_runs(registry.root())?;
        let observation = registry.observe(&scan);
        for name in &observation.vanished {
            if registry.is_enabled(name) {
                info!("Run '{}' vanished from disk, disabling", name);
                self.controller.disable_run(name);
            }
            registry.mark_removed(name);
        }
        Ok((scan, observation))
    }

    /// Reconcile with disk, optionally enable newly appeared runs, reload
    /// everything, and report which runs are loaded.
    pub fn run_state(&self, enable_new_runs: bool) -> Result<RunStateMap, EngineError> {
        let _scope = self
            .profiler
            .scope("run_state", format!("enable_new_runs={enable_new_runs}"));
        let (scan, observation) = self.discover()?;
        if enable_new_runs && !observation.appeared.is_empty() {
            info!("Enabling {} new runs", observation.appeared.len());
            self.controller.enable_runs(observation.appeared);
        }
        self.registry().reload();
        Ok(self.state_of(&scan))
    }

    /// Loaded flag for every run currently on disk, without reloading.
    pub fn current_state(&self) -> Result<RunStateMap, EngineError> {
        Ok(self.registry().get_run_state()?)
    }

    fn state_of(&self, scan: &[DiscoveredRun]) -> RunStateMap {
        let names: Vec<String> = scan.iter().map(|r| r.name.clone()).collect();
        self.registry().run_state_for(&names)
    }

    /// Load one run. Returns false if it was already loaded.
    pub fn enable_run(&self, name: &str) -> Result<bool, EngineError> {
        validate_run_name(name)?;
        let _scope = self.profiler.scope("enable_run", name);
        if self.registry().is_enabled(name) {
            return Ok(false);
        }
        self.controller.enable_run(name)?;
        if !self.registry().is_enabled(name) {
            return Err(EngineError::Vanished(name.to_string()));
        }
        info!("Enabled run '{}'", name);
        Ok(true)
    }

    /// Evict one run. Returns false if it was not loaded.
    pub fn disable_run(&self, name: &str) -> Result<bool, EngineError> {
        validate_run_name(name)?;
        let _scope = self.profiler.scope("disable_run", name);
        let evicted = self.controller.disable_run(name);
        if evicted {
            info!("Disabled run '{}'", name);
        }
        Ok(evicted)
    }

    fn compile(pattern: &str, substring: Option<&str>) -> Option<RunPattern> {
        let compiled = match substring {
            Some(sub) => RunPattern::with_substring(pattern, sub),
            None => RunPattern::new(pattern),
        };
        match compiled {
            Ok(p) => Some(p),
            Err(e) => {
                warn!("Ignoring bulk request for pattern '{}': {}", pattern, e);
                None
            }
        }
    }

    fn bulk_enable(&self, pattern: &RunPattern) -> BulkOutcome {
        let registry = self.registry();
        let selected: Vec<String> = registry
            .known_names()
            .into_iter()
            .filter(|name| pattern.matches(name) && !registry.is_enabled(name))
            .collect();
        let matched = selected.len();
        let PoolReport { succeeded, failed } = self.controller.enable_runs(selected);
        info!("Bulk enable: {} matched, {} enabled", matched, succeeded);
        BulkOutcome {
            matched,
            enabled: succeeded,
            disabled: 0,
            failed,
        }
    }

    fn bulk_disable(&self, keep: impl Fn(&str) -> bool) -> BulkOutcome {
        let selected: Vec<String> = self
            .registry()
            .enabled_names()
            .into_iter()
            .filter(|name| !keep(name.as_str()))
            .collect();
        let disabled = self.controller.disable_runs(&selected);
        info!("Bulk disable: {} matched, {} disabled", selected.len(), disabled);
        BulkOutcome {
            matched: selected.len(),
            disabled,
            ..BulkOutcome::default()
        }
    }

    /// Enable every known, not yet loaded run whose name matches `pattern`.
    pub fn enable_all(&self, pattern: &str) -> BulkOutcome {
        let _scope = self.profiler.scope("enable_all", pattern);
        match Self::compile(pattern, None) {
            Some(p) => self.bulk_enable(&p),
            None => BulkOutcome::default(),
        }
    }

    pub fn enable_all_substring(&self, pattern: &str, substring: &str) -> BulkOutcome {
        let _scope = self
            .profiler
            .scope("enable_all_substring", format!("{pattern} {substring}"));
        match Self::compile(pattern, Some(substring)) {
            Some(p) => self.bulk_enable(&p),
            None => BulkOutcome::default(),
        }
    }

    /// Disable every loaded run whose name matches `pattern`.
    pub fn disable_all(&self, pattern: &str) -> BulkOutcome {
        let _scope = self.profiler.scope("disable_all", pattern);
        match Self::compile(pattern, None) {
            Some(p) => self.bulk_disable(|name| !p.matches(name)),
            None => BulkOutcome::default(),
        }
    }

    pub fn disable_all_substring(&self, pattern: &str, substring: &str) -> BulkOutcome {
        let _scope = self
            .profiler
            .scope("disable_all_substring", format!("{pattern} {substring}"));
        match Self::compile(pattern, Some(substring)) {
            Some(p) => self.bulk_disable(|name| !p.matches(name)),
            None => BulkOutcome::default(),
        }
    }

    /// Disable every loaded run whose name does *not* match `pattern`.
    pub fn disable_non_matching(&self, pattern: &str) -> BulkOutcome {
        let _scope = self.profiler.scope("disable_non_matching", pattern);
        match Self::compile(pattern, None) {
            Some(p) => self.bulk_disable(|name| p.matches(name)),
            None => BulkOutcome::default(),
        }
    }

    /// Move runs towards a requested name -> enabled map.
    ///
    /// Names the scan does not find are ignored.
    pub fn update_run_state(&self, desired: &RunStateMap) -> Result<RunStateMap, EngineError> {
        let _scope = self
            .profiler
            .scope("update_run_state", format!("{} runs", desired.len()));
        let (scan, _) = self.discover()?;
        let current = self.state_of(&scan);

        let mut to_enable = Vec::new();
        let mut to_disable = Vec::new();
        for (name, &want) in desired {
            match current.get(name) {
                Some(&loaded) if want && !loaded => to_enable.push(name.clone()),
                Some(&loaded) if !want && loaded => to_disable.push(name.clone()),
                Some(_) => {}
                None => debug!("Ignoring requested state for unknown run '{}'", name),
            }
        }
        if !to_disable.is_empty() {
            self.controller.disable_runs(&to_disable);
        }
        if !to_enable.is_empty() {
            self.controller.enable_runs(to_enable);
        }
        Ok(self.state_of(&scan))
    }

    /// Enable the `n` most recently modified runs (all if negative), then run
    /// the first reload sweep.
    pub fn preload_most_recent(&self, n: i64) -> Result<PoolReport, EngineError> {
        let _scope = self.profiler.scope("preload", format!("n={n}"));
        let (scan, _) = self.discover()?;
        let names: Vec<String> = most_recent(&scan, n).into_iter().map(|r| r.name).collect();
        info!("Preloading {} of {} runs", names.len(), scan.len());
        let report = self.controller.enable_runs(names);
        self.registry().reload();
        Ok(report)
    }
}
