// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

pub mod accumulator;
pub mod controller;
pub mod pattern;
pub mod pool;
pub mod profile;
pub mod registry;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testutil;

pub type DynResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

pub use accumulator::{
    Accumulator, AccumulatorError, AccumulatorFactory, EventFileAccumulator,
    EventFileAccumulatorFactory, ReloadStats,
};
pub use controller::{
    validate_run_name, BulkOutcome, DirectController, EnablementEngine, EngineError,
    MirrorController, RunEvent, RunState, RunStateMap, RunsController,
};
pub use pattern::{PatternError, RunPattern};
pub use pool::{PoolReport, WorkerPool, DEFAULT_WORKERS};
pub use profile::{ProfileScope, Profiler};
pub use registry::{AddOutcome, Observation, ReloadReport, RunRegistry};
pub use scanner::{most_recent, run_names, scan_runs, DiscoveredRun, ScanError};
