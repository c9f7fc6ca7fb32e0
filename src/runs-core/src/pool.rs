// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Bounded fan-out for bulk run loading.
//!
//! Workers are scoped threads: every call spawns at most `workers` of them,
//! drains one shared queue, and joins them all before returning.

use std::collections::VecDeque;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread;

use tracing::{debug, error, warn};

pub const DEFAULT_WORKERS: usize = 4;

/// Per-call outcome of [`WorkerPool::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub succeeded: usize,
    /// Names whose job failed, with the rendered error.
    pub failed: Vec<(String, String)>,
}

impl PoolReport {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed.len()
    }

    fn record(&mut self, name: String, result: Result<(), String>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                warn!("Failed to enable run '{}': {}", name, e);
                self.failed.push((name, e));
            }
        }
    }

    fn merge(&mut self, other: PoolReport) {
        self.succeeded += other.succeeded;
        self.failed.extend(other.failed);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self { workers }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `job` once per name with bounded parallelism.
    ///
    /// A failing (or panicking) job is recorded and never stops the other
    /// names from being processed.
    pub fn run<F, E>(&self, names: Vec<String>, job: F) -> PoolReport
    where
        F: Fn(&str) -> Result<(), E> + Sync,
        E: Display,
    {
        if names.is_empty() {
            return PoolReport::default();
        }
        let workers = self.workers.min(names.len());
        if workers <= 1 {
            return run_sequential(names, &job);
        }

        let queue = Mutex::new(VecDeque::from(names));
        let next = || queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(workers);
            for i in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("runs-worker-{i}"))
                    .spawn_scoped(scope, || {
                        let mut report = PoolReport::default();
                        while let Some(name) = next() {
                            let result = run_job(&job, &name);
                            report.record(name, result);
                        }
                        report
                    });
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(e) => {
                        warn!("Could not spawn worker {}: {}", i, e);
                        break;
                    }
                }
            }
            debug!("Started {} workers", handles.len());

            let mut report = PoolReport::default();
            for handle in handles {
                match handle.join() {
                    Ok(partial) => report.merge(partial),
                    Err(_) => error!("Run worker panicked"),
                }
            }
            // Anything left means no worker could be spawned or all died.
            let leftover: Vec<String> = std::iter::from_fn(&next).collect();
            if !leftover.is_empty() {
                report.merge(run_sequential(leftover, &job));
            }
            report
        })
    }
}

/// Run one job, turning a panic into a failure for `name`.
fn run_job<F, E>(job: &F, name: &str) -> Result<(), String>
where
    F: Fn(&str) -> Result<(), E>,
    E: Display,
{
    match panic::catch_unwind(AssertUnwindSafe(|| job(name))) {
        Ok(result) => result.map_err(|e| e.to_string()),
        Err(_) => {
            error!("Job for run '{}' panicked", name);
            Err("job panicked".to_string())
        }
    }
}

fn run_sequential<F, E>(names: Vec<String>, job: &F) -> PoolReport
where
    F: Fn(&str) -> Result<(), E>,
    E: Display,
{
    let mut report = PoolReport::default();
    for name in names {
        let result = run_job(job, &name);
        report.record(name, result);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("run{i}")).collect()
    }

    #[test]
    fn test_sequential_when_single_worker() {
        let caller = thread::current().id();
        let report = WorkerPool::new(1).run(names(5), |_| {
            assert_eq!(thread::current().id(), caller);
            Ok::<(), String>(())
        });
        assert_eq!(report.succeeded, 5);
    }

    #[test]
    fn test_every_name_runs_once() {
        let seen = Mutex::new(BTreeSet::new());
        let report = WorkerPool::new(4).run(names(20), |name| {
            assert!(seen.lock().expect("seen").insert(name.to_string()));
            Ok::<(), String>(())
        });
        assert_eq!(report.succeeded, 20);
        assert_eq!(seen.lock().expect("seen").len(), 20);
    }

    #[test]
    fn test_parallelism_is_bounded() {
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        WorkerPool::new(3).run(names(12), |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(10));
            active.fetch_sub(1, Ordering::SeqCst);
            Ok::<(), String>(())
        });
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_failures_do_not_stop_others() {
        let report = WorkerPool::new(2).run(names(6), |name| {
            if name == "run3" {
                Err("boom".to_string())
            } else {
                Ok(())
            }
        });
        assert_eq!(report.succeeded, 5);
        assert_eq!(report.failed, vec![("run3".to_string(), "boom".to_string())]);
        assert_eq!(report.attempted(), 6);
    }

    #[test]
    fn test_panicking_job_is_recorded_as_failed() {
        for workers in [1, 3] {
            let report = WorkerPool::new(workers).run(names(6), |name| {
                if name == "run2" {
                    panic!("boom");
                }
                Ok::<(), String>(())
            });
            assert_eq!(report.succeeded, 5);
            assert_eq!(report.failed.len(), 1);
            assert_eq!(report.failed[0].0, "run2");
        }
    }
}
