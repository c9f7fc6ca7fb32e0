// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! In-memory accumulators for registry and engine tests.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::accumulator::{Accumulator, AccumulatorError, AccumulatorFactory, ReloadStats};

pub struct FakeAccumulator {
    path: PathBuf,
    pub reloads: AtomicUsize,
    pub fail_io: AtomicBool,
}

impl Accumulator for FakeAccumulator {
    fn path(&self) -> &Path {
        &self.path
    }

    fn reload(&self) -> Result<ReloadStats, AccumulatorError> {
        self.reloads.fetch_add(1, Ordering::SeqCst);
        if !self.path.exists() {
            return Err(AccumulatorError::DirectoryDeleted(self.path.clone()));
        }
        if self.fail_io.load(Ordering::SeqCst) {
            return Err(AccumulatorError::io(
                &self.path,
                io::Error::new(io::ErrorKind::Other, "flaky disk"),
            ));
        }
        Ok(ReloadStats::default())
    }
}

/// Factory that records every accumulator it builds.
#[derive(Default)]
pub struct FakeFactory {
    pub opened: AtomicUsize,
    pub built: Mutex<Vec<Arc<FakeAccumulator>>>,
    pub fail_paths: Mutex<HashSet<PathBuf>>,
    pub delay: Option<Duration>,
}

impl FakeFactory {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn fail_on(&self, path: &Path) {
        self.fail_paths
            .lock()
            .expect("fail_paths lock")
            .insert(path.to_path_buf());
    }

    pub fn last_for(&self, path: &Path) -> Option<Arc<FakeAccumulator>> {
        self.built
            .lock()
            .expect("built lock")
            .iter()
            .rev()
            .find(|a| a.path == path)
            .cloned()
    }
}

impl AccumulatorFactory for FakeFactory {
    fn open(&self, path: &Path) -> Result<Arc<dyn Accumulator>, AccumulatorError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        if self.fail_paths.lock().expect("fail_paths lock").contains(path) {
            return Err(AccumulatorError::io(
                path,
                io::Error::new(io::ErrorKind::NotFound, "vanished"),
            ));
        }
        let acc = Arc::new(FakeAccumulator {
            path: path.to_path_buf(),
            reloads: AtomicUsize::new(0),
            fail_io: AtomicBool::new(false),
        });
        self.built.lock().expect("built lock").push(acc.clone());
        Ok(acc)
    }
}

/// Create a run directory with one event file and a JSON sidecar.
pub fn make_run(root: &Path, rel: &str) -> PathBuf {
    let dir = root.join(rel);
    fs::create_dir_all(&dir).expect("mkdir run");
    fs::write(dir.join("events.out.tfevents.1700000000.host"), b"evt").expect("write events");
    fs::write(dir.join("runparams.json"), b"{\"lr\": 0.1}").expect("write sidecar");
    dir
}
