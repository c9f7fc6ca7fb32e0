// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Optional operation timing log.
//!
//! When enabled, every [`ProfileScope`] appends one JSON line to
//! `runs-profile-<unix-seconds>.txt` when it is dropped.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{debug, warn};

struct ProfileLog {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl ProfileLog {
    fn open(dir: &Path) -> Result<Self, String> {
        create_dir_all(dir)
            .map_err(|e| format!("create profile dir '{}': {}", dir.display(), e))?;
        let path = dir.join(format!("runs-profile-{}.txt", Utc::now().timestamp()));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| format!("open profile log '{}': {}", path.display(), e))?;
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, op: &str, detail: &str, elapsed_ms: f64) {
        let ts_ms = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as u64,
            Err(_) => 0,
        };
        let line = json!({
            "ts_ms": ts_ms,
            "at": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            "op": op,
            "detail": detail,
            "elapsed_ms": elapsed_ms,
        });
        let Ok(mut writer) = self.writer.lock() else {
            warn!("profile log mutex poisoned");
            return;
        };
        if let Err(e) = writeln!(writer, "{line}").and_then(|_| writer.flush()) {
            warn!("profile log write failed ({}): {}", self.path.display(), e);
        }
    }
}

/// Handle to the timing log; disabled profilers do nothing.
#[derive(Clone, Default)]
pub struct Profiler {
    log: Option<Arc<ProfileLog>>,
}

impl Profiler {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Start writing timings to a new file under `dir`.
    pub fn to_dir(dir: &Path) -> Result<Self, String> {
        Ok(Self {
            log: Some(Arc::new(ProfileLog::open(dir)?)),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.log.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.log.as_deref().map(|log| log.path.as_path())
    }

    /// Time the enclosing block as `op`.
    pub fn scope(&self, op: &'static str, detail: impl Into<String>) -> ProfileScope {
        ProfileScope {
            log: self.log.clone(),
            op,
            detail: if self.log.is_some() {
                detail.into()
            } else {
                String::new()
            },
            started: Instant::now(),
        }
    }
}

#[must_use = "the scope records its timing when dropped"]
pub struct ProfileScope {
    log: Option<Arc<ProfileLog>>,
    op: &'static str,
    detail: String,
    started: Instant,
}

impl Drop for ProfileScope {
    fn drop(&mut self) {
        let Some(log) = self.log.as_ref() else {
            return;
        };
        let elapsed_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        debug!("{} {} took {:.3} ms", self.op, self.detail, elapsed_ms);
        log.write(self.op, &self.detail, elapsed_ms);
    }
}
