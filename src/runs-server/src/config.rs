// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Configuration file support for runs-server.
//!
//! Config is loaded from the `[runs-server]` section of `runs-rs.toml`.
//! Default search order:
//! 1. Path specified via `--config` CLI argument
//! 2. `./runs-rs.toml`
//! 3. `~/.config/runs-rs/runs-rs.toml`
//! 4. `/etc/runs-rs/runs-rs.toml`

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use runs_app::{ConfigError, ConfigFile};
use runs_core::DEFAULT_WORKERS;
use serde::{Deserialize, Serialize};

/// Top-level `[runs-server]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub general: GeneralConfig,
    pub runs: RunsConfig,
    pub profiling: ProfilingConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: Option<String>,
}

/// Run enablement settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunsConfig {
    /// Root directory holding the runs
    pub logdir: Option<PathBuf>,
    /// Runs preloaded at startup, most recently modified first.
    /// Negative loads every run, 0 loads none.
    #[serde(rename = "enable_first_N_runs")]
    pub enable_first_n_runs: i64,
    /// Pattern the UI suggests for bulk operations
    pub default_runs_regex: String,
    /// Worker threads used for bulk loading
    pub runsenabler_threads: usize,
    /// Serve staged copies from `working_dir` instead of `logdir` itself
    pub use_filesystem_controller: bool,
    /// Staging directory; defaults to `<parent of logdir>/temp_logdir`
    pub working_dir: Option<PathBuf>,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            logdir: None,
            enable_first_n_runs: 10,
            default_runs_regex: String::new(),
            runsenabler_threads: DEFAULT_WORKERS,
            use_filesystem_controller: false,
            working_dir: None,
        }
    }
}

impl RunsConfig {
    /// Effective staging directory for `logdir`.
    pub fn resolved_working_dir(&self, logdir: &Path) -> PathBuf {
        if let Some(dir) = &self.working_dir {
            return dir.clone();
        }
        logdir
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("temp_logdir")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub enable_profiling: bool,
    /// Directory for `runs-profile-<unix>.txt` files
    pub dir: String,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        Self {
            enable_profiling: false,
            dir: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: IpAddr,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 6006,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), String> {
        validate_log_level(self.general.log_level.as_deref())?;

        if self.http.port == 0 {
            return Err("[http].port must be > 0".to_string());
        }
        if self.runs.runsenabler_threads == 0 {
            return Err("[runs].runsenabler_threads must be > 0".to_string());
        }
        if self.profiling.enable_profiling && self.profiling.dir.trim().is_empty() {
            return Err("[profiling].dir must not be empty when profiling is enabled".to_string());
        }
        Ok(())
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        <Self as ConfigFile>::load_from_file(path)
    }

    /// Load configuration from the default search paths.
    /// Returns default config if no config file is found.
    pub fn load_from_default_paths() -> Result<(Self, Option<PathBuf>), ConfigError> {
        <Self as ConfigFile>::load_from_default_paths()
    }

    pub fn example_toml() -> &'static str {
        EXAMPLE_TOML
    }
}

const EXAMPLE_TOML: &str = r#"[runs-server.general]
# trace, debug, info, warn, error
log_level = "info"

[runs-server.runs]
logdir = "/data/tensorboard/logs"
# Most recently modified runs loaded at startup; -1 loads all, 0 none
enable_first_N_runs = 10
# Pattern suggested for bulk enable/disable ("" matches every run)
default_runs_regex = ""
runsenabler_threads = 4
# Stage runs into working_dir before loading them
use_filesystem_controller = false
# working_dir = "/data/tensorboard/temp_logdir"

[runs-server.profiling]
enable_profiling = false
dir = "."

[runs-server.http]
listen = "127.0.0.1"
port = 6006
"#;

fn validate_log_level(level: Option<&str>) -> Result<(), String> {
    if let Some(level) = level {
        match level {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(format!(
                    "[general].log_level '{}' is invalid (expected one of: trace, debug, info, warn, error)",
                    level
                ))
            }
        }
    }
    Ok(())
}

impl ConfigFile for ServerConfig {
    fn section_key() -> &'static str {
        "runs-server"
    }
}
