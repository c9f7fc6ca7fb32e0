// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

mod config;

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};

use runs_app::init_logging;
use runs_core::{
    DirectController, DynResult, EnablementEngine, EventFileAccumulatorFactory, MirrorController,
    Profiler, RunRegistry, RunsController, WorkerPool,
};

use config::ServerConfig;

const PKG_DESCRIPTION: &str = concat!(env!("CARGO_PKG_NAME"), " - dynamic run enablement server");

#[derive(Debug, Parser)]
#[command(
    author = env!("CARGO_PKG_AUTHORS"),
    version = env!("CARGO_PKG_VERSION"),
    about = PKG_DESCRIPTION,
)]
struct Cli {
    /// Path to configuration file
    #[arg(long = "config", short = 'C', value_name = "FILE")]
    config: Option<PathBuf>,
    /// Print example configuration and exit
    #[arg(long = "print-config")]
    print_config: bool,
    /// Root directory holding the runs
    #[arg(short = 'd', long = "logdir", value_name = "DIR")]
    logdir: Option<PathBuf>,
    /// IP address for the HTTP control endpoints
    #[arg(short = 'l', long = "listen")]
    listen: Option<IpAddr>,
    /// Port for the HTTP control endpoints
    #[arg(short = 'p', long = "port")]
    port: Option<u16>,
    /// Worker threads used for bulk loading
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,
}

/// CLI values take precedence over the config file.
fn apply_cli(cli: &Cli, cfg: &mut ServerConfig) {
    if let Some(logdir) = &cli.logdir {
        cfg.runs.logdir = Some(logdir.clone());
    }
    if let Some(listen) = cli.listen {
        cfg.http.listen = listen;
    }
    if let Some(port) = cli.port {
        cfg.http.port = port;
    }
    if let Some(threads) = cli.threads {
        cfg.runs.runsenabler_threads = threads;
    }
}

/// Absolute, symlink-free form of `path`, which may not exist yet.
fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    let mut existing = path;
    let mut missing = Vec::new();
    loop {
        match fs::canonicalize(existing) {
            Ok(base) => return Ok(missing.iter().rev().fold(base, |acc, part| acc.join(part))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                existing = if parent.as_os_str().is_empty() {
                    Path::new(".")
                } else {
                    parent
                };
            }
            Err(e) => return Err(e),
        }
    }
}

/// Create the staging directory. An existing non-empty one is refused so a
/// crashed previous instance is never mistaken for a fresh staging area.
fn prepare_working_dir(logdir: &Path, working_dir: &Path) -> DynResult<()> {
    let logdir = fs::canonicalize(logdir)?;
    if resolve_path(working_dir)?.starts_with(&logdir) {
        return Err(format!(
            "working directory {} must not be inside the log directory {}",
            working_dir.display(),
            logdir.display()
        )
        .into());
    }
    match fs::read_dir(working_dir) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(format!(
                    "working directory {} already exists and is not empty",
                    working_dir.display()
                )
                .into());
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(working_dir)?,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn remove_working_dir(working_dir: &Path) {
    match fs::remove_dir_all(working_dir) {
        Ok(()) => info!("Removed working directory {}", working_dir.display()),
        Err(e) => warn!(
            "Failed to remove working directory {}: {}",
            working_dir.display(),
            e
        ),
    }
}

fn build_engine(
    cfg: &ServerConfig,
    logdir: &Path,
    working_dir: Option<&Path>,
    profiler: Profiler,
) -> EnablementEngine {
    let registry = Arc::new(RunRegistry::new(
        logdir,
        Arc::new(EventFileAccumulatorFactory),
    ));
    let pool = WorkerPool::new(cfg.runs.runsenabler_threads);
    let controller: Arc<dyn RunsController> = match working_dir {
        Some(working_dir) => {
            let inner = DirectController::with_load_root(registry, pool, working_dir);
            Arc::new(MirrorController::new(logdir, working_dir, inner))
        }
        None => Arc::new(DirectController::new(registry, pool)),
    };
    EnablementEngine::new(controller)
        .with_profiler(profiler)
        .with_default_regex(cfg.runs.default_runs_regex.clone())
}

async fn run(cfg: &ServerConfig, logdir: &Path, working_dir: Option<&Path>) -> DynResult<()> {
    let profiler = if cfg.profiling.enable_profiling {
        let profiler = Profiler::to_dir(Path::new(&cfg.profiling.dir))?;
        if let Some(path) = profiler.path() {
            info!("Writing profile to {}", path.display());
        }
        profiler
    } else {
        Profiler::disabled()
    };

    let engine = Arc::new(build_engine(cfg, logdir, working_dir, profiler));

    let preload = engine.clone();
    let n = cfg.runs.enable_first_n_runs;
    let report = tokio::task::spawn_blocking(move || preload.preload_most_recent(n)).await??;
    info!(
        "Preloaded {} runs ({} failed)",
        report.succeeded,
        report.failed.len()
    );

    let addr = SocketAddr::new(cfg.http.listen, cfg.http.port);
    runs_http::serve(addr, engine).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> DynResult<()> {
    let cli = Cli::parse();

    if cli.print_config {
        println!("{}", ServerConfig::example_toml());
        return Ok(());
    }

    let (mut cfg, config_path) = if let Some(ref path) = cli.config {
        let cfg = ServerConfig::load_from_file(path)?;
        (cfg, Some(path.clone()))
    } else {
        ServerConfig::load_from_default_paths()?
    };
    apply_cli(&cli, &mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid server configuration: {}", e))?;

    init_logging(cfg.general.log_level.as_deref());

    if let Some(ref path) = config_path {
        info!("Loaded configuration from {}", path.display());
    }

    let logdir = cfg
        .runs
        .logdir
        .clone()
        .ok_or("no log directory configured (use --logdir or [runs].logdir)")?;
    // The default working dir is derived from the logdir's parent, which a
    // relative path like `.` does not have.
    let logdir = fs::canonicalize(&logdir)
        .map_err(|e| format!("cannot open log directory {}: {}", logdir.display(), e))?;

    let working_dir = if cfg.runs.use_filesystem_controller {
        let dir = cfg.runs.resolved_working_dir(&logdir);
        prepare_working_dir(&logdir, &dir)?;
        info!(
            "Staging runs from {} into {}",
            logdir.display(),
            dir.display()
        );
        Some(dir)
    } else {
        None
    };

    info!(
        "Starting runs-server (logdir: {}, threads: {})",
        logdir.display(),
        cfg.runs.runsenabler_threads
    );
    let result = run(&cfg, &logdir, working_dir.as_deref()).await;
    if let Err(e) = &result {
        error!("runs-server stopped: {}", e);
    }
    if let Some(dir) = &working_dir {
        remove_working_dir(dir);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::try_parse_from([
            "runs-server",
            "-d",
            "/srv/logs",
            "-l",
            "0.0.0.0",
            "-p",
            "7007",
            "-t",
            "1",
        ])
        .expect("parse cli");
        let mut cfg = ServerConfig::default();
        cfg.runs.logdir = Some(PathBuf::from("/elsewhere"));
        apply_cli(&cli, &mut cfg);

        assert_eq!(cfg.runs.logdir, Some(PathBuf::from("/srv/logs")));
        assert_eq!(cfg.http.listen.to_string(), "0.0.0.0");
        assert_eq!(cfg.http.port, 7007);
        assert_eq!(cfg.runs.runsenabler_threads, 1);
    }

    #[test]
    fn test_cli_leaves_unset_values() {
        let cli = Cli::try_parse_from(["runs-server"]).expect("parse cli");
        let mut cfg = ServerConfig::default();
        cfg.http.port = 9000;
        apply_cli(&cli, &mut cfg);
        assert_eq!(cfg.http.port, 9000);
        assert!(cfg.runs.logdir.is_none());
    }

    #[test]
    fn test_prepare_working_dir() {
        let base = TempDir::new().expect("tempdir");
        let logdir = base.path().join("logs");
        fs::create_dir(&logdir).expect("mkdir logs");

        let fresh = base.path().join("temp_logdir");
        prepare_working_dir(&logdir, &fresh).expect("create");
        assert!(fresh.is_dir());
        // Empty and existing is fine.
        prepare_working_dir(&logdir, &fresh).expect("reuse empty");

        fs::write(fresh.join("left-over"), b"x").expect("write");
        assert!(prepare_working_dir(&logdir, &fresh).is_err());

        assert!(prepare_working_dir(&logdir, &logdir.join("stage")).is_err());
        fs::create_dir(base.path().join("other")).expect("mkdir other");
        let sneaky = base.path().join("other/../logs/stage");
        assert!(!sneaky.starts_with(&logdir));
        assert!(prepare_working_dir(&logdir, &sneaky).is_err());
        assert!(!logdir.join("stage").exists());

        remove_working_dir(&fresh);
        assert!(!fresh.exists());
    }

    #[test]
    fn test_resolve_path_of_missing_dir() {
        let base = TempDir::new().expect("tempdir");
        let canonical = fs::canonicalize(base.path()).expect("canonicalize");
        let resolved = resolve_path(&base.path().join("x/y")).expect("resolve");
        assert_eq!(resolved, canonical.join("x").join("y"));
    }

    #[test]
    fn test_default_working_dir_sits_next_to_canonical_logdir() {
        let base = TempDir::new().expect("tempdir");
        let logdir = base.path().join("logs");
        fs::create_dir(&logdir).expect("mkdir logs");
        let logdir = fs::canonicalize(logdir.join("../logs")).expect("canonicalize");

        let work = ServerConfig::default().runs.resolved_working_dir(&logdir);
        assert!(!work.starts_with(&logdir));
        prepare_working_dir(&logdir, &work).expect("prepare");
        assert_eq!(work, logdir.parent().expect("parent").join("temp_logdir"));
    }

    #[test]
    fn test_build_engine_mirror_mode() {
        let base = TempDir::new().expect("tempdir");
        let logdir = base.path().join("logs");
        let work = base.path().join("temp_logdir");
        let run = logdir.join("a");
        fs::create_dir_all(&run).expect("mkdir run");
        fs::write(run.join("events.out.tfevents.1.host"), b"evt").expect("write");
        prepare_working_dir(&logdir, &work).expect("prepare");

        let cfg = ServerConfig::default();
        let engine = build_engine(&cfg, &logdir, Some(&work), Profiler::disabled());
        engine.preload_most_recent(-1).expect("preload");

        assert!(engine.registry().is_enabled("a"));
        assert!(work.join("a/events.out.tfevents.1.host").is_file());
        let acc = engine.registry().accumulator("a").expect("loaded");
        assert_eq!(acc.path(), work.join("a").as_path());
    }
}
