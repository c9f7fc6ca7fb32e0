// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Parse a configured level name (`trace` .. `error`, any case).
pub fn parse_level(log_level: Option<&str>) -> Option<Level> {
    log_level.and_then(|s| s.trim().parse::<Level>().ok())
}

/// Initialize logging with optional level from config.
/// Falls back to INFO if level is None or invalid.
pub fn init_logging(log_level: Option<&str>) {
    let level = parse_level(log_level).unwrap_or(Level::INFO);

    // A second init (e.g. in tests) keeps the first subscriber.
    let _ = FmtSubscriber::builder()
        .with_target(false)
        .with_max_level(level)
        .try_init();
}
