use std::fs::OpenOptions;

use tracing_appender::non_blocking;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::Config;

/// Initializes file-backed tracing for whichever of the three binaries is
/// running. Ported from the teacher's `init_tracing_if_requested`: log to
/// `<config_dir>/logs/debug.log` only, never to the console, with the
/// worker guard intentionally leaked so the background writer thread
/// outlives this function (the teacher does the same for the same reason:
/// dropping it would stop the writer and lose buffered log lines).
pub fn init_tracing(config: &Config, binary: &str, debug: bool) {
    let _ = std::fs::create_dir_all(&config.log_dir);
    let log_path = config.log_dir.join("debug.log");
    let level_str = if debug { "debug" } else { "warn" };

    match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(file) => {
            let (writer, guard) = non_blocking(file);
            let _ = Box::leak(Box::new(guard));
            let file_layer = fmt::layer().with_writer(writer).with_ansi(false).with_filter(EnvFilter::new(level_str));
            let _ = tracing_subscriber::registry().with(file_layer).try_init();
            tracing::debug!(binary, "logging initialized");
        }
        Err(e) => {
            eprintln!("warning: could not open debug log at {}: {}", log_path.display(), e);
        }
    }
}
