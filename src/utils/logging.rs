use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::utils::Result;

/// Maps a configured verbosity name onto a tracing level filter.
///
/// Unknown names fall back to `info`.
pub fn parse_level(level: &str) -> LevelFilter {
    match level.trim().to_lowercase().as_str() {
        "error" => LevelFilter::ERROR,
        "warn" | "warning" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

/// Initialize tracing/logging for the application.
///
/// Events go to stdout and, when `file` is given, are also appended to that
/// file without ANSI colouring. If the log file cannot be opened, stdout
/// logging is still installed and the open error is returned.
pub fn init(default_level: &str, file: Option<&Path>) -> Result<()> {
    let opened = file
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose();
    let (file_layer, open_error) = match opened {
        Ok(file) => (
            file.map(|file| {
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file))
            }),
            None,
        ),
        Err(e) => (None, Some(e)),
    };

    // try_init so tests can call this repeatedly without panicking
    let _ = tracing_subscriber::registry()
        .with(parse_level(default_level))
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init();

    match open_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
