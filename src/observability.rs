//! Logging and diagnostics for the pipeline engine.
//!
//! The engine logs through the `log` facade only. Installing a backend is the job of
//! whoever owns the process: Rust hosts bring their own, while foreign hosts call
//! `init_logging` (exposed through `ffi`) to get an `env_logger` backend with a
//! compact, coloured `[LEVEL] message` format.
//!
//! The `log_metric!` macro emits structured key/value lines for movement and update
//! bookkeeping. It is compiled out of release builds.

use colored::Colorize;
use log::{Level, LevelFilter};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Once;

/// Logs a structured key-value metric line at `debug` level, only in debug builds.
///
/// # Example
/// ```ignore
/// log_metric!("event" = "pack", "batch_id" = batch_id, "frames" = ids.len());
/// ```
macro_rules! log_metric {
    ($($key:literal = $value:expr),+ $(,)?) => {
        #[cfg(debug_assertions)]
        {
            let mut parts = Vec::new();
            $(
                parts.push(format!("\"{}\": \"{}\"", $key, $value));
            )+
            log::debug!(target: "stagepipe::metric", "STAGEPIPE_METRIC: {{ {} }}", parts.join(", "));
        }
    };
}

static INIT_LOGGER: Once = Once::new();

/// Installs a process-wide `env_logger` backend. Only the first call has any effect;
/// later calls (including ones racing from other threads) return immediately.
///
/// When `log_file` is given, log lines are appended to it instead of stderr. A file
/// that cannot be opened falls back to stderr rather than failing.
pub fn init_logging(level: LevelFilter, log_file: Option<&str>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(level);

        let colour = log_file.is_none();
        builder.format(move |buf, record| {
            let level = if colour {
                paint_level(record.level())
            } else {
                record.level().to_string()
            };
            writeln!(buf, "[{}] {}", level, record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = log_file {
            match OpenOptions::new().append(true).create(true).open(filename) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(e) => eprintln!(
                    "stagepipe: could not open log file '{}' ({}), logging to stderr",
                    filename, e
                ),
            }
        }

        let _ = builder.try_init();
    });
}

/// Parses a textual level (`"info"`, `"debug"`, ...), defaulting to `Info`.
pub fn parse_level(level: Option<&str>) -> LevelFilter {
    level
        .and_then(|l| l.parse::<LevelFilter>().ok())
        .unwrap_or(LevelFilter::Info)
}

fn paint_level(level: Level) -> String {
    let name = level.to_string();
    match level {
        Level::Error => name.red().bold().to_string(),
        Level::Warn => name.yellow().to_string(),
        Level::Info => name.green().to_string(),
        Level::Debug => name.blue().to_string(),
        Level::Trace => name.dimmed().to_string(),
    }
}
