//! Rolling file log bootstrap for folio core.
//!
//! # Responsibility
//! - Start one flexi_logger file backend per process from [`CoreConfig`]:
//!   directory, level, file basename, rotation size, and retained files.
//! - Record panics as sanitized `event=panic_captured` lines.
//!
//! # Invariants
//! - Events are `key=value` metadata (ids, counts, durations); component
//!   configuration payloads never reach the log.
//! - Starting again with identical settings is a no-op; any different
//!   setting is rejected while a logger is active.
//! - Initialization never panics.

use crate::config::CoreConfig;
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming, WriteMode};
use log::{error, info};
use once_cell::sync::OnceCell;
use std::path::{Path, PathBuf};

const MAX_PANIC_PAYLOAD_CHARS: usize = 160;

static ACTIVE_LOGGER: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_CAPTURE: OnceCell<()> = OnceCell::new();

/// Validated file logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogTarget {
    level: &'static str,
    dir: PathBuf,
    basename: String,
    max_file_bytes: u64,
    keep_files: usize,
}

impl LogTarget {
    fn from_config(config: &CoreConfig, dir: &Path) -> Result<Self, String> {
        if !dir.is_absolute() {
            return Err(format!(
                "log_dir must be an absolute path, got `{}`",
                dir.display()
            ));
        }
        let basename = config.log_file_basename.trim();
        if basename.is_empty() || basename.contains(['/', '\\']) {
            return Err(format!(
                "log_file_basename must be a bare file name, got `{}`",
                config.log_file_basename
            ));
        }
        if config.log_max_file_bytes == 0 {
            return Err("log_max_file_bytes must be greater than zero".to_string());
        }
        if config.log_keep_files == 0 {
            return Err("log_keep_files must be at least 1".to_string());
        }

        Ok(Self {
            level: normalize_level(&config.log_level)?,
            dir: dir.to_path_buf(),
            basename: basename.to_string(),
            max_file_bytes: config.log_max_file_bytes,
            keep_files: config.log_keep_files,
        })
    }

    fn describe(&self) -> String {
        format!(
            "dir={} level={} basename={} max_file_bytes={} keep_files={}",
            self.dir.display(),
            self.level,
            self.basename,
            self.max_file_bytes,
            self.keep_files
        )
    }
}

struct ActiveLogger {
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts file logging described by `config`.
///
/// Returns `Ok(false)` when the configuration has no log directory; log
/// macros then stay no-ops. Returns `Ok(true)` once the logger is active.
///
/// # Errors
/// - Invalid level, relative directory, or unusable rotation settings.
/// - A logger with different settings is already active.
/// - The directory cannot be created or the backend fails to start.
pub fn init_from_config(config: &CoreConfig) -> Result<bool, String> {
    let Some(dir) = config.log_dir.as_deref() else {
        return Ok(false);
    };
    let requested = LogTarget::from_config(config, dir)?;
    let active = ACTIVE_LOGGER.get_or_try_init(|| start(requested.clone()))?;
    if active.target != requested {
        return Err(format!(
            "logging already active with {}; refusing to switch to {}",
            active.target.describe(),
            requested.describe()
        ));
    }
    Ok(true)
}

/// Default level for the current build: `debug` builds log at `debug`,
/// release builds at `info`.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

pub(crate) fn normalize_level(level: &str) -> Result<&'static str, String> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(format!(
            "unsupported log level `{other}`; expected trace|debug|info|warn|error"
        )),
    }
}

fn start(target: LogTarget) -> Result<ActiveLogger, String> {
    std::fs::create_dir_all(&target.dir).map_err(|err| {
        format!(
            "failed to create log directory `{}`: {err}",
            target.dir.display()
        )
    })?;

    let handle = Logger::try_with_str(target.level)
        .map_err(|err| format!("invalid log level `{}`: {err}", target.level))?
        .log_to_file(
            FileSpec::default()
                .directory(target.dir.clone())
                .basename(target.basename.clone()),
        )
        .rotate(
            Criterion::Size(target.max_file_bytes),
            Naming::Numbers,
            Cleanup::KeepLogFiles(target.keep_files),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        // [YYYY-MM-DD HH:MM:SS.ffffff TZ] LEVEL [module] file:line: message
        .format_for_files(flexi_logger::detailed_format)
        .start()
        .map_err(|err| format!("failed to start logger: {err}"))?;

    capture_panics_once();
    info!(
        "event=core_init module=core status=ok version={} build_mode={} {}",
        env!("CARGO_PKG_VERSION"),
        if cfg!(debug_assertions) { "debug" } else { "release" },
        target.describe()
    );

    Ok(ActiveLogger {
        target,
        _handle: handle,
    })
}

fn capture_panics_once() {
    if PANIC_CAPTURE.set(()).is_err() {
        return;
    }

    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());
        let payload = panic_info
            .payload()
            .downcast_ref::<&str>()
            .map(|message| (*message).to_string())
            .or_else(|| panic_info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        error!(
            "event=panic_captured module=core status=error location={} payload={}",
            location,
            single_line(&payload, MAX_PANIC_PAYLOAD_CHARS)
        );
        previous_hook(panic_info);
    }));
}

/// Flattens `value` to one line of at most `max_chars` characters.
fn single_line(value: &str, max_chars: usize) -> String {
    let flattened = value.replace(['\n', '\r'], " ");
    let mut line = flattened.chars().take(max_chars).collect::<String>();
    if flattened.chars().count() > max_chars {
        line.push_str("...");
    }
    line
}
