//! Tracing configuration and log routing.
//!
//! Everything is written to stdout with a compact formatter. A second, ANSI-free layer goes
//! to disk: `DOCSENSE_LOG_FILE` appends to an explicit file, otherwise a daily rolling file is
//! kept under `DOCSENSE_LOG_DIR` (default `logs/`). Set `DOCSENSE_LOG_FILE=off` to disable
//! file output entirely.
use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info,tower_http=info";
const DEFAULT_LOG_DIR: &str = "logs";
const LOG_FILE_PREFIX: &str = "docsense.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where file logs should be written.
#[derive(Debug, PartialEq, Eq)]
enum FileTarget {
    Disabled,
    File(PathBuf),
    RollingDir(PathBuf),
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default filter (`info`, with request spans from `tower_http`).
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer);

    let target = file_target(
        std::env::var("DOCSENSE_LOG_FILE").ok(),
        std::env::var("DOCSENSE_LOG_DIR").ok(),
    );
    match open_writer(target) {
        Some(writer) => {
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false)
                .compact();
            registry.with(file_layer).init();
        }
        None => registry.init(),
    }
}

fn file_target(file: Option<String>, dir: Option<String>) -> FileTarget {
    match file.as_deref().map(str::trim) {
        Some("off") | Some("none") => FileTarget::Disabled,
        Some(path) if !path.is_empty() => FileTarget::File(PathBuf::from(path)),
        _ => FileTarget::RollingDir(
            dir.filter(|value| !value.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        ),
    }
}

/// Build a non-blocking writer for the requested target.
///
/// Failures are reported on stderr because the subscriber is not installed yet.
fn open_writer(target: FileTarget) -> Option<NonBlocking> {
    let (writer, guard) = match target {
        FileTarget::Disabled => return None,
        FileTarget::File(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {}: {err}", path.display()))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        FileTarget::RollingDir(dir) => {
            if let Err(err) = std::fs::create_dir_all(&dir) {
                eprintln!("Failed to create log directory {}: {err}", dir.display());
                return None;
            }
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_wins_over_directory() {
        assert_eq!(
            file_target(Some("/tmp/app.log".into()), Some("elsewhere".into())),
            FileTarget::File(PathBuf::from("/tmp/app.log"))
        );
    }

    #[test]
    fn off_disables_file_logging() {
        assert_eq!(file_target(Some("off".into()), None), FileTarget::Disabled);
    }

    #[test]
    fn falls_back_to_rolling_directory() {
        assert_eq!(
            file_target(None, None),
            FileTarget::RollingDir(PathBuf::from("logs"))
        );
        assert_eq!(
            file_target(Some("  ".into()), Some("var/log".into())),
            FileTarget::RollingDir(PathBuf::from("var/log"))
        );
    }
}
