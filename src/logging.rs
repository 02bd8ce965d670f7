//! Logging initialisation for cog-explorer.
//!
//! When `COG_EXPLORER_LOG=1`, logs are also written to
//! `cog-explorer/cog-explorer.log` under the user data directory and the
//! default level is `info`. Otherwise only stderr output (filtered by
//! `RUST_LOG`, default `warn`) is enabled.
//!
//! Keep the returned guard alive for the whole process so buffered lines are
//! flushed on exit.

use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "COG_EXPLORER_LOG";

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init() -> LogGuard {
    let to_file = std::env::var(LOG_ENV).as_deref() == Ok("1");
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if to_file { "info" } else { "warn" }));
    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(true);

    let file_guard = if to_file {
        let dir = log_dir();
        let _ = std::fs::create_dir_all(&dir);
        let appender = tracing_appender::rolling::never(dir, "cog-explorer.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(stderr).init();
        None
    };

    LogGuard {
        _file_guard: file_guard,
    }
}

fn log_dir() -> PathBuf {
    let mut p = match std::env::var("XDG_DATA_HOME") {
        Ok(xdg) => PathBuf::from(xdg),
        Err(_) => {
            let mut home = crate::config::home_dir();
            #[cfg(target_os = "macos")]
            home.push("Library/Logs");
            #[cfg(not(target_os = "macos"))]
            home.push(".local/share");
            home
        }
    };
    p.push("cog-explorer");
    p
}
