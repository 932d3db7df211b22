//! digiscan - photo collection scanner
//!
//! Command line host for digiscan-core. Owns the process: logging, the
//! application context and the main thread that answers volume requests.

pub mod cli;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use digiscan_core::services::SysinfoVolumeProvider;
use digiscan_core::{DefaultPathProvider, DigiscanCore, LoggingEventSink, PathProvider};

use cli::{Cli, Command};

/// Log directory for a data directory override, or the platform default
pub fn get_log_dir(data_dir: Option<&Path>) -> PathBuf {
    DefaultPathProvider::for_data_dir(data_dir).logs_dir()
}

/// Console plus daily rolling file logging.
///
/// `RUST_LOG` overrides the default level. The returned guard flushes the
/// file writer when dropped.
pub fn init_logging(log_dir: &Path, verbose: bool) -> anyhow::Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, "digiscan.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .try_init()
        .context("logging already initialized")?;

    Ok(guard)
}

pub fn run() -> anyhow::Result<()> {
    let args = Cli::parse();

    let _guard = init_logging(&get_log_dir(args.data_dir.as_deref()), args.verbose)?;
    tracing::info!("digiscan {} starting", env!("CARGO_PKG_VERSION"));

    let paths = DefaultPathProvider::for_data_dir(args.data_dir.as_deref());
    tracing::info!(
        "database: {:?}, settings: {:?}",
        paths.database_path(),
        paths.settings_path()
    );

    // Created on this thread: it answers volume requests from the worker
    let core = DigiscanCore::new(
        Arc::new(paths),
        Arc::new(LoggingEventSink),
        Arc::new(SysinfoVolumeProvider::new()),
    )
    .context("cannot open collection database")?;

    let advice = core.initialize(&cli::ConsoleProgress::new(args.verbose));
    if !advice.is_success() {
        anyhow::bail!("database initialization failed: {:?}", advice);
    }

    match args.command {
        Command::Locations { json } => cli::locations(&core, json),
        Command::AddLocation {
            path,
            label,
            network,
        } => cli::add_location(&core, &path, label.as_deref(), network),
        Command::RemoveLocation { id } => cli::remove_location(&core, id),
        Command::Hide { id, unhide } => cli::hide_location(&core, id, !unhide),
        Command::Scan => cli::scan(&core, args.verbose),
        Command::Rescan { path } => cli::rescan(&core, &path),
        Command::Watch => cli::watch(&core),
        Command::Stats { json } => cli::stats(&core, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_log_dir_follows_data_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(get_log_dir(Some(tmp.path())), tmp.path().join("Logs"));
    }
}
