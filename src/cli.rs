//! Command line interface and subcommand implementations.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};

use digiscan_core::db::InitObserver;
use digiscan_core::services::ScanObserver;
use digiscan_core::{CollectionLocation, DigiscanCore};

#[derive(Debug, Parser)]
#[command(name = "digiscan", version, about = "Photo collection scanner and metadata indexer")]
pub struct Cli {
    /// Data directory holding the database, settings and logs
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Debug logging and per-album progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List collection locations and their status
    Locations {
        #[arg(long)]
        json: bool,
    },
    /// Register a directory as a collection location
    AddLocation {
        path: PathBuf,
        #[arg(long)]
        label: Option<String>,
        /// The directory is a mounted network share
        #[arg(long)]
        network: bool,
    },
    /// Remove a location with all its albums and items
    RemoveLocation { id: i64 },
    /// Hide a location from scans
    Hide {
        id: i64,
        #[arg(long)]
        unhide: bool,
    },
    /// Scan every available location
    Scan,
    /// Scan one directory or file below a location
    Rescan { path: PathBuf },
    /// Watch available locations and rescan on change
    Watch,
    /// Database statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
}

/// Prints initialization and scan progress to stdout.
pub struct ConsoleProgress {
    verbose: bool,
    total: AtomicUsize,
    scanned: AtomicUsize,
}

impl ConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            total: AtomicUsize::new(0),
            scanned: AtomicUsize::new(0),
        }
    }
}

impl InitObserver for ConsoleProgress {
    fn more_schema_updates_needed(&self, steps: usize) {
        println!("Updating database schema ({} steps)...", steps);
    }

    fn schema_update_progress(&self, message: &str, step: usize) {
        println!("  [{}] {}", step, message);
    }

    fn error(&self, message: &str) {
        eprintln!("database error: {}", message);
    }
}

impl ScanObserver for ConsoleProgress {
    fn total_files_to_scan(&self, count: usize) {
        self.total.store(count, Ordering::Relaxed);
        println!("{} files to scan", count);
    }

    fn finished_scanning_album(&self, album_root: &Path, album: &str, files: usize) {
        if self.verbose {
            println!("  {}{} ({} files)", album_root.display(), album, files);
        }
    }

    fn scanned_files(&self, count: usize) {
        let scanned = self.scanned.fetch_add(count, Ordering::Relaxed) + count;
        let total = self.total.load(Ordering::Relaxed);
        if !self.verbose && total > 0 && count > 0 {
            print!("\r  {}/{}", scanned.min(total), total);
        }
    }
}

fn print_location(location: &CollectionLocation) {
    let path = location
        .root_path
        .as_deref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:>4}  {:<12} {:<16} {}  ({})",
        location.id,
        format!("{:?}", location.status),
        location.label.as_deref().unwrap_or(""),
        path,
        location.identifier
    );
}

pub fn locations(core: &DigiscanCore, json: bool) -> anyhow::Result<()> {
    let locations = core.collections().all_locations();
    if json {
        println!("{}", serde_json::to_string_pretty(&locations)?);
        return Ok(());
    }

    if locations.is_empty() {
        println!("No locations. Use `digiscan add-location PATH` first.");
    }
    for location in &locations {
        print_location(location);
    }
    Ok(())
}

pub fn add_location(
    core: &DigiscanCore,
    path: &Path,
    label: Option<&str>,
    network: bool,
) -> anyhow::Result<()> {
    let manager = core.collections();
    let location = if network {
        manager.add_network_location(path, label)
    } else {
        manager.add_location(path, label)
    }
    .with_context(|| format!("cannot add {}", path.display()))?;

    println!("Added location {}", location.id);
    print_location(&location);
    Ok(())
}

pub fn remove_location(core: &DigiscanCore, id: i64) -> anyhow::Result<()> {
    core.collections()
        .remove_location(id)
        .with_context(|| format!("cannot remove location {}", id))?;
    println!("Removed location {}", id);
    Ok(())
}

pub fn hide_location(core: &DigiscanCore, id: i64, hidden: bool) -> anyhow::Result<()> {
    core.collections().set_hidden(id, hidden)?;
    println!("Location {} {}", id, if hidden { "hidden" } else { "shown" });
    Ok(())
}

pub fn scan(core: &DigiscanCore, verbose: bool) -> anyhow::Result<()> {
    let started = Instant::now();
    let progress = ConsoleProgress::new(verbose);
    let report = core.scanner().complete_collection_scan(&progress);

    println!();
    println!(
        "Done in {:.1}s: {} albums added, {} removed; {} items added, {} modified, {} removed",
        started.elapsed().as_secs_f64(),
        report.albums_added,
        report.albums_removed,
        report.items_added,
        report.items_modified,
        report.items_removed
    );
    if !report.errors.is_empty() {
        eprintln!("{} errors:", report.errors.len());
        for error in &report.errors {
            eprintln!("  {}", error);
        }
    }
    Ok(())
}

pub fn rescan(core: &DigiscanCore, path: &Path) -> anyhow::Result<()> {
    let path = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    if !core.collections().location_for_path(&path).is_available() {
        anyhow::bail!("{} is not inside an available location", path.display());
    }

    core.scanner().schedule_collection_scan(path.clone());
    println!("Scanning {}...", path.display());
    if !core.scanner().wait_for_idle(Duration::from_secs(3600)) {
        anyhow::bail!("scan of {} did not finish", path.display());
    }
    println!("Done.");
    Ok(())
}

pub fn watch(core: &DigiscanCore) -> anyhow::Result<()> {
    core.start_watching()?;
    println!("Watching {} locations. Press Ctrl+C to stop.", core.collections().all_available_locations().len());

    let mut last_refresh = Instant::now();
    loop {
        core.dispatcher().pump();
        std::thread::sleep(Duration::from_millis(200));

        // Pick up plugged and unplugged volumes
        if last_refresh.elapsed() >= Duration::from_secs(30) {
            last_refresh = Instant::now();
            match core.collections().refresh() {
                Ok(changes) if !changes.is_empty() => core.start_watching()?,
                Ok(_) => {}
                Err(e) => tracing::warn!("location refresh failed: {}", e),
            }
        }
    }
}

pub fn stats(core: &DigiscanCore, json: bool) -> anyhow::Result<()> {
    let stats = core.database().stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("digiscan stats");
    println!("==============");
    println!("locations: {}", stats.album_root_count);
    println!("albums:    {}", stats.album_count);
    println!("items:     {}", stats.image_count);
    println!("tags:      {}", stats.tag_count);
    println!("db size:   {} bytes", stats.db_size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_add_location() {
        let cli = Cli::parse_from(["digiscan", "--data-dir", "/tmp/d", "add-location", "/photos", "--label", "Main"]);
        assert_eq!(cli.data_dir, Some(PathBuf::from("/tmp/d")));
        match cli.command {
            Command::AddLocation { path, label, network } => {
                assert_eq!(path, PathBuf::from("/photos"));
                assert_eq!(label.as_deref(), Some("Main"));
                assert!(!network);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_hide_flags() {
        let cli = Cli::parse_from(["digiscan", "hide", "3", "--unhide", "-v"]);
        assert!(cli.verbose);
        assert!(matches!(cli.command, Command::Hide { id: 3, unhide: true }));
    }
}
