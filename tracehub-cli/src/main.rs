//! tracehub - CLI driver for the agent-session trace indexing engine.
//!
//! Discovers configured source profiles, indexes their files, and either
//! exits (one-shot) or keeps polling on the engine's adaptive interval
//! (`--watch`).

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracehub_core::discovery::Watcher;
use tracehub_core::{Config, IndexEngine};

#[derive(Parser)]
#[command(name = "tracehub")]
#[command(about = "Index local coding-agent session traces")]
#[command(version)]
struct Args {
    /// Path to config.toml. Defaults to $XDG_CONFIG_HOME/tracehub/config.toml.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Verbose output (-v per-trace, -vv per-event)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Discover and report what would be indexed, without indexing it.
    #[arg(long)]
    dry_run: bool,

    /// Watch mode - keep polling on the engine's adaptive interval.
    #[arg(short, long)]
    watch: bool,
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tracehub")
        .join("config.toml")
}

fn default_log_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tracehub")
        .join("logs")
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config at {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("failed to parse config at {}", path.display()))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path)?;

    let log_dir = default_log_dir();
    std::fs::create_dir_all(&log_dir).ok();
    let _log_guard = tracehub_core::logging::init(&log_dir, "tracehub");

    tracing::info!(config = %config_path.display(), "tracehub starting");

    let mut engine = IndexEngine::new(config);

    let found = engine.discover();
    println!("Discovered {} trace file(s) across configured sources.", found.len());
    if args.verbose >= 1 {
        for file in &found {
            println!("  {} ({})", file.path.display(), file.source_profile);
        }
    }

    if args.dry_run {
        println!("Dry run - no indexing performed.");
        return Ok(());
    }

    if args.watch {
        run_watch(&mut engine)
    } else {
        run_once(&mut engine, args.verbose)
    }
}

fn run_once(engine: &mut IndexEngine, verbose: u8) -> Result<()> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message("indexing...");

    engine.tick();
    pb.finish_and_clear();

    print_overview(engine);
    if verbose >= 1 {
        for trace in engine.list_traces(&Default::default()) {
            println!(
                "  {} [{}] {} events, status={}",
                trace.path,
                trace.agent_kind,
                trace.event_count,
                trace.activity_status.as_str()
            );
        }
    }

    let stats = engine.get_perf_stats();
    tracing::info!(
        refresh_count = stats.refresh_count,
        avg_ms = stats.average_refresh_duration_ms,
        "tracehub sync complete"
    );
    Ok(())
}

fn run_watch(engine: &mut IndexEngine) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutting down...");
        r.store(false, Ordering::SeqCst);
    })
    .context("failed to set Ctrl+C handler")?;

    let roots = engine.watch_roots();
    let mut watcher = Watcher::start(&roots, engine.watch_debounce_ms())
        .context("failed to start filesystem watcher")?;
    let full_rescan_interval = Duration::from_millis(engine.config().scan.full_rescan_interval_ms);
    let mut last_full_rescan = Instant::now();

    println!("Watch mode active. Press Ctrl+C to stop.");

    while running.load(Ordering::SeqCst) {
        while let Ok(path) = watcher.rx.try_recv() {
            engine.notify_path_changed(path);
        }
        if last_full_rescan.elapsed() >= full_rescan_interval {
            engine.discover();
            last_full_rescan = Instant::now();
        }
        engine.tick();
        let delay = engine.next_delay_ms();
        std::thread::sleep(Duration::from_millis(delay));
    }

    println!("Watch mode stopped.");
    print_overview(engine);
    Ok(())
}

fn print_overview(engine: &IndexEngine) {
    let overview = engine.get_overview();
    println!(
        "Traces: {} (hot {}, warm {}, cold {}) — {} events total",
        overview.trace_count,
        overview.hot_count,
        overview.warm_count,
        overview.cold_count,
        overview.total_event_count
    );
    println!(
        "Activity: {} running, {} waiting on input, {} idle",
        overview.running_count, overview.waiting_input_count, overview.idle_count
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.toml");
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.scan.mode, "adaptive");
    }

    #[test]
    fn parses_config_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[scan]\nmode = \"fixed\"\nintervalSeconds = 3\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert!(cfg.scan.is_fixed());
        assert_eq!(cfg.scan.interval_seconds, 3);
    }
}
