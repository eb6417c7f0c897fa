/*!
 * duplex-sync - bidirectional folder synchronization CLI
 *
 * Loads a TOML configuration describing one or more folder pairs, compares
 * each pair with a minimal built-in mtime/size comparator, and drives the
 * library's orchestrator through pre-flight checks and the three-pass
 * executor. The `watch` subcommand keeps doing this in response to
 * filesystem change events instead of running once.
 */

mod comparator;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};

use duplex_sync::config::{FolderPairSyncCfg, GlobalSyncConfig};
use duplex_sync::deletion::DeletionHandler;
use duplex_sync::orchestrator::{self, LoggingCallback, Orchestrator};
use duplex_sync::watcher::monitor::MonitorLoop;
use duplex_sync::logging;
use duplex_sync::watcher::DirWatcher;

fn main() -> Result<()> {
    let matches = Command::new("duplex-sync")
        .version(duplex_sync::VERSION)
        .author("Your Name <your@email.com>")
        .about("Bidirectional folder synchronization with move detection, versioning, and a realtime watch mode")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Path to a duplex-sync.toml config file (defaults to the standard fallback chain)"),
        )
        .subcommand(
            Command::new("sync")
                .about("Run every configured folder pair once and exit"),
        )
        .subcommand(
            Command::new("watch")
                .about("Run every configured folder pair once, then keep watching for changes"),
        )
        .get_matches();

    let config = match matches.get_one::<String>("config") {
        Some(path) => GlobalSyncConfig::load(std::path::Path::new(path))
            .with_context(|| format!("failed to load config from {}", path))?,
        None => GlobalSyncConfig::load_with_fallback(),
    };

    logging::init_logging(&config.engine).context("failed to initialize logging")?;

    orchestrator::validate_pairs(&config.pairs).context("folder pair configuration is invalid")?;

    match matches.subcommand() {
        Some(("watch", _)) => run_watch(&config),
        _ => run_sync_once(&config),
    }
}

fn run_sync_once(config: &GlobalSyncConfig) -> Result<()> {
    for pair in &config.pairs {
        sync_one_pair(pair, config)?;
    }
    Ok(())
}

fn sync_one_pair(pair: &FolderPairSyncCfg, config: &GlobalSyncConfig) -> Result<()> {
    tracing::info!(left = %pair.left.display(), right = %pair.right.display(), "comparing folder pair");

    let mut tree = comparator::compare_folder_pair(pair)
        .with_context(|| format!("failed to compare {} <-> {}", pair.left.display(), pair.right.display()))?;

    let orchestrator = Orchestrator::new(pair, &config.engine);
    let (stats, warnings) = orchestrator.preflight(&tree).context("pre-flight checks failed")?;

    if warnings.significant_difference {
        tracing::warn!("more than half the compared items differ; double-check the folder pair before proceeding");
    }
    if warnings.insufficient_disk_space {
        tracing::warn!("one of the two volumes may not have enough free space for this sync");
    }
    if warnings.unresolved_conflicts {
        tracing::warn!(conflicts = stats.conflicts, "some items have unresolved conflicts and will be left untouched");
    }

    let mut left_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut right_deletions = DeletionHandler::new(pair.deletion_policy, pair.versioning_folder.clone(), pair.versioning_style);
    let mut callback = LoggingCallback;

    let final_stats = orchestrator
        .run(&mut tree, &mut left_deletions, &mut right_deletions, &mut callback)
        .context("sync run failed")?;

    tracing::info!(
        creates = final_stats.creates,
        updates = final_stats.updates,
        deletes = final_stats.deletes,
        "folder pair sync complete"
    );

    Ok(())
}

fn run_watch(config: &GlobalSyncConfig) -> Result<()> {
    let root_pairs: Vec<(PathBuf, PathBuf)> = config
        .pairs
        .iter()
        .map(|p| (p.left.clone(), p.right.clone()))
        .collect();

    let delay = Duration::from_secs(config.engine.watch_check_interval_secs.max(1));
    let watch_paths = duplex_sync::watcher::monitor::root_paths(&root_pairs);
    let mut monitor = MonitorLoop::new(watch_paths, delay);

    loop {
        monitor.wait_for_missing_dirs(|| true);

        run_sync_once(config)?;

        let mut watchers: Vec<DirWatcher> = config
            .pairs
            .iter()
            .flat_map(|p| [p.left.clone(), p.right.clone()])
            .map(DirWatcher::new)
            .collect::<Result<_, _>>()
            .context("failed to start directory watchers")?;

        monitor.run_active(
            &mut watchers,
            |_event| {
                if let Err(e) = run_sync_once(config) {
                    tracing::error!(error = %e, "re-sync after change event failed");
                }
                Ok(())
            },
            || false,
        )?;
    }
}
