//! Command implementations for the sitesearch daemon.
//!
//! Handles:
//! - start: Load config, open the index, run workers until signalled
//! - stop: Signal running daemon to stop (via PID file)
//! - status: Check if daemon is running
//! - task: Publish a task, or execute it in this process
//! - optimize / search: One-shot index operations

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sitesearch_broker::BrokerSubmitter;
use sitesearch_indexing::{IndexTrigger, TaskContext, TaskFailure, TaskHandler, Dispatcher};
use sitesearch_search::{RecordSearcher, SearchIndex};
use sitesearch_types::{QueueMode, Settings, Task};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::TaskCommands;
use crate::runtime::{open_broker, Components, Runtime};

const STATUS_INTERVAL: Duration = Duration::from_secs(60);

/// Get the PID file path
fn pid_file_path() -> PathBuf {
    directories::BaseDirs::new()
        .map(|dirs| {
            #[cfg(unix)]
            {
                dirs.runtime_dir()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| dirs.cache_dir().to_path_buf())
            }
            #[cfg(not(unix))]
            {
                dirs.cache_dir().to_path_buf()
            }
        })
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("sitesearch")
        .join("daemon.pid")
}

fn write_pid_file() -> Result<()> {
    let pid_path = pid_file_path();
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&pid_path, std::process::id().to_string())?;
    info!(path = %pid_path.display(), "Wrote PID file");
    Ok(())
}

fn remove_pid_file() {
    let pid_path = pid_file_path();
    if pid_path.exists() {
        if let Err(e) = fs::remove_file(&pid_path) {
            warn!(error = %e, "Failed to remove PID file");
        }
    }
}

fn read_pid_file() -> Option<u32> {
    fs::read_to_string(pid_file_path())
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

/// Check if a process is running
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    // Signal 0 only checks that the process exists
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    true
}

/// Load settings and apply CLI overrides (highest precedence).
pub fn load_settings(
    config_path: Option<&str>,
    log_level: Option<&str>,
    index_path: Option<&str>,
    content_root: Option<&str>,
) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    if let Some(path) = index_path {
        settings.index_path = path.to_string();
    }
    if let Some(root) = content_root {
        settings.content_root = root.to_string();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_logging(level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")
}

async fn shutdown_signal() -> Result<()> {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("Failed to install SIGTERM handler")?;
        tokio::select! {
            result = ctrl_c => {
                result.context("Failed to install Ctrl+C handler")?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = terminate.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.context("Failed to install Ctrl+C handler")?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Start the daemon.
///
/// 1. Load configuration (defaults -> file -> env -> CLI)
/// 2. Open the index and content root
/// 3. Start the local pools or the broker consumers
/// 4. Log pending work periodically until SIGINT/SIGTERM
pub async fn start_daemon(settings: Settings, foreground: bool, rebuild: bool) -> Result<()> {
    info!("Sitesearch daemon starting...");
    info!(
        index_path = %settings.index_path,
        content_root = %settings.content_root,
        mode = ?settings.queue.mode,
        search_enabled = settings.search.enabled,
        "Configuration"
    );

    if !foreground {
        warn!("Background mode not implemented, running in foreground");
        warn!("Use a process manager (systemd, launchd) for background operation");
    }

    let components = Components::open(&settings)?;
    let runtime = Runtime::start(&settings, &components)?;
    write_pid_file()?;

    if rebuild {
        let trigger = IndexTrigger::new(runtime.submitter(), &settings.search);
        if trigger.rebuild_all().is_none() {
            warn!("Search is disabled, skipping startup rebuild");
        }
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(STATUS_INTERVAL);
    ticker.tick().await;

    let result = loop {
        tokio::select! {
            result = &mut shutdown => break result,
            _ = ticker.tick() => {
                info!(
                    pending = runtime.pending(),
                    frozen = runtime.is_frozen(),
                    documents = components.engine.searcher().num_docs(),
                    "Indexing status"
                );
            }
        }
    };

    runtime.shutdown();
    remove_pid_file();
    info!("Sitesearch daemon stopped");
    result
}

/// Stop the running daemon by sending SIGTERM.
pub fn stop_daemon() -> Result<()> {
    let pid = read_pid_file().context("No PID file found - daemon may not be running")?;

    if !is_process_running(pid) {
        remove_pid_file();
        anyhow::bail!("Daemon not running (stale PID file removed)");
    }

    #[cfg(unix)]
    {
        unsafe {
            if libc::kill(pid as i32, libc::SIGTERM) != 0 {
                anyhow::bail!("Failed to send SIGTERM to daemon");
            }
        }
        println!("Sent SIGTERM to daemon (PID {})", pid);
    }

    #[cfg(not(unix))]
    {
        anyhow::bail!("Stop command not implemented on this platform");
    }

    Ok(())
}

/// Show daemon status.
pub fn show_status() -> Result<()> {
    let pid_path = pid_file_path();

    match read_pid_file() {
        Some(pid) if is_process_running(pid) => {
            println!("Sitesearch daemon is running (PID {})", pid);
            println!("PID file: {:?}", pid_path);
        }
        Some(pid) => {
            println!(
                "Sitesearch daemon is NOT running (stale PID {} in {:?})",
                pid, pid_path
            );
        }
        None => {
            println!("Sitesearch daemon is NOT running (no PID file)");
        }
    }
    Ok(())
}

/// Build the task for a CLI task kind, stamped now.
pub fn build_task(kind: &TaskCommands) -> Task {
    let now = Utc::now();
    match kind {
        TaskCommands::IndexDocument { reference } => Task::index_document(reference.as_str(), now),
        TaskCommands::RemoveDocument { reference } => Task::remove_document(reference.as_str(), now),
        TaskCommands::IndexSite { site_id } => Task::index_site(site_id.as_str(), now),
        TaskCommands::RefreshSite { site_id } => Task::refresh_site(site_id.as_str(), now),
        TaskCommands::IndexAll => Task::index_all(now),
        TaskCommands::RefreshAll => Task::refresh_all(now),
        TaskCommands::PurgeSite { site_id } => Task::purge_site_documents(site_id.as_str(), now),
        TaskCommands::PurgeAll => Task::purge_all_documents(now),
    }
}

/// Publish a task to the broker, or run it to completion in this process.
pub fn handle_task(settings: &Settings, kind: &TaskCommands, inline: bool) -> Result<()> {
    if !settings.search.enabled {
        anyhow::bail!("Search is disabled (search.enabled = false)");
    }
    let task = build_task(kind);

    if inline {
        let components = Components::open(settings)?;
        return run_inline(&components, &task);
    }

    match settings.queue.mode {
        QueueMode::Distributed => {
            let broker = open_broker(settings)?;
            let submitter = BrokerSubmitter::new(broker, &settings.broker);
            submitter
                .publish(&task)
                .with_context(|| format!("Failed to publish {}", task))?;
            println!("Published {} to {}", task, submitter.queue());
            Ok(())
        }
        QueueMode::Local => anyhow::bail!(
            "queue.mode is local; use --inline or configure queue.mode = \"distributed\""
        ),
    }
}

/// Execute a task and its expansion directly, without queues or backoff.
pub fn run_inline(components: &Components, task: &Task) -> Result<()> {
    let dispatcher = Dispatcher::new(components.executor());
    let ctx = TaskContext::elevated(task);
    let result = ctx.span().in_scope(|| dispatcher.handle(task, &ctx));

    match result {
        Ok(()) => {
            println!("Completed {} in {:?}", task, ctx.elapsed());
            Ok(())
        }
        Err(failure) => {
            for member in failure.flatten() {
                match member {
                    TaskFailure::Retryable { replacement, cause } => {
                        eprintln!("Temporary failure ({}), retry with: {}", cause, replacement)
                    }
                    other => eprintln!("{}", other),
                }
            }
            anyhow::bail!("Task {} did not complete", task)
        }
    }
}

pub fn handle_optimize(settings: &Settings) -> Result<()> {
    let components = Components::open(settings)?;
    components
        .executor()
        .optimize()
        .context("Failed to optimize index")?;
    println!("Index optimized");
    Ok(())
}

/// Query the index read-only; works while the daemon holds the writer.
pub fn handle_search(settings: &Settings, query: &str, limit: usize) -> Result<()> {
    let index = SearchIndex::open_existing(settings.expanded_index_path())
        .context("Failed to open search index")?;
    let searcher = RecordSearcher::new(&index).context("Failed to open index reader")?;
    let hits = searcher
        .search(query, limit)
        .with_context(|| format!("Search failed for {:?}", query))?;

    if hits.is_empty() {
        println!("No results");
    }
    for (rank, hit) in hits.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] {} ({}) {}",
            rank + 1,
            hit.score,
            hit.title,
            hit.site_id,
            hit.reference
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sitesearch_types::{TaskType, REFERENCE, SITE_ID};

    #[test]
    fn test_pid_file_path() {
        let path = pid_file_path();
        assert!(path.ends_with("daemon.pid"));
        assert!(path
            .parent()
            .unwrap()
            .to_string_lossy()
            .contains("sitesearch"));
    }

    #[test]
    fn test_status_no_daemon() {
        let result = show_status();
        assert!(result.is_ok());
    }

    #[test]
    fn test_build_task() {
        let task = build_task(&TaskCommands::IndexDocument {
            reference: "/content/s/a".into(),
        });
        assert_eq!(task.task_type(), TaskType::IndexDocument);
        assert_eq!(task.property(REFERENCE), Some("/content/s/a"));

        let task = build_task(&TaskCommands::PurgeSite {
            site_id: "siteA".into(),
        });
        assert_eq!(task.task_type(), TaskType::PurgeSiteDocuments);
        assert_eq!(task.property(SITE_ID), Some("siteA"));

        assert_eq!(build_task(&TaskCommands::RefreshAll).task_type(), TaskType::RefreshAll);
    }

    #[test]
    fn test_search_without_index_creates_nothing() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let index_path = temp_dir.path().join("index");
        let settings = Settings {
            index_path: index_path.to_string_lossy().into_owned(),
            ..Settings::default()
        };

        assert!(handle_search(&settings, "budget", 5).is_err());
        assert!(!index_path.exists());
    }
}
