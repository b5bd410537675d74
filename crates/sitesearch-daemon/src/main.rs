//! Sitesearch Daemon
//!
//! Keeps a full-text index in step with a content repository.
//!
//! # Usage
//!
//! ```bash
//! sitesearch start [--foreground] [--rebuild]
//! sitesearch stop
//! sitesearch status
//! sitesearch task [--inline] index-site <SITE_ID>
//! sitesearch optimize
//! sitesearch search <QUERY> [-n LIMIT]
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/sitesearch/config.toml)
//! 3. Environment variables (SITESEARCH_*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use sitesearch_daemon::{
    handle_optimize, handle_search, handle_task, init_logging, load_settings, show_status,
    start_daemon, stop_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Start {
            foreground,
            rebuild,
            index_path,
            content_root,
        } => {
            let settings = load_settings(
                config,
                log_level,
                index_path.as_deref(),
                content_root.as_deref(),
            )?;
            init_logging(&settings.log_level)?;
            start_daemon(settings, foreground, rebuild).await?;
        }
        Commands::Stop => {
            stop_daemon()?;
        }
        Commands::Status => {
            show_status()?;
        }
        Commands::Task { inline, kind } => {
            let settings = load_settings(config, log_level, None, None)?;
            init_logging(&settings.log_level)?;
            handle_task(&settings, &kind, inline)?;
        }
        Commands::Optimize => {
            let settings = load_settings(config, log_level, None, None)?;
            init_logging(&settings.log_level)?;
            handle_optimize(&settings)?;
        }
        Commands::Search { query, limit } => {
            let settings = load_settings(config, log_level, None, None)?;
            init_logging(&settings.log_level)?;
            handle_search(&settings, &query, limit)?;
        }
    }

    Ok(())
}
