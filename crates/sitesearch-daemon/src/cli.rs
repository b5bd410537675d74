//! CLI argument parsing for the sitesearch daemon.
//!
//! CLI flags override every other configuration source.

use clap::{Parser, Subcommand};

/// Sitesearch daemon
///
/// Keeps a full-text index of a content repository up to date.
#[derive(Parser, Debug)]
#[command(name = "sitesearch")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the platform config directory)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Daemon commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the indexing workers
    Start {
        /// Run in foreground (don't daemonize)
        #[arg(short, long)]
        foreground: bool,

        /// Submit a full rebuild once the workers are up
        #[arg(long)]
        rebuild: bool,

        /// Override index path
        #[arg(long)]
        index_path: Option<String>,

        /// Override content root
        #[arg(long)]
        content_root: Option<String>,
    },

    /// Stop the running daemon
    Stop,

    /// Show daemon status
    Status,

    /// Submit an indexing task
    Task {
        /// Execute in this process instead of publishing to the broker
        #[arg(long)]
        inline: bool,

        #[command(subcommand)]
        kind: TaskCommands,
    },

    /// Merge index segments
    Optimize,

    /// Query the index
    Search {
        /// Query string
        query: String,

        /// Maximum results
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

/// Task kinds
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TaskCommands {
    /// Index one document
    IndexDocument { reference: String },

    /// Remove one document from the index
    RemoveDocument { reference: String },

    /// Rebuild one site from its content
    IndexSite { site_id: String },

    /// Re-touch the documents already indexed for one site
    RefreshSite { site_id: String },

    /// Rebuild every indexable site
    IndexAll,

    /// Refresh every indexable site
    RefreshAll,

    /// Remove a site's records older than now
    PurgeSite { site_id: String },

    /// Remove every record older than now
    PurgeAll,
}
