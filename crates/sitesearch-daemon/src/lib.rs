//! Sitesearch daemon library exports.
//!
//! # Modules
//!
//! - `cli`: Command-line argument parsing with clap
//! - `commands`: Command implementations (start, stop, status, task, ...)
//! - `runtime`: Handler chain and worker wiring

pub mod cli;
pub mod commands;
pub mod runtime;

pub use cli::{Cli, Commands, TaskCommands};
pub use commands::{
    build_task, handle_optimize, handle_search, handle_task, init_logging, load_settings,
    run_inline, show_status, start_daemon, stop_daemon,
};
pub use runtime::{Components, Runtime};
