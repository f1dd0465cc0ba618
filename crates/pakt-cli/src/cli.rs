use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// In-process driver for one backend job per invocation.
#[derive(Parser)]
#[command(name = "pakt-direct", version, about = "Run backend transactions directly")]
pub struct Args {
    /// Backend to load; `auto` detects the first available.
    #[arg(long, default_value = "auto")]
    pub backend: String,

    /// Daemon config file.
    #[arg(long)]
    pub conf: Option<PathBuf>,

    /// Helper executable for the spawn backend.
    #[arg(long)]
    pub helper: Option<PathBuf>,

    /// Show debug output.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Refresh stale repository metadata.
    Refresh,
    /// Refresh all repository metadata, stale or not.
    RefreshForce,
    /// Search package names.
    SearchName {
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Search package summaries and descriptions.
    SearchDetail {
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Search package file lists.
    SearchFile {
        #[arg(required = true)]
        values: Vec<String>,
    },
    /// Install packages by id.
    Install {
        #[arg(required = true)]
        package_ids: Vec<String>,
    },
    /// Remove installed packages by id.
    Remove {
        #[arg(required = true)]
        package_ids: Vec<String>,
    },
    /// Set one configuration key on a repository.
    RepoSetData {
        repo: String,
        key: String,
        value: String,
    },
}
