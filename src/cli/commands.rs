//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::listing::ListingKind;
use crate::resource::ResourceKind;

/// nomad-reconcile - Declarative Nomad ACL, namespace and Sentinel manager.
#[derive(Parser, Debug)]
#[command(name = "nomad-reconcile")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the manifest file.
    #[arg(short, long, global = true, env = "NOMAD_RECONCILE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter manifest.
    Init {
        /// Directory to initialize (defaults to current directory).
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Force overwrite existing files.
        #[arg(short, long)]
        force: bool,
    },

    /// Validate the manifest without contacting the cluster.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Show what apply would change.
    Plan {
        /// Read every recorded object back from the cluster first.
        #[arg(long)]
        refresh: bool,
    },

    /// Converge the cluster onto the manifest.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Continue on errors.
        #[arg(long)]
        continue_on_error: bool,

        /// Read every recorded object back from the cluster first.
        #[arg(long)]
        refresh: bool,
    },

    /// Delete every recorded resource.
    Destroy {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },

    /// Adopt an existing object into the state.
    Import {
        /// Resource kind (`acl_policy`, `acl_token`, `namespace`, `sentinel_policy`).
        kind: ResourceKind,

        /// Manifest handle to record it under.
        handle: String,

        /// Identity on the cluster (name, or a token's accessor id).
        identity: String,
    },

    /// Read recorded resources back from the cluster.
    Show {
        /// Print secret values instead of a placeholder.
        #[arg(long)]
        show_sensitive: bool,
    },

    /// Print a read-only cluster listing.
    List {
        /// What to list (regions, namespaces, deployments).
        kind: ListingKind,
    },

    /// Manage the local state.
    State {
        /// State subcommand.
        #[command(subcommand)]
        command: StateCommands,
    },
}

/// State management subcommands.
#[derive(Subcommand, Debug)]
pub enum StateCommands {
    /// Show current state.
    Show,

    /// Show who holds the state lock.
    LockInfo,

    /// Unlock the state.
    Unlock {
        /// Lock ID to unlock.
        #[arg(long)]
        lock_id: Option<String>,

        /// Force unlock (dangerous).
        #[arg(long)]
        force: bool,
    },

    /// Drop a record without touching the cluster.
    Forget {
        /// Resource kind.
        kind: ResourceKind,

        /// Manifest handle.
        handle: String,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
