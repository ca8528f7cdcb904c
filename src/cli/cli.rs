use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::application::data::LogLevel;

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Inspect, copy, diff and watch local and SFTP file trees")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[clap(long, short, default_value = "warn", value_enum, global = true)]
    pub log_level: LogLevel,

    /// Credentials file for remote locators. Defaults to credentials.yaml in
    /// the user's config directory, when present.
    #[clap(long, short, global = true)]
    pub credentials: Option<PathBuf>,
}

/// Every locator is a local path, a `file://` URL or an `ssh://` / `sftp://` URL.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the entries of a directory
    Ls {
        locator: String,
        /// Show permissions, owner, size and modification time
        #[clap(long, short)]
        long: bool,
    },
    /// Show the attributes of an entry
    Info { locator: String },
    /// Write a file to stdout
    Cat { locator: String },
    /// Copy a file, or a directory with --recursive
    Cp {
        source: String,
        destination: String,
        #[clap(long, short)]
        recursive: bool,
    },
    /// Move or rename an entry
    Mv { source: String, destination: String },
    /// Remove a file, or a directory with --recursive
    Rm {
        locator: String,
        #[clap(long, short)]
        recursive: bool,
    },
    /// Create a directory
    Mkdir { locator: String },
    /// Print the directory tree below a locator
    Tree {
        locator: String,
        /// Include SHA-1 digests of files
        #[clap(long, short)]
        digest: bool,
    },
    /// Show the changes that turn CURRENT into TARGET
    Diff {
        current: String,
        target: String,
        /// Compare file contents by SHA-1, not only by size
        #[clap(long, short)]
        digest: bool,
    },
    /// Make DESTINATION match SOURCE
    Sync {
        source: String,
        destination: String,
        #[clap(long, short)]
        digest: bool,
        /// Only print the changes
        #[clap(long, short = 'n')]
        dry_run: bool,
    },
    /// Print change events below a directory
    Watch {
        locator: String,
        /// Also watch subdirectories, including ones created later
        #[clap(long, short)]
        recursive: bool,
        /// Stop after this many milliseconds; runs until killed otherwise
        #[clap(long, short)]
        timeout: Option<u64>,
    },
}
