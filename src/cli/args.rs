//! cli::args
//!
//! Command-line argument definitions using clap derive.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version`: Show version
//! - `--repo <path>`: Repository to operate on
//! - `--ref <name>`: Branch or tag to operate on
//! - `--debug`: Enable debug logging
//! - `--quiet` / `-q`: Minimal output
//! - `--author`, `--email`, `--message`: Commit identity for mutations

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// gitkv - A versioned key-value store backed by a git commit graph
#[derive(Parser, Debug)]
#[command(name = "gitkv")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Repository (git dir) to operate on
    #[arg(long, global = true, default_value = ".")]
    pub repo: PathBuf,

    /// Branch or tag to operate on (default: the configured default branch)
    #[arg(long = "ref", global = true, value_name = "NAME")]
    pub refname: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Minimal output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub identity: IdentityArgs,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Parser::parse()
    }
}

/// Who a mutation is recorded as.
#[derive(Args, Debug, Clone, Default)]
pub struct IdentityArgs {
    /// Author name recorded on commits
    #[arg(long, global = true, env = "GITKV_AUTHOR")]
    pub author: Option<String>,

    /// Author email recorded on commits
    #[arg(long, global = true, env = "GITKV_EMAIL")]
    pub email: Option<String>,

    /// Commit message (a default naming the operation is used otherwise)
    #[arg(short, long, global = true)]
    pub message: Option<String>,

    /// Identity the change was made on behalf of
    #[arg(long, global = true, value_name = "EMAIL")]
    pub proxy: Option<String>,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a bare repository and write its config
    #[command(
        long_about = "Create a bare repository at --repo (if none exists) and write \
            the repository configuration.\n\n\
            Existing repositories are left untouched apart from the config file."
    )]
    Init {
        /// Default branch written to the repository config
        #[arg(long)]
        default_branch: Option<String>,

        /// Per-ref cache size written to the repository config
        #[arg(long)]
        cache_capacity: Option<usize>,

        /// Ref validated by `gitkv check --test`
        #[arg(long)]
        test_ref: Option<String>,
    },

    /// Print a key's data
    Get {
        /// Key to read
        key: String,

        /// Print versions and metadata instead of the data
        #[arg(long)]
        info: bool,
    },

    /// Create or update a key
    #[command(
        after_help = "\
EXAMPLES:
    # Create a key
    gitkv put settings/theme --data dark --content-type text/plain

    # Update it, naming the version that was read
    gitkv put settings/theme --data light --version <VERSION>"
    )]
    Put {
        /// Key to write
        key: String,

        /// Read the data from a file
        #[arg(long, conflicts_with = "data")]
        file: Option<PathBuf>,

        /// Data given inline
        #[arg(long)]
        data: Option<String>,

        /// Content type of a new key (inherits from its directory otherwise)
        #[arg(long)]
        content_type: Option<String>,

        /// Version being replaced; omit to create the key
        #[arg(long)]
        version: Option<String>,
    },

    /// Delete a key
    Delete {
        /// Key to delete
        key: String,

        /// Version being deleted
        #[arg(long)]
        version: String,
    },

    /// List keys below a directory
    List {
        /// Directory to list (default: the root)
        #[arg(default_value = "")]
        prefix: String,

        /// Include keys in nested directories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Write a key's metadata, or a directory's with `dir/`
    Meta {
        /// Key or directory key (`dir/`)
        key: String,

        /// Content type
        #[arg(long)]
        content_type: Option<String>,

        /// Hide the key from readers
        #[arg(long, value_name = "BOOL")]
        hidden: Option<bool>,

        /// Refuse updates and deletes of the key
        #[arg(long, value_name = "BOOL")]
        protected: Option<bool>,

        /// Version of the metadata being replaced
        #[arg(long)]
        version: Option<String>,
    },

    /// Manage branches
    Branch {
        #[command(subcommand)]
        action: BranchAction,
    },

    /// Manage users of the ref
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Validate metadata and user records
    Check {
        /// Check every branch
        #[arg(long, conflicts_with = "test")]
        all: bool,

        /// Check the configured test ref
        #[arg(long)]
        test: bool,
    },
}

/// Branch subcommands.
#[derive(Subcommand, Debug)]
pub enum BranchAction {
    /// Create a branch at the current commit of another ref
    Create {
        name: String,

        /// Base ref (default: the default branch)
        #[arg(long)]
        from: Option<String>,
    },

    /// Force-delete branches
    Delete {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

/// User subcommands.
#[derive(Subcommand, Debug)]
pub enum UserAction {
    /// Add a user
    Add {
        name: String,

        #[arg(long)]
        password: String,

        /// Role granted to the user (repeatable)
        #[arg(long = "role")]
        roles: Vec<String>,
    },

    /// Show a user and its version
    Get { name: String },

    /// Replace a user's roles and optionally its password
    Update {
        name: String,

        #[arg(long = "role")]
        roles: Vec<String>,

        #[arg(long)]
        password: Option<String>,

        #[arg(long)]
        version: String,
    },

    /// Delete a user
    Delete {
        name: String,

        #[arg(long)]
        version: String,
    },
}
