use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "notely")]
#[command(about = "Offline-first notes that sync when you're online")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the client config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new note
    #[command(alias = "new")]
    Add {
        /// Note title
        #[arg(long)]
        title: Option<String>,
        /// Tag to attach (repeatable); #hashtags in the content are added too
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Note content (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// List notes, most recently modified first
    List {
        /// Number of notes to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Show every note instead of the most recent ones
        #[arg(long, conflicts_with = "limit")]
        all: bool,
        /// Filter notes by tag name
        #[arg(long)]
        tag: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a single note
    Show {
        /// Note ID or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing note (opens $EDITOR when no field is given)
    Edit {
        /// Note ID or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New content
        #[arg(long)]
        content: Option<String>,
        /// Replace the tag set (repeatable)
        #[arg(long = "tag", value_name = "TAG")]
        tags: Vec<String>,
        /// Remove all tags
        #[arg(long, conflicts_with = "tags")]
        clear_tags: bool,
    },
    /// Delete a note
    Delete {
        /// Note ID or unique ID prefix
        id: String,
    },
    /// Push local changes and pull the server's copy
    Sync,
    /// Show sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage server URL and access token
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Set the sync server URL
    SetUrl {
        /// Server base URL, e.g. https://notes.example.com
        url: String,
    },
    /// Store the access token used for sync
    SetToken {
        /// Bearer token issued for your account
        token: String,
    },
    /// Remove the stored access token
    ClearToken,
}
