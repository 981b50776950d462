use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "reprise")]
#[command(about = "Keep video bookmarks and resume positions in sync across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the engine config file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Derive the resource key of a media element
    Key(MediaArgs),
    /// Bookmark a position
    Add {
        /// Resource key
        key: String,
        /// Position as seconds, m:ss or h:mm:ss
        position: String,
        /// Bookmark label (defaults to the formatted position)
        #[arg(short, long, default_value = "")]
        label: String,
        /// Color tag (generic, important, alert)
        #[arg(long)]
        color: Option<String>,
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// Record the last playback position of a resource
    Position {
        /// Resource key
        key: String,
        /// Position as seconds, m:ss or h:mm:ss
        position: String,
        #[command(flatten)]
        resource: ResourceArgs,
    },
    /// List bookmarks of one resource, or every bookmarked resource
    List {
        /// Resource key
        key: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a bookmark
    Delete {
        /// Resource key
        key: String,
        /// Bookmark index (as listed) or bookmark id
        target: String,
    },
    /// Export every record
    Export {
        /// Export format
        #[arg(long, value_enum, default_value_t = ExportFormat::Json)]
        format: ExportFormat,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Merge a JSON export into the local store
    Import {
        /// Input path (stdin when omitted or "-")
        path: Option<PathBuf>,
    },
    /// Delete every local record and drop them from the remote on next sync
    Clear {
        /// Skip the confirmation check
        #[arg(long)]
        yes: bool,
    },
    /// Run one sync cycle against the configured remote
    Sync,
    /// Keep syncing in the background until interrupted
    Watch {
        /// Treat a tracked resource as playing
        #[arg(long)]
        playing: bool,
        /// Read "KEY POSITION" lines from stdin; the latest position per
        /// resource is saved when watching stops
        #[arg(long)]
        positions: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Observable facts about a media element.
#[derive(Args, Debug, Clone, Default)]
pub struct MediaArgs {
    /// Page URL hosting the element
    pub page_url: Option<String>,
    /// URL currently being played
    #[arg(long)]
    pub content_url: Option<String>,
    /// Duration in seconds
    #[arg(long)]
    pub duration: Option<f64>,
    #[arg(long, default_value_t = 0)]
    pub width: u32,
    #[arg(long, default_value_t = 0)]
    pub height: u32,
    #[arg(long)]
    pub poster: Option<String>,
    /// Declared source URL (repeatable)
    #[arg(long = "source")]
    pub sources: Vec<String>,
    /// Read the full media context from a JSON file instead
    #[arg(long, value_name = "PATH", conflicts_with = "page_url")]
    pub context: Option<PathBuf>,
}

/// Resource metadata stored alongside the position.
#[derive(Args, Debug, Clone, Default)]
pub struct ResourceArgs {
    /// Resource duration as seconds, m:ss or h:mm:ss
    #[arg(long)]
    pub duration: Option<String>,
    /// Resource title
    #[arg(long)]
    pub title: Option<String>,
    /// Page URL of the resource
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum ExportFormat {
    Json,
    Markdown,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
