use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Output format for listing commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "trellis")]
#[command(about = "trellis - maintenance tool for a Trellis note database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/trellis/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path (overrides config file and TRELLIS_DB_PATH)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Set output format (table, json)
    #[arg(short = 'f', long, global = true, value_enum, default_value = "table")]
    pub format: OutputFormat,
}

impl Cli {
    /// Level requested on the command line, if any
    pub fn requested_level(&self) -> Option<LevelFilter> {
        if self.verbose {
            Some(LevelFilter::DEBUG)
        } else {
            self.log_level.map(LevelFilter::from)
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and its root note
    Init {
        /// Environment variable holding the first protected-session secret
        #[arg(long)]
        secret_env: Option<String>,
    },

    /// Entity counts and database size
    Stats,

    /// Verify the database loads into a consistent graph
    Check,

    /// Print the note tree
    Tree {
        /// Note to start from
        #[arg(default_value = "root")]
        note: String,

        /// Maximum depth below the starting note
        #[arg(short, long)]
        depth: Option<usize>,
    },

    /// Print the path from a hoisted note down to a note
    Path {
        note: String,

        /// Hoisted note the path starts at
        #[arg(long, default_value = "root")]
        hoisted: String,

        /// Print every path from the root instead
        #[arg(long)]
        all: bool,
    },

    /// Print a note's effective attributes, inherited ones included
    Attributes {
        note: String,

        /// Only attributes with this name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Read the change feed
    Changes {
        /// Print entries after this sequence
        #[arg(long, default_value_t = 0)]
        since: i64,

        #[arg(short = 'n', long, default_value_t = 50)]
        limit: usize,
    },

    /// Erase soft-deleted rows and unreferenced blobs
    Purge {
        /// Only rows deleted at least this many days ago
        #[arg(long, default_value_t = 7)]
        older_than_days: i64,
    },

    /// Create a note
    New {
        /// Parent note id
        parent: String,

        title: String,

        /// Initial content
        #[arg(long)]
        content: Option<String>,
    },

    /// Place an existing note under another parent as well
    Clone {
        note: String,
        parent: String,
    },
}
