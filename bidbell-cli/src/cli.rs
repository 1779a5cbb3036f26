use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "bidbell",
    version,
    about = "Live auction notifications in your terminal",
    long_about = "Bidbell keeps a live view of your auction notifications: it loads the \
                  current list over REST, follows the push channel and reconnects when it drops."
)]
pub struct Args {
    /// Configuration file (defaults to <config dir>/bidbell/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Push endpoint, e.g. wss://example.com/ws
    #[arg(long, env = "BIDBELL_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// REST API base URL, e.g. https://example.com/api
    #[arg(long, env = "BIDBELL_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Bearer token
    #[arg(long, env = "BIDBELL_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty, global = true)]
    pub output: OutputFormat,

    /// Write daily-rotated log files to this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Follow notifications live until Ctrl-C
    Watch {
        /// Snapshot page size
        #[arg(short, long)]
        limit: Option<u32>,

        /// Skip the snapshot reload after a reconnect
        #[arg(long)]
        no_resync: bool,
    },

    /// Print the current notifications
    List {
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Mark one notification read
    Read { id: String },

    /// Mark every notification read
    ReadAll,

    /// Delete one notification
    Delete { id: String },

    /// Print the effective configuration
    Config,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable, colored when the terminal supports it
    Pretty,
    /// One JSON object per line
    Json,
}
