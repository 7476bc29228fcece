use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use clog_store::SyncMode;

#[derive(Parser)]
#[command(
    name = "clog",
    about = "Ordered, resumable change log",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding events.wal and progress.wal
    #[arg(short, long, global = true, default_value = "clog-data")]
    pub data_dir: PathBuf,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SyncArg {
    EveryWrite,
    OsDefault,
}

impl From<SyncArg> for SyncMode {
    fn from(arg: SyncArg) -> Self {
        match arg {
            SyncArg::EveryWrite => SyncMode::EveryWrite,
            SyncArg::OsDefault => SyncMode::OsDefault,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Append one event
    Append(AppendArgs),
    /// Show the event at an offset
    Get(GetArgs),
    /// Print an inclusive range of events
    Replay(ReplayArgs),
    /// Read a consumer's unprocessed events, optionally acknowledging them
    Consume(ConsumeArgs),
    /// Acknowledge a consumer's progress
    Ack(AckArgs),
    /// Show acknowledged progress for one or all consumers
    Progress(ProgressArgs),
    /// Summarize the data directory
    Inspect,
    /// Start the HTTP server
    Serve(ServeArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    pub event_type: String,
    #[arg(long, default_value = "")]
    pub before: String,
    #[arg(long, default_value = "")]
    pub after: String,
    #[arg(long, default_value = "clog-cli")]
    pub source: String,
    /// Treat --before and --after as hex instead of UTF-8 text
    #[arg(long)]
    pub hex: bool,
    #[arg(long)]
    pub sync: Option<SyncArg>,
}

#[derive(Args)]
pub struct GetArgs {
    pub offset: u64,
}

#[derive(Args)]
pub struct ReplayArgs {
    #[arg(long, default_value = "0")]
    pub from: u64,
    /// Last offset to include; defaults to the end of the log
    #[arg(long)]
    pub to: Option<u64>,
}

#[derive(Args)]
pub struct ConsumeArgs {
    pub consumer: String,
    #[arg(short = 'n', long, default_value = "100")]
    pub max: usize,
    /// Acknowledge the last event printed
    #[arg(long)]
    pub ack: bool,
}

#[derive(Args)]
pub struct AckArgs {
    pub consumer: String,
    pub offset: u64,
}

#[derive(Args)]
pub struct ProgressArgs {
    pub consumer: Option<String>,
}

#[derive(Args)]
pub struct ServeArgs {
    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Keep everything in memory instead of using --data-dir
    #[arg(long)]
    pub memory: bool,
    #[arg(long)]
    pub sync: Option<SyncArg>,
    #[arg(long)]
    pub max_read_batch: Option<usize>,
}
