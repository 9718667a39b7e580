//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::channel::announce;
use crate::worker::FanoutPolicy;

/// fifobell - external-trigger broadcast coordinator
#[derive(Parser)]
#[command(
    name = "fb",
    about = "Fan out one external FIFO trigger to many worker threads",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute (defaults to `run`)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the trigger loop and workers until interrupted
    Run(RunArgs),

    /// Write to the announced channel, waking the running coordinator
    Trigger {
        /// Payload to write (content is not interpreted)
        #[arg(short, long, default_value = "trigger")]
        message: String,

        /// Channel path (default: read from the announce file)
        #[arg(long)]
        channel: Option<PathBuf>,

        /// Seconds to wait for a channel to be announced
        #[arg(short, long, default_value = "0")]
        wait: u64,
    },

    /// Print the currently announced channel path
    Channel,
}

/// Options for `fb run`; each overrides the config file
#[derive(Debug, Default, Clone, clap::Args)]
pub struct RunArgs {
    /// Number of worker threads
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Processing delay in milliseconds
    #[arg(short, long = "delay-ms")]
    pub delay_ms: Option<u64>,

    /// Fanout policy (broadcast, shared, exclusive)
    #[arg(short, long)]
    pub fanout: Option<FanoutPolicy>,

    /// Exit after this many triggers
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Status output format
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,
}

/// Find `-c`/`--config` before clap has parsed, so help can use that config
pub fn config_path_from_args<I, S>(args: I) -> Option<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    let mut args = args.into_iter();
    let mut found = None;
    while let Some(arg) = args.next() {
        let arg = arg.as_ref().to_string_lossy().into_owned();
        if arg == "--" {
            break;
        }
        if arg == "-c" || arg == "--config" {
            found = args.next().map(|v| PathBuf::from(v.as_ref()));
        } else if let Some(value) = arg.strip_prefix("--config=") {
            found = Some(PathBuf::from(value));
        } else if let Some(value) = arg.strip_prefix("-c").filter(|v| !v.is_empty()) {
            found = Some(PathBuf::from(value));
        }
    }
    debug!(?found, "config_path_from_args: returning");
    found
}

/// Channel named by the announce file, if it still exists
pub fn announced_channel(announce_file: &Path) -> Option<PathBuf> {
    debug!(announce_file = %announce_file.display(), "announced_channel: called");
    let result = announce::read(announce_file).ok().flatten().filter(|p| p.exists());
    debug!(?result, "announced_channel: returning");
    result
}

/// Generate the after_help text with the current channel status
///
/// `announce_file` is the configured one; `None` means announcing is off.
pub fn generate_after_help(announce_file: Option<&Path>) -> String {
    debug!(?announce_file, "generate_after_help: called");
    let mut help = String::new();

    help.push_str("Channel:\n");
    match announce_file.and_then(announced_channel) {
        Some(path) => {
            debug!("generate_after_help: channel announced");
            help.push_str(&format!("  \u{2705} listening on {}\n", path.display()));
        }
        None => {
            debug!("generate_after_help: no channel announced");
            help.push_str("  \u{274C} no coordinator listening\n");
        }
    }

    help.push('\n');
    match announce_file {
        Some(path) => help.push_str(&format!("Announce file: {}\n", path.display())),
        None => help.push_str("Announce file: disabled\n"),
    }

    debug!("generate_after_help: returning help text");
    help
}

/// Output format for status lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!(%s, "OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use: text or json", s))
            }
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Json => write!(f, "json"),
        }
    }
}
