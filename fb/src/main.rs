//! fifobell - external-trigger broadcast coordinator
//!
//! CLI entry point for running the coordinator and poking it from outside.

use std::io;
use std::time::Duration;

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use eyre::{Context, Result};
use tracing::{debug, info, warn};

use fifobell::channel::{self, announce};
use fifobell::cli::{Cli, Command, OutputFormat, RunArgs, config_path_from_args, generate_after_help};
use fifobell::config::Config;
use fifobell::events::{ConsolePrinter, EventBus};
use fifobell::runtime::{Runtime, RuntimeConfig};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level_str = cli_log_level.or(config_log_level);
    let level = match level_str.map(|s| s.to_uppercase()) {
        Some(s) => match s.as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    // Status lines own stdout; diagnostics go to stderr
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_target(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .try_init()
        .map_err(|e| eyre::eyre!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Build command with dynamic after_help that shows the announced channel;
    // logging is not up yet, so a bad config just falls back to defaults here
    let help_config = Config::load(config_path_from_args(std::env::args_os()).as_ref()).unwrap_or_default();
    let cmd = Cli::command().after_help(generate_after_help(help_config.channel.announce_file.as_deref()));
    let cli = Cli::from_arg_matches(&cmd.get_matches())?;

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Run(args)) => {
            debug!(?args, "main: matched Run command");
            cmd_run(config, args).await
        }
        Some(Command::Trigger { message, channel, wait }) => {
            debug!(?channel, wait, "main: matched Trigger command");
            cmd_trigger(&config, &message, channel, wait).await
        }
        Some(Command::Channel) => {
            debug!("main: matched Channel command");
            cmd_channel(&config)
        }
        None => {
            debug!("main: no command specified, running with defaults");
            cmd_run(config, RunArgs::default()).await
        }
    }
}

/// Run the trigger loop and workers until a signal, `--count` or a fatal error
async fn cmd_run(mut config: Config, args: RunArgs) -> Result<()> {
    debug!(?args, "cmd_run: called");
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(delay_ms) = args.delay_ms {
        config.processing_delay_ms = delay_ms;
    }
    if let Some(fanout) = args.fanout {
        config.fanout = fanout;
    }
    config.validate().context("Invalid configuration")?;

    info!(
        workers = config.workers,
        delay_ms = config.processing_delay_ms,
        fanout = %config.fanout,
        "fifobell starting"
    );

    let bus = EventBus::with_default_capacity();
    let printer = ConsolePrinter::new(io::stdout(), args.format);
    let printer_handle = tokio::spawn(printer.run(bus.subscribe()));

    let runtime = Runtime::start(RuntimeConfig::from_config(&config, args.count), &bus)?;
    let stopper = runtime.stopper();
    let mut join = tokio::task::spawn_blocking(move || runtime.join());

    #[cfg(unix)]
    let result = {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = &mut join => result,
            _ = sigint.recv() => {
                warn!("SIGINT received, shutting down");
                stopper.stop();
                join.await
            }
            _ = sigterm.recv() => {
                warn!("SIGTERM received, shutting down");
                stopper.stop();
                join.await
            }
        }
    };

    #[cfg(not(unix))]
    let result = tokio::select! {
        result = &mut join => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("Ctrl+C received, shutting down");
            stopper.stop();
            join.await
        }
    };

    // Emitters are gone once the threads are joined; dropping the bus ends the printer
    drop(bus);
    if let Err(e) = printer_handle.await {
        warn!(error = %e, "Console printer task failed");
    }

    let summary = result.context("Runtime task failed")??;
    if args.format == OutputFormat::Text {
        println!(
            "{} Stopped after {} trigger(s), {} unit(s) of work",
            "✓".green(),
            summary.triggers,
            summary.completed()
        );
    }
    Ok(())
}

/// Write one payload to the running coordinator's channel
async fn cmd_trigger(config: &Config, message: &str, channel: Option<std::path::PathBuf>, wait: u64) -> Result<()> {
    debug!(%message, ?channel, wait, "cmd_trigger: called");
    let path = match channel {
        Some(path) => path,
        None => {
            let announce_file = config
                .channel
                .announce_file
                .clone()
                .ok_or_else(|| eyre::eyre!("No announce file configured; pass --channel"))?;
            let found = tokio::task::spawn_blocking(move || {
                announce::wait_for_channel(&announce_file, None, Duration::from_secs(wait))
            })
            .await
            .context("Announce wait task failed")??;
            found.ok_or_else(|| eyre::eyre!("No coordinator is listening; start one with `fb run`"))?
        }
    };

    let payload = message.as_bytes().to_vec();
    let target = path.clone();
    let bytes = tokio::task::spawn_blocking(move || channel::fire(&target, &payload))
        .await
        .context("Trigger task failed")?
        .context(format!("Failed to trigger {}", path.display()))?;

    println!(
        "{} Triggered {} ({} bytes)",
        "✓".green(),
        path.display().to_string().cyan(),
        bytes
    );
    Ok(())
}

/// Print the announced channel path
fn cmd_channel(config: &Config) -> Result<()> {
    debug!("cmd_channel: called");
    let announce_file = config
        .channel
        .announce_file
        .as_ref()
        .ok_or_else(|| eyre::eyre!("No announce file configured"))?;

    match announce::read(announce_file)? {
        Some(path) if path.exists() => {
            println!("{}", path.display());
            Ok(())
        }
        _ => Err(eyre::eyre!(
            "No channel announced in {}",
            announce_file.display()
        )),
    }
}
