//! Console printer - renders events as status lines
//!
//! Subscribes to the EventBus and writes one line per event, either as
//! colored human-readable text or as JSON lines.

use std::io::Write;

use chrono::Local;
use colored::*;
use eyre::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::Event;
use crate::cli::OutputFormat;

/// JSON line wrapper with a timestamp
#[derive(Debug, Serialize)]
struct ConsoleEntry<'a> {
    timestamp: String,
    #[serde(flatten)]
    event: &'a Event,
}

/// Writes events to a sink in the chosen format
pub struct ConsolePrinter<W: Write> {
    out: W,
    format: OutputFormat,
}

impl<W: Write> ConsolePrinter<W> {
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self { out, format }
    }

    /// Render a single event
    pub fn print(&mut self, event: &Event) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let entry = ConsoleEntry {
                    timestamp: Local::now().to_rfc3339(),
                    event,
                };
                writeln!(self.out, "{}", serde_json::to_string(&entry)?)?;
            }
            OutputFormat::Text => {
                let time = Local::now().format("%H:%M:%S%.3f").to_string();
                writeln!(self.out, "{} {}", time.dimmed(), paint(event))?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    /// Print events until every emitter is gone
    pub async fn run(mut self, mut rx: broadcast::Receiver<Event>) -> W {
        debug!(format = %self.format, "ConsolePrinter::run: starting");
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.print(&event) {
                        warn!(error = %e, "ConsolePrinter: failed to print event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "ConsolePrinter: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("ConsolePrinter: channel closed, shutting down");
                    break;
                }
            }
        }
        self.out
    }
}

fn paint(event: &Event) -> ColoredString {
    let line = event.status_line();
    match event {
        Event::WorkerWaiting { .. } => line.normal(),
        Event::WorkerCompleted { .. } => line.green(),
        Event::WorkerStopped { .. } | Event::TriggerStopped { .. } => line.yellow(),
        Event::ChannelReady { .. } => line.cyan(),
        Event::ChannelDrained { .. } | Event::Signaled { .. } => line.bold(),
        Event::ChannelRemoved { .. } => line.dimmed(),
    }
}
