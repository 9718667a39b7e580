//! Announce file for the currently listening channel
//!
//! The trigger loop publishes the path of the FIFO it is listening on so an
//! external producer can find it, and retracts it as soon as the channel
//! stops accepting writers.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::TriggerError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn announce_error(path: &Path, source: std::io::Error) -> TriggerError {
    TriggerError::Announce {
        path: path.to_path_buf(),
        source,
    }
}

/// Atomically replace the announce file contents with `channel`
pub fn publish(announce_file: &Path, channel: &Path) -> Result<(), TriggerError> {
    debug!(?announce_file, ?channel, "announce::publish: called");
    let parent = announce_file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(|e| announce_error(announce_file, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| announce_error(announce_file, e))?;
    writeln!(tmp, "{}", channel.display()).map_err(|e| announce_error(announce_file, e))?;
    tmp.persist(announce_file)
        .map_err(|e| announce_error(announce_file, e.error))?;

    debug!(?announce_file, "announce::publish: written");
    Ok(())
}

/// Read the announced channel, `None` when nothing is announced
pub fn read(announce_file: &Path) -> Result<Option<PathBuf>, TriggerError> {
    match fs::read_to_string(announce_file) {
        Ok(contents) => {
            let trimmed = contents.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(PathBuf::from(trimmed)))
            }
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(announce_error(announce_file, e)),
    }
}

/// Remove the announce file if it still names `channel`
///
/// Leaves the file alone when another loop has already announced something else.
pub fn retract(announce_file: &Path, channel: &Path) -> Result<(), TriggerError> {
    debug!(?announce_file, ?channel, "announce::retract: called");
    if read(announce_file)?.as_deref() != Some(channel) {
        debug!("announce::retract: announce file names another channel");
        return Ok(());
    }
    match fs::remove_file(announce_file) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(announce_error(announce_file, e)),
    }
}

/// Poll the announce file until it names a channel other than `previous`
///
/// Returns `None` when `timeout` elapses first. A timeout too large to
/// represent as an instant waits without a deadline.
pub fn wait_for_channel(
    announce_file: &Path,
    previous: Option<&Path>,
    timeout: Duration,
) -> Result<Option<PathBuf>, TriggerError> {
    let deadline = Instant::now().checked_add(timeout);
    loop {
        if let Some(channel) = read(announce_file)?
            && Some(channel.as_path()) != previous
        {
            return Ok(Some(channel));
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            return Ok(None);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}
