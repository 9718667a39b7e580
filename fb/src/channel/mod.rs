//! One-shot named trigger channels
//!
//! Each trigger cycle gets its own FIFO inside a private temporary directory.
//! The loop opens the read end, waits for one external writer, drains it and
//! then destroys both the FIFO and its directory. A channel is never reused.
//!
//! ```text
//! $TMPDIR/
//! └── fifobell-XXXXXX/     # mode 0700, removed after the cycle
//!     └── trigger-<seq>    # FIFO, mode 0600
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::sys::stat::Mode;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::TriggerError;
use crate::shutdown::Shutdown;

pub mod announce;
pub mod producer;

pub use producer::fire;

/// Default prefix of the per-channel temporary directory
pub const DEFAULT_PREFIX: &str = "fifobell-";

const READ_CHUNK: usize = 4096;

/// Get the default announce file path
///
/// Lives next to other per-user runtime files, falling back to /tmp.
pub fn default_announce_path() -> PathBuf {
    dirs::runtime_dir()
        .or_else(dirs::data_local_dir)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("fifobell")
        .join("channel")
}

/// A provisioned FIFO and the private directory holding it
#[derive(Debug)]
pub struct Channel {
    dir: TempDir,
    path: PathBuf,
    seq: u64,
}

impl Channel {
    /// Create a fresh FIFO named `trigger-<seq>` in a new temp dir under `parent`
    pub fn provision(parent: &Path, prefix: &str, seq: u64) -> Result<Self, TriggerError> {
        debug!(?parent, prefix, seq, "Channel::provision: called");
        let dir = tempfile::Builder::new()
            .prefix(prefix)
            .tempdir_in(parent)
            .map_err(|source| TriggerError::Provision {
                path: parent.to_path_buf(),
                source,
            })?;

        let path = dir.path().join(format!("trigger-{}", seq));
        nix::unistd::mkfifo(path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR).map_err(|errno| TriggerError::Provision {
            path: path.clone(),
            source: io::Error::from(errno),
        })?;

        debug!(?path, "Channel::provision: fifo created");
        Ok(Self { dir, path, seq })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Directory that is removed together with the FIFO
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Open the read end without waiting for a writer
    ///
    /// Writers can connect as soon as this returns.
    pub fn listen(&self) -> Result<Listener<'_>, TriggerError> {
        debug!(path = ?self.path, "Channel::listen: opening read end");
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_NONBLOCK.bits())
            .open(&self.path)
            .map_err(|source| TriggerError::Open {
                path: self.path.clone(),
                source,
            })?;
        Ok(Listener { file, path: &self.path })
    }

    /// Remove the FIFO and its directory
    ///
    /// Dropping a `Channel` removes both as well; this variant reports failures.
    pub fn destroy(self) -> io::Result<()> {
        debug!(path = ?self.path, "Channel::destroy: called");
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(path = ?self.path, error = %e, "Failed to remove channel fifo");
                return Err(e);
            }
        }
        self.dir.close()
    }
}

/// Open read end of a channel
#[derive(Debug)]
pub struct Listener<'a> {
    file: File,
    path: &'a Path,
}

impl Listener<'_> {
    /// Wait for a writer, read until it closes its end, return the byte count
    ///
    /// Parks in `poll(2)` on the FIFO and the shutdown wake pipe, so there is
    /// no timeout and no spinning, yet cancellation is seen immediately.
    pub fn drain(&mut self, shutdown: &Shutdown) -> Result<usize, TriggerError> {
        let mut buf = [0u8; READ_CHUNK];
        let mut total = 0usize;

        loop {
            self.wait_readable(shutdown)?;

            loop {
                match self.file.read(&mut buf) {
                    Ok(0) => {
                        debug!(path = ?self.path, total, "Listener::drain: writer closed");
                        return Ok(total);
                    }
                    Ok(n) => total += n,
                    Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                    Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                    Err(source) => {
                        return Err(TriggerError::Drain {
                            path: self.path.to_path_buf(),
                            source,
                        });
                    }
                }
            }
        }
    }

    // Until a writer has connected once, a non-blocking FIFO read end reports
    // neither POLLIN nor POLLHUP, so this parks until the producer arrives.
    fn wait_readable(&self, shutdown: &Shutdown) -> Result<(), TriggerError> {
        loop {
            let mut fds = [
                PollFd::new(self.file.as_fd(), PollFlags::POLLIN),
                PollFd::new(shutdown.wake_fd(), PollFlags::POLLIN),
            ];

            match poll(&mut fds, PollTimeout::NONE) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(errno) => {
                    return Err(TriggerError::Drain {
                        path: self.path.to_path_buf(),
                        source: io::Error::from(errno),
                    });
                }
            }

            if fds[1].any().unwrap_or(false) {
                debug!(path = ?self.path, "Listener::wait_readable: cancelled");
                return Err(TriggerError::Cancelled);
            }
            if fds[0].any().unwrap_or(false) {
                return Ok(());
            }
        }
    }
}
