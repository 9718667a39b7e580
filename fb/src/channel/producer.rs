//! Writer side of a trigger channel
//!
//! Used by `fb trigger`. The FIFO is opened non-blocking so that a channel
//! with no reader fails fast instead of hanging forever on an unlinked inode.

use std::fs::OpenOptions;
use std::io::{self, ErrorKind, Write};
use std::os::fd::AsFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::debug;

use crate::error::TriggerError;

/// Connect to the channel at `path`, write `payload`, close
///
/// Returns the number of bytes written.
pub fn fire(path: &Path, payload: &[u8]) -> Result<usize, TriggerError> {
    debug!(?path, len = payload.len(), "fire: called");
    let write_error = |source: io::Error| TriggerError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
        .map_err(|source| match source.raw_os_error() {
            Some(code) if code == Errno::ENXIO as i32 => TriggerError::NotListening(path.to_path_buf()),
            _ => TriggerError::Open {
                path: path.to_path_buf(),
                source,
            },
        })?;

    let mut written = 0usize;
    while written < payload.len() {
        match file.write(&payload[written..]) {
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                // Pipe buffer full: park until the reader drains some of it
                let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLOUT)];
                match poll(&mut fds, PollTimeout::NONE) {
                    Ok(_) | Err(Errno::EINTR) => {}
                    Err(errno) => return Err(write_error(io::Error::from(errno))),
                }
            }
            Err(e) => return Err(write_error(e)),
        }
    }

    debug!(?path, written, "fire: done");
    Ok(written)
}
