// SPDX-License-Identifier: Apache-2.0
// Copyright © 2021 Will Ross
//! Delivering frames over a named pipe.
//!
//! The pipe is opened fresh for every frame and closed right after, so each reader sees whole
//! 128 byte frames and a reader can come and go between frames. While nobody has the pipe open
//! for reading, delivery waits (checking for cancellation) instead of buffering frames.

use std::ffi::CString;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::sleep;
use std::time::Duration;

use tracing::{debug, info, warn};

use mlx90621::{FrameSink, TemperatureFrame};

/// Anyone can read the frames.
const FIFO_MODE: u32 = 0o666;

#[derive(Debug)]
pub struct FifoSink {
    path: PathBuf,
    poll_interval: Duration,
    cancel: Arc<AtomicBool>,
    /// Whether the last delivery found a reader, to only log reader changes.
    reader_present: bool,
}

impl FifoSink {
    /// Create the named pipe at `path` (unless there's one already).
    pub fn create(path: &Path, poll_interval: Duration, cancel: Arc<AtomicBool>) -> io::Result<Self> {
        match fs::metadata(path) {
            Ok(metadata) if metadata.file_type().is_fifo() => {
                debug!(path = %path.display(), "Reusing existing pipe");
            }
            Ok(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a named pipe", path.display()),
                ));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => make_fifo(path)?,
            Err(err) => return Err(err),
        }
        // mkfifo is subject to the umask.
        fs::set_permissions(path, fs::Permissions::from_mode(FIFO_MODE))?;
        info!(path = %path.display(), "Writing frames to pipe");
        Ok(Self {
            path: path.to_path_buf(),
            poll_interval,
            cancel,
            reader_present: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the pipe for writing, waiting for a reader. `None` means the wait was cancelled.
    fn open_for_reader(&mut self) -> io::Result<Option<fs::File>> {
        loop {
            if self.cancel.load(Ordering::SeqCst) {
                return Ok(None);
            }
            // Opening a pipe write-only and non-blocking fails with ENXIO when there's no reader,
            // instead of blocking until there is one.
            match OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&self.path)
            {
                Ok(file) => {
                    if !self.reader_present {
                        info!("Reader connected");
                        self.reader_present = true;
                    }
                    set_blocking(&file)?;
                    return Ok(Some(file));
                }
                Err(err) if err.raw_os_error() == Some(libc::ENXIO) => {
                    if self.reader_present {
                        info!("Reader disconnected, waiting for another");
                        self.reader_present = false;
                    }
                    sleep(self.poll_interval);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl FrameSink for FifoSink {
    type Error = io::Error;

    fn deliver(&mut self, frame: &TemperatureFrame) -> Result<(), Self::Error> {
        let mut file = match self.open_for_reader()? {
            Some(file) => file,
            None => return Ok(()),
        };
        // A frame is smaller than PIPE_BUF, so this is a single atomic write.
        match file.write_all(&frame.to_bytes()) {
            // The reader went away between the open and the write. The frame is dropped.
            Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                debug!("Reader closed the pipe mid-frame");
                self.reader_present = false;
                Ok(())
            }
            result => result,
        }
    }
}

impl Drop for FifoSink {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(_) => debug!(path = %self.path.display(), "Removed pipe"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => (),
            Err(err) => warn!(path = %self.path.display(), "Unable to remove pipe: {}", err),
        }
    }
}

fn make_fifo(path: &Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), FIFO_MODE as libc::mode_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Clear `O_NONBLOCK`, so the write waits for room in the pipe.
fn set_blocking(file: &fs::File) -> io::Result<()> {
    let fd = file.as_raw_fd();
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}
