//! Descriptor ownership and buffered I/O over raw file descriptors.
//!
//! `FileHandle` owns a native descriptor and closes it on drop unless it has
//! been disowned. `FdStream` layers fixed-size read/write buffers on top so
//! line-oriented and formatted I/O can run over pipes, regular files, or
//! sockets without pulling whole streams into memory.

use std::io;
use std::os::unix::io::RawFd;

use anyhow::{Context, Result};

mod line;
mod stream;

pub use line::LineReader;
pub use stream::{FdStream, DEFAULT_BUF_SIZE};

/// Sentinel value for a handle that owns nothing.
pub const INVALID_FD: RawFd = -1;

/// Exclusive owner of a raw file descriptor.
///
/// Move-only: transferring a `FileHandle` transfers responsibility for the
/// close. The descriptor is closed on drop unless `disown` was called.
#[derive(Debug)]
pub struct FileHandle {
    fd: RawFd,
}

impl Default for FileHandle {
    fn default() -> Self {
        FileHandle { fd: INVALID_FD }
    }
}

impl FileHandle {
    /// Takes ownership of an already-open descriptor.
    ///
    /// Rejects the invalid sentinel; does not probe whether `fd` is actually
    /// open.
    pub fn from_raw(fd: RawFd) -> Result<Self> {
        if fd == INVALID_FD {
            anyhow::bail!("cannot construct a FileHandle from the invalid descriptor");
        }
        Ok(FileHandle { fd })
    }

    pub fn is_valid(&self) -> bool {
        self.fd != INVALID_FD
    }

    /// Raw descriptor value. Precondition: the handle is valid.
    pub fn get(&self) -> RawFd {
        assert!(self.is_valid(), "get() on an invalid FileHandle");
        self.fd
    }

    /// Closes the descriptor. Precondition: the handle is valid.
    ///
    /// The handle becomes invalid even when the close fails; the descriptor
    /// state after a failed close is unspecified, so callers should treat the
    /// error as log-only.
    pub fn close(&mut self) -> Result<()> {
        assert!(self.is_valid(), "close() on an invalid FileHandle");
        let fd = self.fd;
        self.fd = INVALID_FD;
        let r = unsafe { libc::close(fd) };
        if r == -1 {
            return Err(io::Error::last_os_error()).with_context(|| format!("close fd {fd}"));
        }
        Ok(())
    }

    /// Releases ownership without closing. Precondition: the handle is valid.
    pub fn disown(&mut self) -> RawFd {
        assert!(self.is_valid(), "disown() on an invalid FileHandle");
        let fd = self.fd;
        self.fd = INVALID_FD;
        fd
    }

    /// Duplicates the descriptor onto `target`, closes the source, and
    /// re-points this handle at `target`.
    ///
    /// On `dup2` failure the handle is unchanged. If closing the source fails
    /// after a successful duplication, `target` is closed as well before the
    /// error is returned, so no descriptor leaks on the error path.
    pub fn dup_to(&mut self, target: RawFd) -> Result<()> {
        assert!(self.is_valid(), "dup_to() on an invalid FileHandle");
        let src = self.fd;
        if src == target {
            return Ok(());
        }
        let r = unsafe { libc::dup2(src, target) };
        if r == -1 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("dup2 fd {src} onto {target}"));
        }
        self.fd = target;
        let r = unsafe { libc::close(src) };
        if r == -1 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(target) };
            self.fd = INVALID_FD;
            return Err(err).with_context(|| format!("close fd {src} after dup2"));
        }
        Ok(())
    }

    /// Creates a pipe and returns the (read, write) ends.
    pub fn pipe() -> Result<(FileHandle, FileHandle)> {
        let mut fds: [libc::c_int; 2] = [INVALID_FD; 2];
        let r = unsafe { libc::pipe(fds.as_mut_ptr()) };
        if r == -1 {
            return Err(io::Error::last_os_error()).context("pipe");
        }
        Ok((FileHandle { fd: fds[0] }, FileHandle { fd: fds[1] }))
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.is_valid() {
            unsafe { libc::close(self.fd) };
        }
    }
}
