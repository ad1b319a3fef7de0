use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::panic::{catch_unwind, AssertUnwindSafe};

use anyhow::{Context, Result};

use tcrun_fd::{FdStream, FileHandle};

use crate::policy::StreamPolicy;
use crate::status::ProcessStatus;

/// Reserved child exit status meaning "stream rewiring failed before the test
/// body ran". Part of the public contract: a body that exits with this value
/// is indistinguishable from a setup failure.
pub const EXIT_SETUP_FAILED: i32 = 120;

/// Child exit status when the test body returned an error or panicked.
pub const EXIT_BODY_FAILED: i32 = 1;

/// Pre-fork realization of a `StreamPolicy`: pipes are created and paths
/// converted to C strings before `fork` so the child allocates nothing on its
/// happy path.
enum Wiring {
    Capture { read: FileHandle, write: FileHandle },
    Inherit,
    RedirectFd(RawFd),
    RedirectPath { path: CString, mode: libc::mode_t },
}

fn prepare(policy: StreamPolicy) -> Result<Wiring> {
    match policy {
        StreamPolicy::Capture => {
            let (read, write) = FileHandle::pipe().context("create capture pipe")?;
            Ok(Wiring::Capture { read, write })
        }
        StreamPolicy::Inherit => Ok(Wiring::Inherit),
        StreamPolicy::RedirectFd(fd) => Ok(Wiring::RedirectFd(fd)),
        StreamPolicy::RedirectPath { path, mode } => {
            let cpath = CString::new(path.as_os_str().as_bytes())
                .with_context(|| format!("redirect path {} contains NUL", path.display()))?;
            Ok(Wiring::RedirectPath {
                path: cpath,
                mode: mode as libc::mode_t,
            })
        }
    }
}

/// Child-side application of one wiring onto a standard stream slot.
fn apply_in_child(wiring: Wiring, target: RawFd) -> Result<()> {
    match wiring {
        Wiring::Capture { read, mut write } => {
            drop(read);
            write.dup_to(target)?;
            // The child keeps the slot open for the body's lifetime.
            write.disown();
            Ok(())
        }
        Wiring::Inherit => Ok(()),
        Wiring::RedirectFd(fd) => {
            // The source stays open; the caller owns it.
            let r = unsafe { libc::dup2(fd, target) };
            if r == -1 {
                return Err(io::Error::last_os_error())
                    .with_context(|| format!("dup2 fd {fd} onto {target}"));
            }
            Ok(())
        }
        Wiring::RedirectPath { path, mode } => {
            let fd = unsafe {
                libc::open(
                    path.as_ptr(),
                    libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
                    mode as libc::c_uint,
                )
            };
            if fd == -1 {
                return Err(io::Error::last_os_error())
                    .with_context(|| format!("open {:?} for redirection", path));
            }
            let mut handle = FileHandle::from_raw(fd)?;
            handle.dup_to(target)?;
            handle.disown();
            Ok(())
        }
    }
}

/// Parent-side counterpart: keep the read end of a capture pipe, drop the
/// end the child now owns.
fn retain_in_parent(wiring: Wiring) -> Option<FdStream> {
    match wiring {
        Wiring::Capture { read, write } => {
            drop(write);
            Some(FdStream::new(read))
        }
        Wiring::Inherit | Wiring::RedirectFd(_) | Wiring::RedirectPath { .. } => None,
    }
}

/// Raw write to the child's current stderr slot; used where normal error
/// channels do not exist.
fn child_stderr(msg: &str) {
    let bytes = msg.as_bytes();
    unsafe { libc::write(libc::STDERR_FILENO, bytes.as_ptr().cast(), bytes.len()) };
}

fn run_child<F>(body: F, out: Wiring, err: Wiring) -> !
where
    F: FnOnce() -> Result<()>,
{
    if let Err(e) = apply_in_child(out, libc::STDOUT_FILENO) {
        child_stderr(&format!("tcrun: stdout setup failed: {e:#}\n"));
        unsafe { libc::_exit(EXIT_SETUP_FAILED) }
    }
    if let Err(e) = apply_in_child(err, libc::STDERR_FILENO) {
        child_stderr(&format!("tcrun: stderr setup failed: {e:#}\n"));
        unsafe { libc::_exit(EXIT_SETUP_FAILED) }
    }

    // Unwinding must not escape into the forked copy of the caller's stack.
    match catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(())) => unsafe { libc::_exit(0) },
        Ok(Err(e)) => {
            child_stderr(&format!("tcrun: test body failed: {e:#}\n"));
            unsafe { libc::_exit(EXIT_BODY_FAILED) }
        }
        Err(_) => {
            child_stderr("tcrun: test body panicked\n");
            unsafe { libc::_exit(EXIT_BODY_FAILED) }
        }
    }
}

/// Forks a child, rewires its stdout/stderr per the two policies, and runs
/// `body` in it.
///
/// The stdout policy is applied before the stderr policy; when both reference
/// the same target the later application wins. A policy failure in the child
/// is fatal to it: the body never runs and the child exits with
/// `EXIT_SETUP_FAILED`. Pipe-creation failure aborts the launch before any
/// process exists.
pub fn spawn<F>(body: F, stdout: StreamPolicy, stderr: StreamPolicy) -> Result<Child>
where
    F: FnOnce() -> Result<()>,
{
    let out = prepare(stdout)?;
    let err = prepare(stderr)?;

    let pid = unsafe { libc::fork() };
    match pid {
        -1 => Err(io::Error::last_os_error()).context("fork"),
        0 => run_child(body, out, err),
        _ => Ok(Child {
            pid,
            stdout: retain_in_parent(out),
            stderr: retain_in_parent(err),
        }),
    }
}

/// Parent-side handle to a launched child.
///
/// Captured stream adapters are readable before (and independently of) the
/// wait. A capture pipe is a bounded OS buffer: a child writing more than the
/// pipe holds will block until the parent reads, so drain captured streams
/// before waiting when nontrivial volume is expected.
#[derive(Debug)]
pub struct Child {
    pid: libc::pid_t,
    stdout: Option<FdStream>,
    stderr: Option<FdStream>,
}

impl Child {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Parent side of the stdout capture pipe, when the policy was `Capture`.
    pub fn stdout(&mut self) -> Option<&mut FdStream> {
        self.stdout.as_mut()
    }

    /// Parent side of the stderr capture pipe, when the policy was `Capture`.
    pub fn stderr(&mut self) -> Option<&mut FdStream> {
        self.stderr.as_mut()
    }

    /// Both capture ends at once, for callers that must interleave the two
    /// drains instead of reading one stream to EOF first.
    pub fn streams(&mut self) -> (Option<&mut FdStream>, Option<&mut FdStream>) {
        (self.stdout.as_mut(), self.stderr.as_mut())
    }

    /// Blocks until the child terminates and reaps it.
    ///
    /// Consuming `self` makes waiting a one-time operation; the captured
    /// adapters are released along with the handle.
    pub fn wait(self) -> Result<ProcessStatus> {
        let mut status: libc::c_int = 0;
        loop {
            let r = unsafe { libc::waitpid(self.pid, &mut status, 0) };
            if r == -1 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err).with_context(|| format!("waitpid {}", self.pid));
            }
            return Ok(ProcessStatus::from_raw(status));
        }
    }
}
