use std::os::unix::io::RawFd;
use std::path::PathBuf;

/// Mode bits for files created by `RedirectPath`.
pub const DEFAULT_REDIRECT_MODE: u32 = 0o644;

/// How one of a child's standard streams (stdout or stderr) is connected.
///
/// A policy is consumed by exactly one `spawn` call; build a fresh one per
/// launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPolicy {
    /// Wire the stream to a pipe whose read end the parent keeps.
    Capture,
    /// Leave the stream connected to whatever the parent has open.
    Inherit,
    /// Duplicate the given descriptor onto the stream slot. The caller owns
    /// the descriptor and keeps it open across the launch.
    RedirectFd(RawFd),
    /// Redirect the stream to a file created (or truncated) at `path`.
    RedirectPath { path: PathBuf, mode: u32 },
}

impl StreamPolicy {
    pub fn redirect_path(path: impl Into<PathBuf>) -> Self {
        StreamPolicy::RedirectPath {
            path: path.into(),
            mode: DEFAULT_REDIRECT_MODE,
        }
    }

    pub fn redirect_path_with_mode(path: impl Into<PathBuf>, mode: u32) -> Self {
        StreamPolicy::RedirectPath {
            path: path.into(),
            mode,
        }
    }
}
