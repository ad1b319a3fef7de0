/// Decoded view of a raw `waitpid(2)` status.
///
/// The exit-code accessors are only meaningful under `exited()` and the
/// signal accessors only under `signaled()`; calling one outside its guard is
/// a precondition violation, not a recoverable error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessStatus {
    raw: libc::c_int,
}

impl ProcessStatus {
    pub fn from_raw(raw: libc::c_int) -> Self {
        ProcessStatus { raw }
    }

    pub fn raw(&self) -> libc::c_int {
        self.raw
    }

    pub fn exited(&self) -> bool {
        libc::WIFEXITED(self.raw)
    }

    /// Precondition: `exited()`.
    pub fn exit_code(&self) -> i32 {
        assert!(self.exited(), "exit_code() on a non-exited status");
        libc::WEXITSTATUS(self.raw)
    }

    pub fn signaled(&self) -> bool {
        libc::WIFSIGNALED(self.raw)
    }

    /// Precondition: `signaled()`.
    pub fn termsig(&self) -> i32 {
        assert!(self.signaled(), "termsig() on a non-signaled status");
        libc::WTERMSIG(self.raw)
    }

    /// Precondition: `signaled()`.
    pub fn coredumped(&self) -> bool {
        assert!(self.signaled(), "coredumped() on a non-signaled status");
        libc::WCOREDUMP(self.raw)
    }
}
