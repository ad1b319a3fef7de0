use std::io;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};

/// Highest signal number the fired table tracks.
pub const LAST_SIGNO: usize = 64;

// Process-wide per-signal "fired" flags. Written only from handler context
// (an atomic store, which is async-signal-safe) and read/cleared only from
// normal context. Reachable solely through `SignalHolder`.
const UNFIRED: AtomicBool = AtomicBool::new(false);
static FIRED: [AtomicBool; LAST_SIGNO + 1] = [UNFIRED; LAST_SIGNO + 1];

extern "C" fn note_fired(signo: libc::c_int) {
    let idx = signo as usize;
    if idx <= LAST_SIGNO {
        FIRED[idx].store(true, Ordering::Relaxed);
    }
}

fn take_fired(signo: libc::c_int) -> bool {
    FIRED[signo as usize].swap(false, Ordering::Relaxed)
}

fn clear_fired(signo: libc::c_int) {
    FIRED[signo as usize].store(false, Ordering::Relaxed);
}

/// Installs a handler for one signal and restores the previous disposition on
/// teardown.
///
/// Nesting two programmers on the same signal without restoring the inner one
/// first leaves the dispositions crossed; don't.
#[derive(Debug)]
pub struct SignalProgrammer {
    signo: libc::c_int,
    old: libc::sigaction,
    active: bool,
}

impl SignalProgrammer {
    /// Replaces the disposition of `signo` with `handler`, recording the
    /// prior disposition for `restore`.
    pub fn install(signo: libc::c_int, handler: extern "C" fn(libc::c_int)) -> Result<Self> {
        assert!(
            signo > 0 && (signo as usize) <= LAST_SIGNO,
            "signal number {signo} out of range"
        );
        let mut new: libc::sigaction = unsafe { mem::zeroed() };
        new.sa_sigaction = handler as usize;
        new.sa_flags = 0;
        unsafe { libc::sigemptyset(&mut new.sa_mask) };

        let mut old: libc::sigaction = unsafe { mem::zeroed() };
        let r = unsafe { libc::sigaction(signo, &new, &mut old) };
        if r == -1 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("sigaction install for signal {signo}"));
        }
        Ok(SignalProgrammer {
            signo,
            old,
            active: true,
        })
    }

    /// Reinstates the disposition recorded at install time.
    pub fn restore(&mut self) -> Result<()> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        let r = unsafe { libc::sigaction(self.signo, &self.old, ptr::null_mut()) };
        if r == -1 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("sigaction restore for signal {}", self.signo));
        }
        Ok(())
    }
}

impl Drop for SignalProgrammer {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Defers a signal for the duration of a critical section.
///
/// While the holder lives, an occurrence of the signal only marks the fired
/// flag. `process` (or teardown) re-raises a deferred occurrence under the
/// previously configured disposition, so the signal is delivered exactly once
/// and never silently swallowed.
#[derive(Debug)]
pub struct SignalHolder {
    signo: libc::c_int,
    programmer: Option<SignalProgrammer>,
}

impl SignalHolder {
    pub fn hold(signo: libc::c_int) -> Result<Self> {
        clear_fired(signo);
        let programmer = SignalProgrammer::install(signo, note_fired)?;
        Ok(SignalHolder {
            signo,
            programmer: Some(programmer),
        })
    }

    /// Whether the held signal has occurred and is pending re-delivery.
    pub fn pending(&self) -> bool {
        FIRED[self.signo as usize].load(Ordering::Relaxed)
    }

    /// Re-delivers a deferred occurrence now, under the prior disposition,
    /// then resumes holding.
    pub fn process(&mut self) -> Result<()> {
        if !take_fired(self.signo) {
            return Ok(());
        }
        let mut programmer = self
            .programmer
            .take()
            .expect("holder without an installed programmer");
        programmer.restore()?;
        let r = unsafe { libc::raise(self.signo) };
        if r != 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("raise signal {}", self.signo));
        }
        self.programmer = Some(SignalProgrammer::install(self.signo, note_fired)?);
        Ok(())
    }
}

impl Drop for SignalHolder {
    fn drop(&mut self) {
        if let Some(mut programmer) = self.programmer.take() {
            let _ = programmer.restore();
        }
        if take_fired(self.signo) {
            unsafe { libc::raise(self.signo) };
        }
    }
}
