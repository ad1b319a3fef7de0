//! Child-process launching for test bodies.
//!
//! `spawn` forks the calling process, rewires the child's stdout/stderr
//! according to two independent `StreamPolicy` values, and runs a caller
//! supplied body in the child. The parent gets a `Child` handle holding any
//! captured stream adapters and a one-shot `wait`.
//!
//! Everything here is synchronous and single-threaded; concurrency comes only
//! from the OS-level parent/child pair.

mod policy;
mod signals;
mod spawn;
mod status;

pub use policy::{StreamPolicy, DEFAULT_REDIRECT_MODE};
pub use signals::{SignalHolder, SignalProgrammer, LAST_SIGNO};
pub use spawn::{spawn, Child, EXIT_BODY_FAILED, EXIT_SETUP_FAILED};
pub use status::ProcessStatus;
