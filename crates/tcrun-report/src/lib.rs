//! Test outcome protocol and supporting metadata.
//!
//! The wire format is one line per test: `ident, passed`,
//! `ident, skipped, <reason>`, or `ident, failed, <reason>`. Rendering and
//! parsing round-trip, including reasons that contain commas.

mod outcome;
mod vars;

pub use outcome::{Reporter, TestOutcome};
pub use vars::VarMap;
