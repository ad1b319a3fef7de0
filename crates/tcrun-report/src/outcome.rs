use std::io::{self, Write};

use anyhow::Result;

/// Classification of one finished test case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Skipped(String),
    Failed(String),
}

impl TestOutcome {
    pub fn render(&self) -> String {
        match self {
            TestOutcome::Passed => "passed".to_string(),
            TestOutcome::Skipped(reason) => format!("skipped, {reason}"),
            TestOutcome::Failed(reason) => format!("failed, {reason}"),
        }
    }

    /// Inverse of `render`. Splits on the first `", "`, so reasons may
    /// themselves contain commas. Anything else is a format error, never a
    /// default.
    pub fn parse(text: &str) -> Result<Self> {
        if text == "passed" {
            return Ok(TestOutcome::Passed);
        }
        if let Some(reason) = text.strip_prefix("skipped, ") {
            return Ok(TestOutcome::Skipped(reason.to_string()));
        }
        if let Some(reason) = text.strip_prefix("failed, ") {
            return Ok(TestOutcome::Failed(reason.to_string()));
        }
        anyhow::bail!("malformed test outcome {text:?}");
    }

    pub fn passed(&self) -> bool {
        matches!(self, TestOutcome::Passed)
    }
}

/// Sink for finished-test lines.
#[derive(Debug)]
pub struct Reporter<W> {
    out: W,
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Reporter { out }
    }

    /// Writes the single protocol line for `ident`'s outcome.
    pub fn report(&mut self, ident: &str, outcome: &TestOutcome) -> io::Result<()> {
        writeln!(self.out, "{ident}, {}", outcome.render())?;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
