use std::ffi::CString;
use std::io::{self, Read};
use std::os::unix::io::RawFd;
use std::process::ExitCode;

use anyhow::{Context, Result};
use base64::Engine;
use clap::Parser;
use serde::Serialize;

use tcrun_process::{spawn, ProcessStatus, StreamPolicy, EXIT_SETUP_FAILED};
use tcrun_report::{Reporter, TestOutcome};

pub const TCRUN_REPORT_SCHEMA_VERSION: &str = "tcrun-report/1";

#[derive(Parser)]
#[command(name = "tcrun")]
#[command(about = "Run one command as an isolated test case.", long_about = None)]
struct Cli {
    /// Test identifier used in the outcome line.
    #[arg(long)]
    ident: String,

    /// Child stdout policy: capture, inherit, fd:<n>, or file:<path>.
    #[arg(long, default_value = "capture")]
    stdout: String,

    /// Child stderr policy: capture, inherit, fd:<n>, or file:<path>.
    #[arg(long, default_value = "capture")]
    stderr: String,

    /// Emit a JSON report instead of the one-line protocol.
    #[arg(long)]
    json: bool,

    /// Command to run as the test body.
    #[arg(trailing_var_arg = true, required = true)]
    command: Vec<String>,
}

#[derive(Serialize)]
struct RunReport {
    schema_version: String,
    ident: String,
    outcome: String,
    raw_status: i32,
    exited: bool,
    exit_code: Option<i32>,
    termsig: Option<i32>,
    coredump: Option<bool>,
    stdout_b64: Option<String>,
    stderr_b64: Option<String>,
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::from(2)
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let out_policy = parse_policy(&cli.stdout)
        .with_context(|| format!("invalid --stdout {:?}", cli.stdout))?;
    let err_policy = parse_policy(&cli.stderr)
        .with_context(|| format!("invalid --stderr {:?}", cli.stderr))?;

    // argv is converted ahead of the fork so the child only execs.
    let argv: Vec<CString> = cli
        .command
        .iter()
        .map(|arg| {
            CString::new(arg.as_bytes()).with_context(|| format!("argument {arg:?} contains NUL"))
        })
        .collect::<Result<_>>()?;
    let mut argv_ptrs: Vec<*const libc::c_char> = argv.iter().map(|a| a.as_ptr()).collect();
    argv_ptrs.push(std::ptr::null());

    let mut child = spawn(
        move || {
            unsafe { libc::execvp(argv_ptrs[0], argv_ptrs.as_ptr()) };
            Err(std::io::Error::last_os_error()).context("execvp")
        },
        out_policy,
        err_policy,
    )?;

    // Drain both captures together before waiting: reading one stream to EOF
    // first deadlocks against a child that fills the other pipe.
    let (out_stream, err_stream) = child.streams();
    let (captured_stdout, captured_stderr) = drain_captured(out_stream, err_stream)?;
    let status = child.wait()?;

    let outcome = classify(status);

    if cli.json {
        let b64 = base64::engine::general_purpose::STANDARD;
        let report = RunReport {
            schema_version: TCRUN_REPORT_SCHEMA_VERSION.to_string(),
            ident: cli.ident.clone(),
            outcome: outcome.render(),
            raw_status: status.raw(),
            exited: status.exited(),
            exit_code: status.exited().then(|| status.exit_code()),
            termsig: status.signaled().then(|| status.termsig()),
            coredump: status.signaled().then(|| status.coredumped()),
            stdout_b64: captured_stdout.map(|b| b64.encode(b)),
            stderr_b64: captured_stderr.map(|b| b64.encode(b)),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        let mut reporter = Reporter::new(std::io::stdout());
        reporter
            .report(&cli.ident, &outcome)
            .context("write outcome line")?;
    }

    Ok(if outcome.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

struct Drain<'a> {
    stream: &'a mut tcrun_fd::FdStream,
    bytes: Vec<u8>,
    eof: bool,
}

impl Drain<'_> {
    fn pump(&mut self) -> Result<()> {
        // Chunk size matches the adapter's buffer, so one pump empties
        // whatever a single refill brought in.
        let mut chunk = [0u8; tcrun_fd::DEFAULT_BUF_SIZE];
        let n = self
            .stream
            .read(&mut chunk)
            .context("read captured stream")?;
        if n == 0 {
            self.eof = true;
        } else {
            self.bytes.extend_from_slice(&chunk[..n]);
        }
        Ok(())
    }
}

/// Collects both captured streams to EOF, interleaved through one poll loop
/// so a child filling either pipe never blocks against the parent.
fn drain_captured(
    stdout: Option<&mut tcrun_fd::FdStream>,
    stderr: Option<&mut tcrun_fd::FdStream>,
) -> Result<(Option<Vec<u8>>, Option<Vec<u8>>)> {
    let mut slots: Vec<Drain> = Vec::with_capacity(2);
    let out_idx = stdout.map(|stream| {
        slots.push(Drain {
            stream,
            bytes: Vec::new(),
            eof: false,
        });
        slots.len() - 1
    });
    let err_idx = stderr.map(|stream| {
        slots.push(Drain {
            stream,
            bytes: Vec::new(),
            eof: false,
        });
        slots.len() - 1
    });

    while slots.iter().any(|slot| !slot.eof) {
        let mut pfds: Vec<libc::pollfd> = Vec::with_capacity(slots.len());
        let mut who: Vec<usize> = Vec::with_capacity(slots.len());
        for (idx, slot) in slots.iter().enumerate() {
            if !slot.eof {
                pfds.push(libc::pollfd {
                    fd: slot.stream.fd(),
                    events: libc::POLLIN,
                    revents: 0,
                });
                who.push(idx);
            }
        }

        let r = unsafe { libc::poll(pfds.as_mut_ptr(), pfds.len() as libc::nfds_t, -1) };
        if r == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::EINTR) {
                continue;
            }
            return Err(err).context("poll captured streams");
        }

        // POLLHUP/POLLERR also mean "read now": the read returns the last
        // buffered bytes or EOF without blocking.
        for (pfd, &idx) in pfds.iter().zip(&who) {
            if pfd.revents != 0 {
                slots[idx].pump()?;
            }
        }
    }

    let mut take = |idx: Option<usize>| idx.map(|i| std::mem::take(&mut slots[i].bytes));
    Ok((take(out_idx), take(err_idx)))
}

fn classify(status: ProcessStatus) -> TestOutcome {
    if status.exited() {
        match status.exit_code() {
            0 => TestOutcome::Passed,
            EXIT_SETUP_FAILED => TestOutcome::Failed("stream setup failed".to_string()),
            code => TestOutcome::Failed(format!("exited with code {code}")),
        }
    } else {
        TestOutcome::Failed(format!("terminated by signal {}", status.termsig()))
    }
}

fn parse_policy(text: &str) -> Result<StreamPolicy> {
    match text {
        "capture" => return Ok(StreamPolicy::Capture),
        "inherit" => return Ok(StreamPolicy::Inherit),
        _ => {}
    }
    if let Some(raw) = text.strip_prefix("fd:") {
        let fd: RawFd = raw
            .parse()
            .with_context(|| format!("descriptor number {raw:?}"))?;
        if fd < 0 {
            anyhow::bail!("descriptor number must be non-negative (got {fd})");
        }
        return Ok(StreamPolicy::RedirectFd(fd));
    }
    if let Some(path) = text.strip_prefix("file:") {
        if path.is_empty() {
            anyhow::bail!("file policy needs a path");
        }
        return Ok(StreamPolicy::redirect_path(path));
    }
    anyhow::bail!("expected capture, inherit, fd:<n>, or file:<path>");
}
