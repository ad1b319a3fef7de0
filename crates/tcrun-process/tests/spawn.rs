use std::io::{Read, Seek, SeekFrom};
use std::os::unix::io::{AsRawFd, RawFd};

use tcrun_fd::LineReader;
use tcrun_process::{spawn, StreamPolicy, EXIT_SETUP_FAILED};

// Child bodies write with raw libc calls: no locks, no allocation after the
// fork.
fn write_fd(fd: RawFd, bytes: &[u8]) -> anyhow::Result<()> {
    let n = unsafe { libc::write(fd, bytes.as_ptr().cast(), bytes.len()) };
    if n != bytes.len() as isize {
        anyhow::bail!("short write to fd {fd}");
    }
    Ok(())
}

fn body_writes_both() -> anyhow::Result<()> {
    write_fd(libc::STDOUT_FILENO, b"stdout: msg\n")?;
    write_fd(libc::STDERR_FILENO, b"stderr: msg\n")?;
    Ok(())
}

#[test]
fn capture_keeps_streams_separate() {
    let mut child = spawn(body_writes_both, StreamPolicy::Capture, StreamPolicy::Capture)
        .expect("spawn");

    let mut out_lines = LineReader::new(child.stdout().expect("captured stdout"));
    let (line, eof) = out_lines.read_line().expect("read stdout line");
    assert_eq!(line, "stdout: msg");
    assert!(!eof);
    let (line, eof) = out_lines.read_line().expect("read stdout eof");
    assert_eq!(line, "");
    assert!(eof);

    let mut err_lines = LineReader::new(child.stderr().expect("captured stderr"));
    let (line, eof) = err_lines.read_line().expect("read stderr line");
    assert_eq!(line, "stderr: msg");
    assert!(!eof);
    let (line, eof) = err_lines.read_line().expect("read stderr eof");
    assert_eq!(line, "");
    assert!(eof);

    let status = child.wait().expect("wait");
    assert!(status.exited());
    assert_eq!(status.exit_code(), 0);
}

#[test]
fn redirect_fd_lands_in_caller_file() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    let raw = file.as_file().as_raw_fd();

    let child = spawn(
        || write_fd(libc::STDOUT_FILENO, b"redirected payload\n"),
        StreamPolicy::RedirectFd(raw),
        StreamPolicy::Inherit,
    )
    .expect("spawn");

    let status = child.wait().expect("wait");
    assert!(status.exited());
    assert_eq!(status.exit_code(), 0);

    // dup'd descriptors share a file offset; rewind before reading back.
    file.as_file_mut()
        .seek(SeekFrom::Start(0))
        .expect("rewind");
    let mut contents = String::new();
    file.read_to_string(&mut contents).expect("read back");
    assert_eq!(contents, "redirected payload\n");
}

#[test]
fn redirect_path_creates_and_fills_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stdout.log");

    let child = spawn(
        || write_fd(libc::STDOUT_FILENO, b"to file\n"),
        StreamPolicy::redirect_path(&path),
        StreamPolicy::Inherit,
    )
    .expect("spawn");

    let status = child.wait().expect("wait");
    assert!(status.exited());
    assert_eq!(status.exit_code(), 0);

    let contents = std::fs::read_to_string(&path).expect("read log");
    assert_eq!(contents, "to file\n");
}

#[test]
fn redirect_path_truncates_existing_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("stdout.log");
    std::fs::write(&path, "previous contents that are much longer").expect("seed file");

    let child = spawn(
        || write_fd(libc::STDOUT_FILENO, b"short\n"),
        StreamPolicy::redirect_path(&path),
        StreamPolicy::Inherit,
    )
    .expect("spawn");

    let status = child.wait().expect("wait");
    assert_eq!(status.exit_code(), 0);
    assert_eq!(std::fs::read_to_string(&path).expect("read log"), "short\n");
}

#[test]
fn unwritable_redirect_path_is_a_setup_failure() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("no-such-subdir").join("stdout.log");

    let mut child = spawn(
        || {
            // Must never run: stderr setup fails first.
            unsafe { libc::_exit(42) }
        },
        StreamPolicy::Capture,
        StreamPolicy::redirect_path(&path),
    )
    .expect("spawn");

    let mut captured = Vec::new();
    child
        .stdout()
        .expect("captured stdout")
        .read_to_end(&mut captured)
        .expect("drain stdout");
    assert!(captured.is_empty(), "body ran despite setup failure");

    let status = child.wait().expect("wait");
    assert!(status.exited());
    assert_eq!(status.exit_code(), EXIT_SETUP_FAILED);
}
