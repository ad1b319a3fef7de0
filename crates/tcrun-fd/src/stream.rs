use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;

use crate::FileHandle;

pub const DEFAULT_BUF_SIZE: usize = 8192;

/// Buffered byte stream over an owned descriptor.
///
/// Reads refill an internal buffer one `read(2)` at a time; writes collect
/// into an internal buffer that is pushed out with a single `write(2)` when
/// full or on `flush`. Buffered-but-unflushed bytes are lost if the stream is
/// dropped without a flush; callers that need durability must flush
/// explicitly.
#[derive(Debug)]
pub struct FdStream {
    handle: FileHandle,
    rbuf: Vec<u8>,
    rpos: usize,
    rend: usize,
    wbuf: Vec<u8>,
}

impl FdStream {
    pub fn new(handle: FileHandle) -> Self {
        Self::with_capacity(handle, DEFAULT_BUF_SIZE)
    }

    pub fn with_capacity(handle: FileHandle, buf_size: usize) -> Self {
        assert!(buf_size > 0, "FdStream buffer size must be non-zero");
        FdStream {
            handle,
            rbuf: vec![0; buf_size],
            rpos: 0,
            rend: 0,
            wbuf: Vec::with_capacity(buf_size),
        }
    }

    pub fn fd(&self) -> RawFd {
        self.handle.get()
    }

    /// Gives the descriptor back, dropping any unflushed buffered bytes.
    pub fn into_handle(self) -> FileHandle {
        self.handle
    }

    /// Issues one `read(2)` into the read buffer.
    ///
    /// Returns the number of bytes now available; 0 means end of stream.
    fn refill(&mut self) -> io::Result<usize> {
        let fd = self.handle.get();
        let n = unsafe { libc::read(fd, self.rbuf.as_mut_ptr().cast(), self.rbuf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        self.rpos = 0;
        self.rend = n as usize;
        Ok(self.rend)
    }

    /// Buffers one byte, flushing first if the write buffer is full.
    pub fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        if self.wbuf.len() == self.wbuf.capacity() {
            self.flush_buffered()?;
        }
        self.wbuf.push(byte);
        Ok(())
    }

    /// Pushes pending buffered bytes out with a single `write(2)`.
    ///
    /// A short write with no OS error is surfaced as an "incomplete write"
    /// error rather than retried; the caller decides whether to retry at a
    /// higher level.
    fn flush_buffered(&mut self) -> io::Result<()> {
        if self.wbuf.is_empty() {
            return Ok(());
        }
        let fd = self.handle.get();
        let n = unsafe { libc::write(fd, self.wbuf.as_ptr().cast(), self.wbuf.len()) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if (n as usize) != self.wbuf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("incomplete write: {} of {} bytes", n, self.wbuf.len()),
            ));
        }
        self.wbuf.clear();
        Ok(())
    }
}

impl Read for FdStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.rpos == self.rend && self.refill()? == 0 {
            return Ok(0);
        }
        let avail = self.rend - self.rpos;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.rbuf[self.rpos..self.rpos + n]);
        self.rpos += n;
        Ok(n)
    }
}

impl Write for FdStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        for &b in data {
            self.write_byte(b)?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffered()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileHandle;
    use std::os::unix::io::IntoRawFd;

    fn pattern(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }

    fn roundtrip_over_pipe(n: usize, buf_size: usize) {
        let (rd, wr) = FileHandle::pipe().expect("pipe");
        let data = pattern(n);

        let mut out = FdStream::with_capacity(wr, buf_size);
        out.write_all(&data).expect("write");
        out.flush().expect("flush");
        drop(out); // close write end so the reader sees EOF

        let mut inp = FdStream::with_capacity(rd, buf_size);
        let mut back = Vec::new();
        inp.read_to_end(&mut back).expect("read");
        assert_eq!(back, data);
    }

    #[test]
    fn roundtrip_empty() {
        roundtrip_over_pipe(0, 64);
    }

    #[test]
    fn roundtrip_smaller_than_buffer() {
        roundtrip_over_pipe(10, 64);
    }

    #[test]
    fn roundtrip_exactly_buffer() {
        roundtrip_over_pipe(64, 64);
    }

    #[test]
    fn roundtrip_larger_than_buffer() {
        roundtrip_over_pipe(64 * 3 + 17, 64);
    }

    #[test]
    fn roundtrip_over_file() {
        let file = tempfile::tempfile().expect("tempfile");
        let raw = file.into_raw_fd();
        let data = pattern(1000);

        let wr = FileHandle::from_raw(raw).expect("wrap fd");
        let mut out = FdStream::with_capacity(wr, 128);
        out.write_all(&data).expect("write");
        out.flush().expect("flush");

        let handle = out.into_handle();
        let r = unsafe { libc::lseek(handle.get(), 0, libc::SEEK_SET) };
        assert_eq!(r, 0, "lseek: {}", std::io::Error::last_os_error());

        let mut inp = FdStream::with_capacity(handle, 128);
        let mut back = Vec::new();
        inp.read_to_end(&mut back).expect("read");
        assert_eq!(back, data);
    }

    #[test]
    fn formatted_write_lands_on_descriptor() {
        let (rd, wr) = FileHandle::pipe().expect("pipe");
        let mut out = FdStream::new(wr);
        write!(out, "value={} hex={:x}", 42, 255).expect("write!");
        out.flush().expect("flush");
        drop(out);

        let mut inp = FdStream::new(rd);
        let mut s = String::new();
        inp.read_to_string(&mut s).expect("read");
        assert_eq!(s, "value=42 hex=ff");
    }

    #[test]
    fn unflushed_bytes_are_dropped() {
        let (rd, wr) = FileHandle::pipe().expect("pipe");
        let mut out = FdStream::with_capacity(wr, 64);
        out.write_all(b"lost").expect("write");
        drop(out); // no flush

        let mut inp = FdStream::new(rd);
        let mut back = Vec::new();
        inp.read_to_end(&mut back).expect("read");
        assert!(back.is_empty());
    }
}
