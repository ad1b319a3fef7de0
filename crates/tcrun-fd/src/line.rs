use std::io::{self, Read};

/// Lazy, forward-only line reader over any byte stream.
///
/// Each call to `read_line` advances the stream; there is no unread.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        LineReader { inner }
    }

    /// Reads up to the next newline or end of stream.
    ///
    /// Returns the line without its trailing newline, plus an EOF flag. The
    /// flag is `true` when the stream ended before a newline was seen; the
    /// text may still be a non-empty final partial line in that case.
    pub fn read_line(&mut self) -> io::Result<(String, bool)> {
        let mut bytes = Vec::new();
        let mut one = [0u8; 1];
        loop {
            let n = self.inner.read(&mut one)?;
            if n == 0 {
                return Ok((String::from_utf8_lossy(&bytes).into_owned(), true));
            }
            if one[0] == b'\n' {
                return Ok((String::from_utf8_lossy(&bytes).into_owned(), false));
            }
            bytes.push(one[0]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_newlines() {
        let mut lr = LineReader::new(&b"one\ntwo\nthree\n"[..]);
        assert_eq!(lr.read_line().unwrap(), ("one".to_string(), false));
        assert_eq!(lr.read_line().unwrap(), ("two".to_string(), false));
        assert_eq!(lr.read_line().unwrap(), ("three".to_string(), false));
        assert_eq!(lr.read_line().unwrap(), (String::new(), true));
    }

    #[test]
    fn final_partial_line_reports_eof() {
        let mut lr = LineReader::new(&b"full\npartial"[..]);
        assert_eq!(lr.read_line().unwrap(), ("full".to_string(), false));
        assert_eq!(lr.read_line().unwrap(), ("partial".to_string(), true));
    }

    #[test]
    fn empty_stream_is_immediate_eof() {
        let mut lr = LineReader::new(&b""[..]);
        assert_eq!(lr.read_line().unwrap(), (String::new(), true));
    }

    #[test]
    fn empty_lines_are_distinct_from_eof() {
        let mut lr = LineReader::new(&b"\n\n"[..]);
        assert_eq!(lr.read_line().unwrap(), (String::new(), false));
        assert_eq!(lr.read_line().unwrap(), (String::new(), false));
        assert_eq!(lr.read_line().unwrap(), (String::new(), true));
    }
}
