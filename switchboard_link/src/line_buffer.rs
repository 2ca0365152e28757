use bytes::{Buf, BytesMut};

use crate::error::LineError;

/// Accumulates socket reads and yields complete `\n`-terminated lines.
///
/// Bytes after the last delimiter are kept as the prefix of the next line.
/// An unterminated prefix longer than `max_line` fails with
/// [`LineError::Overflow`], which bounds what a malfunctioning or hostile
/// peer can make us buffer. A trailing `\r` before the delimiter is
/// stripped, so both `\r\n` and bare `\n` framing work.
pub struct LineBuffer {
    buf: BytesMut,
    max_line: usize,
}

impl LineBuffer {
    pub fn new(max_line: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            max_line,
        }
    }

    /// Append newly read bytes to the buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete line, without its delimiter.
    ///
    /// Returns `Ok(None)` when no full line is buffered yet.
    pub fn next_line(&mut self) -> Result<Option<String>, LineError> {
        let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > self.max_line {
                return Err(LineError::Overflow);
            }
            return Ok(None);
        };

        let mut line = self.buf.split_to(pos);
        self.buf.advance(1);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }

        match std::str::from_utf8(&line) {
            Ok(s) => Ok(Some(s.to_string())),
            Err(_) => Err(LineError::InvalidUtf8),
        }
    }

    /// Number of buffered bytes not yet yielded as a line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_line() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"NICK wings\r\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), "NICK wings");
        assert_eq!(buf.next_line().unwrap(), None);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn partial_then_complete() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"PRIV");
        assert_eq!(buf.next_line().unwrap(), None);
        buf.feed(b"MSG #c hi\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), "PRIVMSG #c hi");
        assert_eq!(buf.next_line().unwrap(), None);
    }

    #[test]
    fn several_lines_in_one_feed() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"one\r\ntwo\nthree\r\npartial");
        assert_eq!(buf.next_line().unwrap().unwrap(), "one");
        assert_eq!(buf.next_line().unwrap().unwrap(), "two");
        assert_eq!(buf.next_line().unwrap().unwrap(), "three");
        assert_eq!(buf.next_line().unwrap(), None);
        assert_eq!(buf.pending(), 7);
    }

    #[test]
    fn reassembly_is_chunking_independent() {
        let input = b"PING :irc.example.org\r\nPRIVMSG #chan :hello world\r\n";
        for chunk_size in 1..input.len() {
            let mut buf = LineBuffer::new(1024);
            let mut lines = Vec::new();
            for chunk in input.chunks(chunk_size) {
                buf.feed(chunk);
                while let Some(line) = buf.next_line().unwrap() {
                    lines.push(line);
                }
            }
            assert_eq!(
                lines,
                &["PING :irc.example.org", "PRIVMSG #chan :hello world"],
                "chunk size {}",
                chunk_size
            );
        }
    }

    #[test]
    fn empty_line() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"\r\n\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), "");
        assert_eq!(buf.next_line().unwrap().unwrap(), "");
    }

    #[test]
    fn overflow_on_unterminated_line() {
        let mut buf = LineBuffer::new(16);
        buf.feed(b"aaaaaaaaaaaa");
        assert_eq!(buf.next_line().unwrap(), None);
        buf.feed(b"bbbbbbbbbbbb");
        assert_eq!(buf.next_line().unwrap_err(), LineError::Overflow);
    }

    #[test]
    fn terminated_line_is_not_bounded() {
        // The cap exists to stop unbounded buffering of a line that never
        // ends; a complete line that arrived all at once still parses.
        let mut buf = LineBuffer::new(8);
        buf.feed(b"0123456789ab\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), "0123456789ab");
    }

    #[test]
    fn invalid_utf8() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"abc\xff\xfe\n");
        assert_eq!(buf.next_line().unwrap_err(), LineError::InvalidUtf8);
    }

    #[test]
    fn carriage_return_only_stripped_at_end() {
        let mut buf = LineBuffer::new(1024);
        buf.feed(b"a\rb\r\n");
        assert_eq!(buf.next_line().unwrap().unwrap(), "a\rb");
    }
}
