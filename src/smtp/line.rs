//! Line source over a byte stream

use std::io::{BufRead, Read};

use crate::smtp::error::SmtpError;

/// Longest accepted line in bytes, terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Pulls successive text lines from a buffered reader.
///
/// The line terminator (`\n` or `\r\n`) is stripped. Invalid UTF-8 is
/// replaced rather than rejected.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buffer: Vec<u8>,
    max_length: usize,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_length(inner, MAX_LINE_LENGTH)
    }

    pub fn with_max_length(inner: R, max_length: usize) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            max_length,
        }
    }

    /// Read the next line.
    ///
    /// Returns `Ok(None)` at end of stream. Read failures, including receive
    /// timeouts, surface as [`SmtpError::Io`]. A line that reaches the
    /// length limit without a terminator is [`SmtpError::LineTooLong`].
    pub fn next_line(&mut self) -> Result<Option<String>, SmtpError> {
        self.buffer.clear();
        let read = (&mut self.inner)
            .take(self.max_length as u64)
            .read_until(b'\n', &mut self.buffer)?;
        if read == 0 {
            return Ok(None);
        }
        if read == self.max_length && self.buffer.last() != Some(&b'\n') {
            return Err(SmtpError::LineTooLong {
                max: self.max_length,
            });
        }

        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }
}
