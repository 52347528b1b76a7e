//! Header/body classification for the DATA phase

use chrono::Utc;

use crate::smtp::headers::HeaderTable;
use crate::smtp::message::ParsedMessage;

/// Accumulates DATA lines into a [`ParsedMessage`].
///
/// The terminating `.` line is consumed by the dispatcher and must not be
/// fed here.
#[derive(Debug)]
pub struct HeaderBodySplitter {
    table: HeaderTable,
    message: ParsedMessage,
}

impl HeaderBodySplitter {
    pub fn new(table: HeaderTable) -> Self {
        Self {
            table,
            message: ParsedMessage::new(),
        }
    }

    /// Classify one line as a recognized header or body content
    pub fn push_line(&mut self, line: &str) {
        match self.table.classify(line) {
            Some((field, value)) => self.message.set_header(field, value),
            None => self.message.push_body_line(line),
        }
    }

    /// Message accumulated so far
    pub fn message(&self) -> &ParsedMessage {
        &self.message
    }

    /// Take the message, stamped with the time it was completed
    pub fn finish(mut self) -> ParsedMessage {
        self.message.received_at = Utc::now();
        self.message
    }
}
