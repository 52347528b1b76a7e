//! Parsed message data structures

use chrono::{DateTime, Utc};

use crate::smtp::headers::HeaderField;
use crate::smtp::quoted_printable;

/// Transfer encoding value that triggers body decoding
pub const QUOTED_PRINTABLE: &str = "quoted-printable";

/// A message captured during one DATA phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub mime_version: String,
    pub date: String,
    pub content_type: String,
    pub content_transfer_encoding: String,

    /// Every non-header line in arrival order, each followed by CRLF
    pub body: String,

    /// When the DATA phase ended, by terminator or by end of input
    pub received_at: DateTime<Utc>,
}

impl ParsedMessage {
    /// Create an empty message stamped with the current time
    pub fn new() -> Self {
        Self {
            from: String::new(),
            to: String::new(),
            subject: String::new(),
            mime_version: String::new(),
            date: String::new(),
            content_type: String::new(),
            content_transfer_encoding: String::new(),
            body: String::new(),
            received_at: Utc::now(),
        }
    }

    /// Overwrite a header field
    pub fn set_header(&mut self, field: HeaderField, value: &str) {
        let slot = match field {
            HeaderField::Subject => &mut self.subject,
            HeaderField::From => &mut self.from,
            HeaderField::To => &mut self.to,
            HeaderField::MimeVersion => &mut self.mime_version,
            HeaderField::Date => &mut self.date,
            HeaderField::ContentType => &mut self.content_type,
            HeaderField::ContentTransferEncoding => &mut self.content_transfer_encoding,
        };
        slot.clear();
        slot.push_str(value);
    }

    /// Read a header field, empty if it never appeared
    pub fn header(&self, field: HeaderField) -> &str {
        match field {
            HeaderField::Subject => &self.subject,
            HeaderField::From => &self.from,
            HeaderField::To => &self.to,
            HeaderField::MimeVersion => &self.mime_version,
            HeaderField::Date => &self.date,
            HeaderField::ContentType => &self.content_type,
            HeaderField::ContentTransferEncoding => &self.content_transfer_encoding,
        }
    }

    /// Append one body line followed by CRLF
    pub fn push_body_line(&mut self, line: &str) {
        self.body.push_str(line);
        self.body.push_str("\r\n");
    }

    /// Whether the transfer encoding is exactly `quoted-printable`
    pub fn is_quoted_printable(&self) -> bool {
        self.content_transfer_encoding == QUOTED_PRINTABLE
    }

    /// Return the message with its body decoded when it is quoted-printable
    pub fn decoded(mut self) -> Self {
        if self.is_quoted_printable() {
            self.body = quoted_printable::decode(&self.body);
        }
        self
    }

    /// Render the minimal HTML document written to disk.
    ///
    /// Field values and body are inserted verbatim.
    pub fn render_html(&self) -> String {
        format!(
            "<html><body>\
             <strong>FROM: </strong>{}<br/>\
             <strong>TO: </strong>{}<br/>\
             <strong>SUBJECT: </strong>{}<br/>\
             <strong>TYPE: </strong>{}<br/>\
             <strong>ENCODING: </strong>{}<br/><br/>\
             {}</body></html>",
            self.from,
            self.to,
            self.subject,
            self.content_type,
            self.content_transfer_encoding,
            self.body
        )
    }
}

impl Default for ParsedMessage {
    fn default() -> Self {
        Self::new()
    }
}
