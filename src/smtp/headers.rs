//! Recognized header prefixes

/// A header field captured from the DATA phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderField {
    Subject,
    From,
    To,
    MimeVersion,
    Date,
    ContentType,
    ContentTransferEncoding,
}

/// Ordered, immutable mapping from line prefix to header field.
///
/// Prefixes are tried in table order and matched case-sensitively, including
/// the trailing space after the colon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderTable {
    entries: &'static [(&'static str, HeaderField)],
}

const STANDARD_ENTRIES: &[(&str, HeaderField)] = &[
    ("Subject: ", HeaderField::Subject),
    ("From: ", HeaderField::From),
    ("To: ", HeaderField::To),
    ("MIME-Version: ", HeaderField::MimeVersion),
    ("Date: ", HeaderField::Date),
    ("Content-Type: ", HeaderField::ContentType),
    ("Content-Transfer-Encoding: ", HeaderField::ContentTransferEncoding),
];

impl HeaderTable {
    /// Build a table from a custom ordered list of prefixes
    pub const fn new(entries: &'static [(&'static str, HeaderField)]) -> Self {
        Self { entries }
    }

    /// The seven headers the sink records
    pub const fn standard() -> Self {
        Self::new(STANDARD_ENTRIES)
    }

    /// Find the first entry whose prefix starts `line` and return its field
    /// together with the remainder of the line.
    pub fn classify<'l>(&self, line: &'l str) -> Option<(HeaderField, &'l str)> {
        self.entries.iter().find_map(|(prefix, field)| {
            line.strip_prefix(prefix).map(|value| (*field, value))
        })
    }

    /// Entries in priority order
    pub fn entries(&self) -> &'static [(&'static str, HeaderField)] {
        self.entries
    }
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::standard()
    }
}
