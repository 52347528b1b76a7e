//! Command recognition
//!
//! Only `DATA` and `QUIT` change what the session does. Every other line,
//! including `HELO`, `MAIL FROM`, `RCPT TO` and blank lines, is acknowledged
//! without being inspected.

/// A command line as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpCommand {
    /// Begin the DATA phase
    Data,
    /// Close the session
    Quit,
    /// Anything else, acknowledged as a no-op
    Other,
}

impl SmtpCommand {
    /// Classify a command line. Matching is exact and case-sensitive.
    pub fn parse(line: &str) -> Self {
        match line {
            "DATA" => SmtpCommand::Data,
            "QUIT" => SmtpCommand::Quit,
            _ => SmtpCommand::Other,
        }
    }
}
