//! SMTP session state machine
//!
//! The session never touches a socket. The dispatcher feeds it lines and
//! acts on the returned [`Transition`]: deliver the completed message (if
//! any) first, then write the reply (if any).

use crate::smtp::commands::SmtpCommand;
use crate::smtp::headers::HeaderTable;
use crate::smtp::message::ParsedMessage;
use crate::smtp::response::SmtpResponse;
use crate::smtp::splitter::HeaderBodySplitter;

/// Line that ends the DATA phase
pub const DATA_TERMINATOR: &str = ".";

/// Represents the current state of an SMTP session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpState {
    /// Connected, greeting not yet sent
    Greeting,
    /// Waiting for the next command line
    AwaitCommand,
    /// Between `DATA` and the lone-dot terminator
    DataCapture,
    /// No further lines are processed
    Terminated,
}

/// Result of feeding one line to the session
#[derive(Debug, Default, PartialEq)]
pub struct Transition {
    /// Reply to write back to the client
    pub reply: Option<SmtpResponse>,
    /// Message completed by this line, to be handed to the sink before the reply
    pub message: Option<ParsedMessage>,
}

impl Transition {
    fn reply(reply: SmtpResponse) -> Self {
        Self {
            reply: Some(reply),
            message: None,
        }
    }

    fn silent() -> Self {
        Self::default()
    }
}

/// Manages the state of a single connection
#[derive(Debug)]
pub struct SmtpSession {
    state: SmtpState,
    hostname: String,
    table: HeaderTable,
    splitter: Option<HeaderBodySplitter>,
}

impl SmtpSession {
    /// Create a new session in the [`SmtpState::Greeting`] state
    pub fn new(hostname: &str, table: HeaderTable) -> Self {
        Self {
            state: SmtpState::Greeting,
            hostname: hostname.to_owned(),
            table,
            splitter: None,
        }
    }

    pub fn state(&self) -> SmtpState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SmtpState::Terminated
    }

    /// Produce the greeting and start accepting commands
    pub fn start(&mut self) -> SmtpResponse {
        self.state = SmtpState::AwaitCommand;
        SmtpResponse::greeting(&self.hostname)
    }

    /// Feed one line read from the client
    pub fn feed(&mut self, line: &str) -> Transition {
        match self.state {
            SmtpState::AwaitCommand => self.handle_command(line),
            SmtpState::DataCapture => self.handle_data_line(line),
            SmtpState::Greeting | SmtpState::Terminated => Transition::silent(),
        }
    }

    /// The input ended or the connection was lost.
    ///
    /// Returns the partially captured message when the DATA phase was
    /// interrupted.
    pub fn end_of_input(&mut self) -> Option<ParsedMessage> {
        self.state = SmtpState::Terminated;
        self.splitter.take().map(HeaderBodySplitter::finish)
    }

    fn handle_command(&mut self, line: &str) -> Transition {
        match SmtpCommand::parse(line) {
            SmtpCommand::Quit => {
                self.state = SmtpState::Terminated;
                Transition::reply(SmtpResponse::ok())
            }
            SmtpCommand::Data => {
                self.splitter = Some(HeaderBodySplitter::new(self.table));
                self.state = SmtpState::DataCapture;
                Transition::reply(SmtpResponse::data_start())
            }
            SmtpCommand::Other => Transition::reply(SmtpResponse::ok()),
        }
    }

    fn handle_data_line(&mut self, line: &str) -> Transition {
        if line == DATA_TERMINATOR {
            self.state = SmtpState::AwaitCommand;
            return Transition {
                reply: Some(SmtpResponse::ok()),
                message: self.splitter.take().map(HeaderBodySplitter::finish),
            };
        }

        if let Some(splitter) = self.splitter.as_mut() {
            splitter.push_line(line);
        }
        Transition::silent()
    }
}
