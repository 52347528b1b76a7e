//! SMTP capture implementation

pub mod commands;
pub mod config;
pub mod error;
pub mod headers;
pub mod line;
pub mod message;
pub mod quoted_printable;
pub mod response;
pub mod server;
pub mod session;
pub mod sink;
pub mod splitter;

pub use config::ServerConfig;
pub use error::SmtpError;
pub use headers::{HeaderField, HeaderTable};
pub use message::ParsedMessage;
pub use response::SmtpResponse;
pub use server::{SessionEnd, SessionHandle, SmtpServer, serve_session};
pub use session::{SmtpSession, SmtpState, Transition};
pub use sink::{ChannelSink, FileSink, MessageSink};
pub use splitter::HeaderBodySplitter;
