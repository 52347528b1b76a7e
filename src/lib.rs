//! # smtpsink
//!
//! smtpsink is a fake SMTP endpoint for testing.
//!
//! Point the application under test at it instead of a real relay. Every
//! message it sends is acknowledged, parsed just enough to pull out a few
//! headers and the body, and written to a local HTML file instead of being
//! delivered.
//!
//! ## Quick Start
//!
//! ```rust
//! use smtpsink::{ChannelSink, ServerConfig, SmtpServer};
//! use std::net::TcpListener;
//! use std::sync::mpsc;
//! use std::thread;
//! use std::time::Duration;
//!
//! let listener = TcpListener::bind("127.0.0.1:0").unwrap();
//! let (tx, rx) = mpsc::channel();
//! let server = SmtpServer::new(ServerConfig::default(), ChannelSink::new(tx));
//!
//! thread::spawn(move || {
//!     server.start_with_listener(listener).unwrap();
//! });
//!
//! // Application sends email to the listener's address
//! // ...
//!
//! if let Ok(message) = rx.recv_timeout(Duration::from_millis(100)) {
//!     println!("Received message from: {}", message.from);
//! }
//! ```
//!
//! ## Protocol
//!
//! | Client sends | Server replies |
//! |---|---|
//! | (connect) | `220 <hostname> -- Fake proxy server` |
//! | `DATA` | `354 Start input, end data with <CRLF>.<CRLF>` |
//! | data lines, then `.` | `250 OK` |
//! | `QUIT` | `250 OK`, then the connection is closed |
//! | anything else | `250 OK` |
//!
//! Command order is not checked. `DATA` and `QUIT` must match exactly.
//!
//! ## Captured fields
//!
//! Lines starting with `Subject: `, `From: `, `To: `, `MIME-Version: `,
//! `Date: `, `Content-Type: ` or `Content-Transfer-Encoding: ` fill the
//! matching field of [`ParsedMessage`]; a repeated header overwrites the
//! earlier value. All other lines form the body. A body sent with
//! `Content-Transfer-Encoding: quoted-printable` is decoded before it reaches
//! the sink.
//!
//! ## Notes
//!
//! - Authentication, TLS and MIME multipart parsing are not supported.
//! - Each read and write is bounded by the configured receive timeout.

mod smtp;

pub use smtp::quoted_printable;
pub use smtp::{
    ChannelSink, FileSink, HeaderBodySplitter, HeaderField, HeaderTable, MessageSink,
    ParsedMessage, ServerConfig, SessionEnd, SessionHandle, SmtpError, SmtpResponse, SmtpServer,
    SmtpSession, SmtpState, Transition, serve_session,
};
