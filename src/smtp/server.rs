//! Listener and per-connection dispatcher

use crate::smtp::config::ServerConfig;
use crate::smtp::error::SmtpError;
use crate::smtp::headers::HeaderTable;
use crate::smtp::line::LineReader;
use crate::smtp::message::ParsedMessage;
use crate::smtp::response::SmtpResponse;
use crate::smtp::session::SmtpSession;
use crate::smtp::sink::{FileSink, MessageSink};

use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

/// How a session came to an end
#[derive(Debug)]
pub enum SessionEnd {
    /// The client sent `QUIT`
    Quit,
    /// The client closed its side of the connection
    EndOfInput,
    /// A read or write failed or timed out, or a line exceeded the length limit
    ConnectionLost(SmtpError),
}

/// Fake SMTP server that hands every captured message to a sink
#[derive(Clone)]
pub struct SmtpServer {
    config: ServerConfig,
    table: HeaderTable,
    sink: Arc<dyn MessageSink>,
    output_toggle: Option<Arc<AtomicBool>>,
}

impl SmtpServer {
    /// Create a server delivering to `sink`
    pub fn new(config: ServerConfig, sink: impl MessageSink + 'static) -> Self {
        Self {
            config,
            table: HeaderTable::standard(),
            sink: Arc::new(sink),
            output_toggle: None,
        }
    }

    /// Create a server that writes messages into `config.output_dir`,
    /// enabled according to `config.output_to_file`
    pub fn from_config(config: ServerConfig) -> Self {
        let toggle = Arc::new(AtomicBool::new(config.output_to_file));
        let sink = FileSink::new(config.output_dir.clone(), Arc::clone(&toggle));
        let mut server = Self::new(config, sink);
        server.output_toggle = Some(toggle);
        server
    }

    /// Replace the recognized header table
    pub fn with_header_table(mut self, table: HeaderTable) -> Self {
        self.table = table;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Switch file output on or off for sessions that have not reached
    /// their next DATA terminator yet. No effect without a file sink.
    pub fn set_output_to_file(&self, enabled: bool) {
        if let Some(toggle) = &self.output_toggle {
            toggle.store(enabled, Ordering::Relaxed);
        }
    }

    pub fn output_to_file(&self) -> bool {
        self.output_toggle
            .as_ref()
            .is_some_and(|toggle| toggle.load(Ordering::Relaxed))
    }

    /// Start the server on the specified address (blocking)
    pub fn start(&self, addr: &str) -> Result<(), SmtpError> {
        let listener = TcpListener::bind(addr)?;
        self.start_with_listener(listener)
    }

    /// Accept connections forever, one handling thread per client (blocking)
    pub fn start_with_listener(&self, listener: TcpListener) -> Result<(), SmtpError> {
        info!("SMTP server listening on {}", listener.local_addr()?);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.spawn_session(stream) {
                        error!("Error starting session: {e}");
                    }
                }
                Err(e) => {
                    error!("Error accepting connection: {e}");
                }
            }
        }

        Ok(())
    }

    /// Accept exactly one client and handle it on a new thread
    pub fn serve_one(&self, listener: &TcpListener) -> Result<SessionHandle, SmtpError> {
        let (stream, _) = listener.accept()?;
        self.spawn_session(stream)
    }

    fn spawn_session(&self, stream: TcpStream) -> Result<SessionHandle, SmtpError> {
        let peer = stream.peer_addr()?;
        stream.set_read_timeout(self.config.socket_timeout())?;
        stream.set_write_timeout(self.config.socket_timeout())?;
        info!("Accepted connection from {peer}");

        let session = SmtpSession::new(&self.config.hostname, self.table);
        let sink = Arc::clone(&self.sink);
        let handle = thread::Builder::new()
            .name(format!("smtp-{peer}"))
            .spawn(move || handle_client(stream, peer, session, sink.as_ref()))?;

        Ok(SessionHandle { peer, handle })
    }
}

/// Handle to a connection's thread
#[derive(Debug)]
pub struct SessionHandle {
    peer: SocketAddr,
    handle: JoinHandle<SessionEnd>,
}

impl SessionHandle {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Whether the session is still running
    pub fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the session to end
    pub fn join(self) -> thread::Result<SessionEnd> {
        self.handle.join()
    }
}

/// Run one connection to completion and close it
fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    session: SmtpSession,
    sink: &dyn MessageSink,
) -> SessionEnd {
    let end = match stream.try_clone() {
        Ok(read_half) => {
            let mut writer = &stream;
            serve_session(BufReader::new(read_half), &mut writer, session, sink)
        }
        Err(e) => SessionEnd::ConnectionLost(e.into()),
    };

    match &end {
        SessionEnd::Quit => info!("Client {peer} quit"),
        SessionEnd::EndOfInput => info!("Client {peer} disconnected"),
        SessionEnd::ConnectionLost(e) => warn!("Connection lost with {peer}: {e}"),
    }

    if let Err(e) = stream.shutdown(Shutdown::Both) {
        debug!("Shutdown of {peer} failed: {e}");
    }
    end
}

/// Drive a session over any line-oriented stream.
///
/// Failures end the session and are returned as [`SessionEnd::ConnectionLost`];
/// a DATA phase cut short still reaches the sink.
pub fn serve_session<R, W>(
    reader: R,
    writer: &mut W,
    mut session: SmtpSession,
    sink: &dyn MessageSink,
) -> SessionEnd
where
    R: BufRead,
    W: Write,
{
    let mut lines = LineReader::new(reader);

    let greeting = session.start();
    if let Err(e) = send_response(writer, &greeting) {
        session.end_of_input();
        return SessionEnd::ConnectionLost(e);
    }

    loop {
        let line = match lines.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => {
                finish_partial(&mut session, sink);
                return SessionEnd::EndOfInput;
            }
            Err(e) => {
                finish_partial(&mut session, sink);
                return SessionEnd::ConnectionLost(e);
            }
        };
        debug!("Read line {line:?}");

        let transition = session.feed(&line);
        if let Some(message) = transition.message {
            deliver(sink, message);
        }
        if let Some(reply) = transition.reply {
            if let Err(e) = send_response(writer, &reply) {
                session.end_of_input();
                return SessionEnd::ConnectionLost(e);
            }
        }

        if session.is_terminated() {
            return SessionEnd::Quit;
        }
    }
}

fn finish_partial(session: &mut SmtpSession, sink: &dyn MessageSink) {
    if let Some(message) = session.end_of_input() {
        debug!("Input ended inside DATA, delivering partial message");
        deliver(sink, message);
    }
}

fn deliver(sink: &dyn MessageSink, message: ParsedMessage) {
    let message = message.decoded();
    if let Err(e) = sink.deliver(&message) {
        error!("Error delivering message: {e}");
    }
}

/// Send a response to the client
fn send_response<W: Write>(writer: &mut W, response: &SmtpResponse) -> Result<(), SmtpError> {
    writer.write_all(response.format().as_bytes())?;
    writer.flush()?;
    debug!("Sent {} {}", response.code, response.message);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smtp::line::MAX_LINE_LENGTH;
    use crate::smtp::sink::ChannelSink;
    use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
    use std::sync::mpsc;
    use std::time::Duration;

    fn run(input: &str) -> (String, SessionEnd, Vec<ParsedMessage>) {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        let session = SmtpSession::new("localhost", HeaderTable::standard());
        let mut output = Vec::new();

        let end = serve_session(Cursor::new(input), &mut output, session, &sink);
        drop(sink);

        (
            String::from_utf8(output).unwrap(),
            end,
            rx.iter().collect(),
        )
    }

    #[test]
    fn test_full_exchange() {
        let (output, end, messages) = run(
            "DATA\r\nFrom: a@x.com\r\nTo: b@y.com\r\nSubject: Hi\r\nHello\r\nWorld\r\n.\r\nQUIT\r\n",
        );

        assert_eq!(
            output,
            "220 localhost -- Fake proxy server\r\n\
             354 Start input, end data with <CRLF>.<CRLF>\r\n\
             250 OK\r\n\
             250 OK\r\n"
        );
        assert!(matches!(end, SessionEnd::Quit));

        assert_eq!(messages.len(), 1);
        let message = &messages[0];
        assert_eq!(message.from, "a@x.com");
        assert_eq!(message.to, "b@y.com");
        assert_eq!(message.subject, "Hi");
        assert_eq!(message.body, "Hello\r\nWorld\r\n");
    }

    #[test]
    fn test_each_other_line_gets_one_ok() {
        let (output, end, messages) = run("HELO x\r\nMAIL FROM:<a@x.com>\r\n\r\nRCPT TO:<b@y.com>\r\n");
        let replies: Vec<&str> = output.lines().collect();
        assert_eq!(replies.len(), 5);
        assert!(replies[1..].iter().all(|reply| *reply == "250 OK"));
        assert!(matches!(end, SessionEnd::EndOfInput));
        assert!(messages.is_empty());
    }

    #[test]
    fn test_nothing_after_quit() {
        let (output, end, _) = run("QUIT\r\nHELO x\r\nDATA\r\n");
        assert_eq!(output, "220 localhost -- Fake proxy server\r\n250 OK\r\n");
        assert!(matches!(end, SessionEnd::Quit));
    }

    #[test]
    fn test_partial_data_is_delivered() {
        let (output, end, messages) = run("DATA\r\nSubject: cut off\r\nsome body\r\n");
        assert_eq!(output.lines().count(), 2);
        assert!(matches!(end, SessionEnd::EndOfInput));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "cut off");
        assert_eq!(messages[0].body, "some body\r\n");
    }

    #[test]
    fn test_quoted_printable_body_is_decoded() {
        let (_, _, messages) = run(
            "DATA\r\nContent-Transfer-Encoding: quoted-printable\r\nCaf=E9 au=\r\n lait\r\n.\r\nQUIT\r\n",
        );
        assert_eq!(messages[0].body, "Café au lait\r\n");
    }

    #[test]
    fn test_other_encodings_are_not_decoded() {
        let (_, _, messages) =
            run("DATA\r\nContent-Transfer-Encoding: 7bit\r\nCaf=E9\r\n.\r\nQUIT\r\n");
        assert_eq!(messages[0].body, "Caf=E9\r\n");
    }

    struct FailingSink;

    impl MessageSink for FailingSink {
        fn deliver(&self, _message: &ParsedMessage) -> Result<(), SmtpError> {
            Err(SmtpError::Persistence {
                path: "mail.html".into(),
                source: io::Error::other("disk full"),
            })
        }
    }

    #[test]
    fn test_sink_failure_still_acknowledged() {
        let session = SmtpSession::new("localhost", HeaderTable::standard());
        let mut output = Vec::new();
        let end = serve_session(
            Cursor::new("DATA\r\nbody\r\n.\r\nQUIT\r\n"),
            &mut output,
            session,
            &FailingSink,
        );

        let output = String::from_utf8(output).unwrap();
        assert!(output.ends_with("250 OK\r\n250 OK\r\n"));
        assert!(matches!(end, SessionEnd::Quit));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_terminates() {
        let (tx, _rx) = mpsc::channel();
        let session = SmtpSession::new("localhost", HeaderTable::standard());
        let end = serve_session(
            Cursor::new("HELO x\r\n"),
            &mut BrokenWriter,
            session,
            &ChannelSink::new(tx),
        );
        assert!(matches!(end, SessionEnd::ConnectionLost(ref e) if e.is_connection_lost()));
    }

    /// Serves its bytes, then fails as if the peer reset the connection
    struct ResetAfter(Cursor<Vec<u8>>);

    impl Read for ResetAfter {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.read(buf)? {
                0 => Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn test_reset_mid_data_delivers_partial() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        let session = SmtpSession::new("localhost", HeaderTable::standard());
        let input = ResetAfter(Cursor::new(b"DATA\r\nSubject: x\r\nbody\r\n".to_vec()));
        let mut output = Vec::new();

        let end = serve_session(BufReader::new(input), &mut output, session, &sink);
        drop(sink);

        assert!(matches!(end, SessionEnd::ConnectionLost(ref e) if e.is_connection_lost()));
        let messages: Vec<ParsedMessage> = rx.iter().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "x");
        assert_eq!(messages[0].body, "body\r\n");
    }

    #[test]
    fn test_overlong_line_ends_session() {
        let (tx, rx) = mpsc::channel();
        let sink = ChannelSink::new(tx);
        let session = SmtpSession::new("localhost", HeaderTable::standard());
        let input = format!("DATA\r\nSubject: big\r\n{}\r\n.\r\n", "x".repeat(MAX_LINE_LENGTH));
        let mut output = Vec::new();

        let end = serve_session(Cursor::new(input), &mut output, session, &sink);
        drop(sink);

        assert!(matches!(end, SessionEnd::ConnectionLost(SmtpError::LineTooLong { .. })));
        // No reply to the terminator, the partial message is still captured
        assert_eq!(String::from_utf8(output).unwrap().lines().count(), 2);
        let messages: Vec<ParsedMessage> = rx.iter().collect();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].subject, "big");
    }

    fn start_test_server() -> (String, mpsc::Receiver<ParsedMessage>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (tx, rx) = mpsc::channel();
        let server = SmtpServer::new(ServerConfig::default(), ChannelSink::new(tx));

        thread::spawn(move || {
            if let Err(e) = server.start_with_listener(listener) {
                eprintln!("Error starting server: {e}");
            }
        });

        (addr, rx)
    }

    fn send_command(stream: &mut TcpStream, command: &str) -> Result<String, io::Error> {
        write!(stream, "{command}\r\n")?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response)?;
        Ok(response.trim().to_string())
    }

    #[test]
    fn test_server_from_config() {
        let config = ServerConfig {
            output_to_file: false,
            ..ServerConfig::default()
        };
        let server = SmtpServer::from_config(config);
        assert!(!server.output_to_file());
        server.set_output_to_file(true);
        assert!(server.output_to_file());
        assert_eq!(server.config().hostname, "localhost");
    }

    #[test]
    fn test_complete_smtp_session() {
        let (addr, rx) = start_test_server();

        let mut stream = TcpStream::connect(&addr).unwrap();

        // Read greeting
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(greeting.starts_with("220"));

        let response = send_command(&mut stream, "HELO client.local").unwrap();
        assert_eq!(response, "250 OK");

        let response = send_command(&mut stream, "DATA").unwrap();
        assert!(response.starts_with("354"));

        write!(stream, "Subject: Test Email\r\n\r\nThis is a test email.\r\n.\r\n").unwrap();
        stream.flush().unwrap();

        let mut final_response = String::new();
        reader.read_line(&mut final_response).unwrap();
        assert_eq!(final_response, "250 OK\r\n");

        let response = send_command(&mut stream, "QUIT").unwrap();
        assert_eq!(response, "250 OK");

        let message = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(message.subject, "Test Email");
        assert_eq!(message.body, "\r\nThis is a test email.\r\n");
    }

    #[test]
    fn test_serve_one_session_handle() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel();
        let server = SmtpServer::new(ServerConfig::default(), ChannelSink::new(tx));

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut greeting = String::new();
            reader.read_line(&mut greeting).unwrap();
            send_command(&mut stream, "QUIT").unwrap()
        });

        let handle = server.serve_one(&listener).unwrap();
        assert_eq!(handle.peer().ip(), addr.ip());
        assert_eq!(client.join().unwrap(), "250 OK");
        assert!(matches!(handle.join().unwrap(), SessionEnd::Quit));
    }

    #[test]
    fn test_read_timeout_ends_session() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel();
        let config = ServerConfig {
            receive_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let server = SmtpServer::new(config, ChannelSink::new(tx));

        let stream = TcpStream::connect(addr).unwrap();
        let handle = server.serve_one(&listener).unwrap();

        // Client stays silent after the greeting
        let end = handle.join().unwrap();
        assert!(matches!(end, SessionEnd::ConnectionLost(_)));
        drop(stream);
    }

    #[test]
    fn test_read_timeout_inside_data_delivers_partial() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let config = ServerConfig {
            receive_timeout: Duration::from_millis(50),
            ..ServerConfig::default()
        };
        let server = SmtpServer::new(config, ChannelSink::new(tx));

        let mut stream = TcpStream::connect(addr).unwrap();
        let handle = server.serve_one(&listener).unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(send_command(&mut stream, "DATA").unwrap().starts_with("354"));

        // Start the message, then stall without the terminator
        write!(stream, "Subject: stalled\r\nfirst line\r\n").unwrap();
        stream.flush().unwrap();

        let end = handle.join().unwrap();
        assert!(matches!(end, SessionEnd::ConnectionLost(ref e) if e.is_connection_lost()));

        let message = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(message.subject, "stalled");
        assert_eq!(message.body, "first line\r\n");
        drop(stream);
    }

    #[test]
    fn test_session_handle_liveness() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, _rx) = mpsc::channel();
        let server = SmtpServer::new(ServerConfig::default(), ChannelSink::new(tx));

        let mut stream = TcpStream::connect(addr).unwrap();
        let handle = server.serve_one(&listener).unwrap();

        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut greeting = String::new();
        reader.read_line(&mut greeting).unwrap();
        assert!(handle.is_alive());

        assert_eq!(send_command(&mut stream, "QUIT").unwrap(), "250 OK");

        let deadline = std::time::Instant::now() + Duration::from_secs(1);
        while handle.is_alive() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!handle.is_alive());
        assert!(matches!(handle.join().unwrap(), SessionEnd::Quit));
    }
}
