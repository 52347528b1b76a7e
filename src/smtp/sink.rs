//! Destinations for captured messages

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;

use log::{debug, info};

use crate::smtp::error::SmtpError;
use crate::smtp::message::ParsedMessage;

/// Receives every message a session captures.
///
/// Called from connection threads, once per completed (or interrupted) DATA
/// phase. The body has already been transfer-decoded.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError>;
}

impl<S: MessageSink + ?Sized> MessageSink for Arc<S> {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError> {
        (**self).deliver(message)
    }
}

impl<S: MessageSink + ?Sized> MessageSink for Box<S> {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError> {
        (**self).deliver(message)
    }
}

/// Fans a message out to every sink; all are tried, the first error is returned
impl<S: MessageSink> MessageSink for Vec<S> {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError> {
        let mut first_error = None;
        for sink in self {
            if let Err(e) = sink.deliver(message) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

static FILE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Writes each message as an HTML document into a directory.
///
/// Writing can be switched off at runtime through the shared toggle.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    enabled: Arc<AtomicBool>,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>, enabled: Arc<AtomicBool>) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Persist a message and return the path written, or `None` when
    /// persistence is switched off.
    pub fn write(&self, message: &ParsedMessage) -> Result<Option<PathBuf>, SmtpError> {
        if !self.is_enabled() {
            debug!("File output disabled, not persisting message");
            return Ok(None);
        }

        let name = file_name(message);
        let path = self.dir.join(&name);
        let staging = self.dir.join(format!(".{name}.tmp"));

        if let Err(source) = write_new(&staging, message.render_html().as_bytes())
            .and_then(|()| fs::rename(&staging, &path))
        {
            let _ = fs::remove_file(&staging);
            return Err(SmtpError::Persistence { path, source });
        }

        info!("Wrote message to {}", path.display());
        Ok(Some(path))
    }
}

impl MessageSink for FileSink {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError> {
        self.write(message).map(|_| ())
    }
}

fn file_name(message: &ParsedMessage) -> String {
    let stamp = message
        .received_at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| message.received_at.timestamp());
    let sequence = FILE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("mail_{stamp}_{sequence}.html")
}

fn write_new(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = File::create_new(path)?;
    file.write_all(contents)?;
    file.sync_all()
}

/// Hands messages to an in-process receiver, for tests that inspect mail
/// without going through the filesystem.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<ParsedMessage>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<ParsedMessage>) -> Self {
        Self { sender }
    }
}

impl MessageSink for ChannelSink {
    fn deliver(&self, message: &ParsedMessage) -> Result<(), SmtpError> {
        // Errors when there are no listeners. Mail is dropped in that case.
        if self.sender.send(message.clone()).is_err() {
            debug!("No receiver for captured message, dropping it");
        }
        Ok(())
    }
}
