//! Error types for the SMTP sink

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SmtpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line too long (max {max} bytes)")]
    LineTooLong { max: usize },

    #[error("Failed to persist message to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid value {value:?} for setting {key}")]
    InvalidConfig { key: &'static str, value: String },
}

impl SmtpError {
    /// Whether the error means the peer is gone, as opposed to a local failure
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, SmtpError::Io(_))
    }
}
