//! Server settings

use std::path::PathBuf;
use std::time::Duration;

use crate::smtp::error::SmtpError;

pub const HOSTNAME_KEY: &str = "SMTPSINK_HOSTNAME";
pub const RECEIVE_TIMEOUT_KEY: &str = "SMTPSINK_RECEIVE_TIMEOUT";
pub const OUTPUT_TO_FILE_KEY: &str = "SMTPSINK_OUTPUT_TO_FILE";
pub const OUTPUT_DIR_KEY: &str = "SMTPSINK_OUTPUT_DIR";

/// Default per-read timeout in milliseconds
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 5000;

/// Settings for one server instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Name announced in the greeting
    pub hostname: String,
    /// Bound on each blocking read and write
    pub receive_timeout: Duration,
    /// Whether captured messages are written to `output_dir`
    pub output_to_file: bool,
    pub output_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            receive_timeout: Duration::from_millis(DEFAULT_RECEIVE_TIMEOUT_MS),
            output_to_file: true,
            output_dir: PathBuf::from("."),
        }
    }
}

impl ServerConfig {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self, SmtpError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; absent keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SmtpError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(hostname) = lookup(HOSTNAME_KEY) {
            config.hostname = hostname;
        }

        if let Some(value) = lookup(RECEIVE_TIMEOUT_KEY) {
            let millis = value
                .trim()
                .parse::<u64>()
                .map_err(|_| SmtpError::InvalidConfig {
                    key: RECEIVE_TIMEOUT_KEY,
                    value: value.clone(),
                })?;
            config.receive_timeout = Duration::from_millis(millis);
        }

        if let Some(value) = lookup(OUTPUT_TO_FILE_KEY) {
            config.output_to_file = parse_flag(&value).ok_or(SmtpError::InvalidConfig {
                key: OUTPUT_TO_FILE_KEY,
                value: value.clone(),
            })?;
        }

        if let Some(dir) = lookup(OUTPUT_DIR_KEY) {
            config.output_dir = PathBuf::from(dir);
        }

        Ok(config)
    }

    /// Receive timeout as accepted by `set_read_timeout`; zero disables it
    pub fn socket_timeout(&self) -> Option<Duration> {
        (!self.receive_timeout.is_zero()).then_some(self.receive_timeout)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
