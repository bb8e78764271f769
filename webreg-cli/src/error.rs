//! Error types for the CLI

use thiserror::Error;

/// Main CLI error type
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebReg client error
    #[error("WebReg error: {0}")]
    Client(#[from] webreg_client::Error),

    /// The requested term is not offered
    #[error("Term {0} is not available; run `webreg terms` to list terms")]
    UnknownTerm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Hint printed after the error message, if any
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CliError::Client(e) if e.is_session_expired() => {
                Some("The session has expired; log in again or retry with --refresh")
            }
            CliError::Client(webreg_client::Error::RefresherSpawn { .. }) => {
                Some("Check that --browser points at a headless browser executable")
            }
            _ => None,
        }
    }
}
