//! Error types for the WebReg client

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the portal, the SSO provider or the backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed at the transport level
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// A document did not have the structure the parser expected
    #[error("Unexpected document shape: {0}")]
    DocumentShape(String),

    /// The portal reported that it is currently unavailable
    #[error("Portal unavailable: {0}")]
    UpstreamUnavailable(String),

    /// A login was started while another one was still in flight
    #[error("A login is already in progress for this provider")]
    ConcurrentLogin,

    /// The backend answered 400 Bad Request
    #[error("Malformed request to {endpoint}")]
    MalformedRequest {
        /// Endpoint path that rejected the request
        endpoint: &'static str,
    },

    /// The backend answered with an HTML page where JSON was expected
    #[error("Session expired while calling {endpoint}")]
    SessionExpired {
        /// Endpoint path that returned HTML
        endpoint: &'static str,
    },

    /// The backend answered 200 with a content type that is neither JSON nor HTML
    #[error("Unexpected content type {content_type:?} from {endpoint}")]
    UnexpectedContentType {
        /// Endpoint path
        endpoint: &'static str,
        /// The media type that was received (empty when the header was missing)
        content_type: String,
    },

    /// The backend answered 5xx; the body is kept for diagnostics
    #[error("Server error {status} from {endpoint}")]
    Server {
        /// Endpoint path
        endpoint: &'static str,
        /// The status code that was received
        status: reqwest::StatusCode,
        /// Response body as returned by the backend
        body: String,
    },

    /// Invalid HTTP status code received
    #[error("Invalid HTTP status: {status}")]
    InvalidStatus {
        /// The status code that was received
        status: reqwest::StatusCode,
    },

    /// A well-formed envelope whose indicator fields report failure
    #[error("Operation rejected by backend (OPSIV={opsiv:?}, OPS={ops:?}): {warning}")]
    Rejected {
        /// First indicator field
        opsiv: String,
        /// Second indicator field
        ops: String,
        /// Warning text attached by the backend, if any
        warning: String,
    },

    /// An operation was attempted in a session state that does not allow it
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// Failed to decode a JSON body
    #[error("Failed to decode JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A URL could not be parsed or resolved
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Filesystem error while reading or writing a cookie snapshot
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The browser subprocess could not be started
    #[error("Failed to start session refresher {program}: {source}")]
    RefresherSpawn {
        /// Program that failed to start
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The browser subprocess exited with a failure status
    #[error("Session refresher exited with status {code:?}")]
    RefresherExited {
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
    },

    /// The browser subprocess did not exit within the configured timeout
    #[error("Session refresher did not finish within {0:?}")]
    RefresherTimeout(Duration),

    /// Client initialization failed
    #[error("Client initialization failed: {0}")]
    ClientInit(String),
}

impl Error {
    /// Whether the error indicates the backend session is no longer usable
    ///
    /// Callers typically react to this by running the session refresher
    /// (or logging in again) before retrying.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::SessionExpired { .. })
    }
}

/// Convenience alias used throughout the crate
pub type Result<T, E = Error> = std::result::Result<T, E>;
