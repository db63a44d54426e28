//! Typed failures for the fetch, probe and output stages

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Why a source contributed no content
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        FetchError::Transport(err.to_string())
    }
}

/// Why a probe through a candidate proxy failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("probe timed out")]
    Timeout,

    #[error("proxy connection failed: {0}")]
    Connect(String),

    #[error("malformed response: {0}")]
    Protocol(String),

    #[error("invalid test target: {0}")]
    InvalidTarget(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout
        } else {
            ProbeError::Connect(err.to_string())
        }
    }
}

impl From<tokio_socks::Error> for ProbeError {
    fn from(err: tokio_socks::Error) -> Self {
        ProbeError::Connect(format!("SOCKS handshake failed: {}", err))
    }
}

impl From<io::Error> for ProbeError {
    fn from(err: io::Error) -> Self {
        ProbeError::Connect(err.to_string())
    }
}

/// Failure writing a report to its sink; the only error that ends a run
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
}
