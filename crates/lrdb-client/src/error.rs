use std::io;
use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the debug connection.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to debug server: {0}")]
    Connect(#[source] io::Error),
    #[error("i/o error on debug connection: {0}")]
    Io(#[from] io::Error),
    #[error("no response to '{method}' within {timeout:?}")]
    Timeout { method: String, timeout: Duration },
    #[error("debug connection closed")]
    Closed,
    #[error("malformed message: {0}")]
    Malformed(String),
}
