//! Error types for the SMTP client.

use std::{io, time::Duration};

use thiserror::Error;

/// Errors that can occur while talking to a remote SMTP server.
///
/// None of these carry a reply code: a reply the server sent is returned as
/// a [`Response`](super::Response) and judged by the caller. Every variant
/// here means the exchange itself broke down.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The TCP connection could not be established.
    #[error("could not dial {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// IO error occurred during network operations.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The session deadline expired.
    #[error("timed out (session limit {0:?})")]
    Timeout(Duration),

    /// Failed to parse an SMTP reply from the server.
    #[error("failed to parse SMTP reply: {0}")]
    Parse(String),

    /// TLS negotiation failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Connection was closed unexpectedly.
    #[error("connection closed unexpectedly")]
    ConnectionClosed,

    /// UTF-8 decoding error.
    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl ClientError {
    /// Returns `true` if this error was caused by the session deadline.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Specialized `Result` type for SMTP client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
