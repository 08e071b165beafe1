//! Typed error handling for delivery operations.
//!
//! Every failure is either:
//! - Permanent - the queue bounces the message to its sender
//! - Temporary - the queue keeps the message and retries later
//!
//! `Display` is transparent through both so the text the queue sees starts
//! with the failing phase and quotes the remote server literally, e.g.
//! `MAIL+RCPT 550 no such user`.

use std::fmt;

use courier_smtp::client::{ClientError, Response, is_permanent_code};
use thiserror::Error;

use crate::{DnsError, SecLevel};

/// Top-level delivery error type.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Must not be retried.
    #[error(transparent)]
    Permanent(#[from] PermanentError),

    /// A later attempt may succeed.
    #[error(transparent)]
    Temporary(#[from] TemporaryError),
}

/// Failures that make retrying pointless.
#[derive(Debug, Error)]
pub enum PermanentError {
    /// The remote server rejected the message with a 5xx reply.
    #[error(transparent)]
    Rejected(Rejection),

    /// MX lookup gave an authoritative answer that cannot be routed.
    #[error(transparent)]
    Dns(DnsError),

    /// The MX lookup succeeded but listed no hosts.
    #[error("no MX server found for {0}")]
    NoMailServers(String),

    /// The recipient has no domain to route on.
    #[error("invalid recipient address {0:?}")]
    InvalidAddress(String),
}

/// Failures worth retrying later.
#[derive(Debug, Error)]
pub enum TemporaryError {
    /// The remote server refused with a reply that is not a hard failure.
    #[error(transparent)]
    Rejected(Rejection),

    /// The connection broke down: dial failure, timeout, reset, bad reply.
    #[error(transparent)]
    Transport(#[from] ClientError),

    /// The resolver could not answer right now.
    #[error(transparent)]
    Dns(DnsError),

    /// The negotiated security is below what the domain offered before.
    #[error("security level check failed (level: {0})")]
    SecurityLevel(SecLevel),
}

/// The step of the SMTP dialogue a rejection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Greeting,
    Ehlo,
    StartTls,
    MailRcpt,
    Data,
    DataClosing,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Greeting => "greeting",
            Self::Ehlo => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::MailRcpt => "MAIL+RCPT",
            Self::Data => "DATA",
            Self::DataClosing => "DATA closing",
        })
    }
}

/// A reply the remote server used to refuse a step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{phase} {code} {text}")]
pub struct Rejection {
    pub phase: Phase,
    pub code: u16,
    pub text: String,
}

impl Rejection {
    #[must_use]
    pub fn new(phase: Phase, code: u16, text: impl Into<String>) -> Self {
        Self {
            phase,
            code,
            text: text.into(),
        }
    }

    /// Builds a rejection from the reply the server sent.
    #[must_use]
    pub fn from_response(phase: Phase, response: &Response) -> Self {
        Self::new(phase, response.code, response.message())
    }

    /// Whether this rejection should bounce the message.
    ///
    /// A bad greeting or STARTTLS reply only says something about this host,
    /// never about the message, so those are always retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self.phase {
            Phase::Greeting | Phase::StartTls => false,
            Phase::Ehlo | Phase::MailRcpt | Phase::Data | Phase::DataClosing => {
                is_permanent_code(self.code)
            }
        }
    }
}

impl DeliveryError {
    /// Returns `true` if this error is temporary and should be retried.
    #[must_use]
    pub const fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Returns `true` if this error is permanent and should not be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent(_))
    }

    /// The remote rejection behind this error, if there is one.
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Permanent(PermanentError::Rejected(rejection))
            | Self::Temporary(TemporaryError::Rejected(rejection)) => Some(rejection),
            _ => None,
        }
    }
}

impl From<Rejection> for DeliveryError {
    fn from(rejection: Rejection) -> Self {
        if rejection.is_permanent() {
            Self::Permanent(PermanentError::Rejected(rejection))
        } else {
            Self::Temporary(TemporaryError::Rejected(rejection))
        }
    }
}

/// DNS errors keep the resolver's own classification.
impl From<DnsError> for DeliveryError {
    fn from(error: DnsError) -> Self {
        if error.is_permanent() {
            Self::Permanent(PermanentError::Dns(error))
        } else {
            Self::Temporary(TemporaryError::Dns(error))
        }
    }
}

/// Anything that went wrong below the SMTP dialogue is a property of this
/// host at this moment, so it is always temporary.
impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        Self::Temporary(TemporaryError::Transport(error))
    }
}
