//! Error types for the ESL session

use std::io;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type EslResult<T> = Result<T, EslError>;

/// Errors raised while connecting, framing, or exchanging commands.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EslError {
    /// Every dial attempt failed; carries the last dial error.
    #[error("could not connect to {address} after {attempts} attempt(s): {source}")]
    Connect {
        address: String,
        attempts: usize,
        #[source]
        source: io::Error,
    },

    /// The first frame after dialing was not the `auth/request` challenge.
    #[error("expected auth/request challenge, got content type {content_type:?}")]
    AuthChallenge { content_type: Option<String> },

    /// The switch rejected the credential.
    #[error("authentication failed: {reply_text}")]
    AuthFailed { reply_text: String },

    /// Bad Content-Length, short body, or undecodable frame.
    #[error("framing error: {message}")]
    Framing { message: String },

    /// No live socket to write to.
    #[error("not connected")]
    NotConnected,

    /// The switch answered with `-ERR`.
    #[error("command failed: {reply_text}")]
    CommandFailed { reply_text: String },

    /// Malformed input rejected before it reached the wire.
    #[error("protocol error: {message}")]
    Protocol { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// The socket closed while a reply was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// The session was shut down by its owner.
    #[error("session shut down")]
    Shutdown,
}

impl EslError {
    pub(crate) fn framing(message: impl Into<String>) -> Self {
        EslError::Framing {
            message: message.into(),
        }
    }

    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        EslError::Protocol {
            message: message.into(),
        }
    }

    pub(crate) fn auth_failed(reply_text: impl Into<String>) -> Self {
        EslError::AuthFailed {
            reply_text: reply_text.into(),
        }
    }

    /// `true` when the error means the socket is gone.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            EslError::Io(_)
                | EslError::ConnectionClosed
                | EslError::NotConnected
                | EslError::Connect { .. }
        )
    }

    /// `true` when dialing again may help.
    ///
    /// Challenge and credential failures are configuration problems and
    /// will not go away on retry.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            EslError::AuthChallenge { .. }
                | EslError::AuthFailed { .. }
                | EslError::Protocol { .. }
                | EslError::Shutdown
        )
    }
}
