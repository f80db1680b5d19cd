//! Error types for the IRC client engine.
//!
//! Handshake failures are collected in [`HandshakeError`] and always reach the
//! caller wrapped in a single [`ConnectError`], so "could not connect" has one
//! error surface regardless of the underlying reason.

use thiserror::Error;

use crate::caps::CapError;

/// Convenience type alias for Results using [`ConnectError`].
pub type Result<T, E = ConnectError> = std::result::Result<T, E>;

/// Outward-facing error for a failed connection attempt.
///
/// The original reason is available through [`ConnectError::cause`] and via
/// [`std::error::Error::source`].
#[derive(Debug, Error)]
#[error("can't connect to server")]
pub struct ConnectError {
    #[source]
    cause: HandshakeError,
}

impl ConnectError {
    /// The reason the attempt failed.
    pub fn cause(&self) -> &HandshakeError {
        &self.cause
    }

    /// Consume the wrapper, returning the underlying reason.
    pub fn into_cause(self) -> HandshakeError {
        self.cause
    }
}

impl From<HandshakeError> for ConnectError {
    fn from(cause: HandshakeError) -> Self {
        Self { cause }
    }
}

/// Everything that can go wrong between `connect()` and a completed registration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// Every resolved address refused or failed; carries the last failure.
    #[error("unable to connect to the IRC network {host}")]
    AddressResolution {
        /// Configured server host.
        host: String,
        /// The error from the last address tried.
        #[source]
        source: std::io::Error,
    },

    /// Server answered 433 and automatic nick changes are disabled.
    #[error("nickname already in use: {line}")]
    NickInUse {
        /// The raw 433 line.
        line: String,
    },

    /// Unexpected error numeric or other handshake invariant violation.
    #[error("could not log into the IRC server: {0}")]
    Protocol(String),

    /// The client was not in a state where connecting is allowed.
    #[error("{0}")]
    Precondition(String),

    /// Socket-level failure while resolving, connecting, reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The line codec rejected input or output.
    #[error("line error: {0}")]
    Line(#[from] LineError),

    /// A capability handler aborted negotiation.
    #[error("capability negotiation failed: {0}")]
    Capability(#[from] CapError),

    /// The STARTTLS handshake failed.
    #[error("tls upgrade failed: {0}")]
    Tls(#[source] std::io::Error),
}

impl HandshakeError {
    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Self::Precondition(msg.into())
    }
}

/// Errors returned by [`Client::shutdown`](crate::Client::shutdown).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ShutdownError {
    /// Another shutdown already owns the teardown.
    #[error("shutdown has already been called")]
    AlreadyInProgress,

    /// Automatic reconnect failed after the old connection was torn down.
    #[error("can't reconnect to server")]
    ReconnectFailure(#[source] ConnectError),
}

/// Errors produced by the line codec.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LineError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Line exceeded the configured maximum length.
    #[error("line too long: {actual} bytes (limit {limit})")]
    MessageTooLong {
        /// Bytes buffered when the limit was hit.
        actual: usize,
        /// The configured limit.
        limit: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = LineError::MessageTooLong {
            actual: 1024,
            limit: 512,
        };
        assert_eq!(format!("{}", err), "line too long: 1024 bytes (limit 512)");

        let err = HandshakeError::NickInUse {
            line: ":irc 433 * bot :Nickname is already in use".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "nickname already in use: :irc 433 * bot :Nickname is already in use"
        );
    }

    #[test]
    fn test_connect_error_chains_cause() {
        let err: ConnectError = HandshakeError::Protocol("ERROR".to_string()).into();
        assert_eq!(err.to_string(), "can't connect to server");

        let source = err.source().expect("cause attached");
        assert_eq!(source.to_string(), "could not log into the IRC server: ERROR");
        assert!(matches!(err.cause(), HandshakeError::Protocol(_)));
    }

    #[test]
    fn test_address_resolution_keeps_last_failure() {
        let io_err =
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = HandshakeError::AddressResolution {
            host: "irc.example.net".to_string(),
            source: io_err,
        };

        let source = err.source().expect("io error attached");
        assert_eq!(source.to_string(), "connection refused");
    }

    #[test]
    fn test_reconnect_failure_wraps_connect_error() {
        let connect: ConnectError = HandshakeError::precondition("never connected").into();
        let err = ShutdownError::ReconnectFailure(connect);

        let source = err.source().expect("connect error attached");
        assert_eq!(source.to_string(), "can't connect to server");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: HandshakeError = io_err.into();
        assert!(matches!(err, HandshakeError::Io(_)));

        let line_err: HandshakeError = LineError::MessageTooLong { actual: 9, limit: 8 }.into();
        assert!(matches!(line_err, HandshakeError::Line(_)));
    }
}
